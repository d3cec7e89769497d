//! Listen-mode routing table compilation, consolidation, and commit.
//!
//! The engine takes declarative route selections (technology, protocol,
//! and AID bindings with power-state masks), compiles them into the flat
//! per-destination table the controller expects, and commits the result
//! over an asynchronous request/acknowledge protocol with timeout and
//! endpoint-recovery handling.

pub mod config;
pub mod controller;
pub mod endpoint;
pub mod engine;
pub mod events;
pub mod telemetry;
pub mod types;

pub use engine::RoutingEngine;
