//! Controller command surface: commands, acknowledgments, and the link
//! abstraction the engine drives.

mod link;
pub mod mock;
mod types;

pub use link::{AckSlot, ControllerLink, LinkError};
pub use types::{Command, CommandStatus, ControllerEvent, RouteMasks};
