use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use lmrt::config::Config;
use lmrt::controller::mock::MockController;
use lmrt::controller::{ControllerEvent, ControllerLink};
use lmrt::engine::TableDump;
use lmrt::telemetry::init_tracing;
use lmrt::RoutingEngine;

#[derive(Parser, Debug)]
#[command(name = "lmrt")]
#[command(author, version, about = "Listen-mode routing table compiler and committer")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&config.telemetry)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting lmrt"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    // Drive a simulated controller seeded from the config
    let (mock, events) = MockController::new();
    let mock = Arc::new(mock);
    for ep in &config.simulation.endpoints {
        mock.inject(ControllerEvent::EndpointDiscovered {
            dest: ep.dest,
            tech_support: ep.tech_support,
        })
        .await;
    }

    let engine = RoutingEngine::new(
        &config,
        Arc::clone(&mock) as Arc<dyn ControllerLink>,
        events,
    );
    // give the dispatcher a chance to absorb the discoveries
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let activated = engine
        .compile_and_commit(
            config.routing.default_route,
            config.routing.isodep_route,
            config.routing.tech_route,
        )
        .await;

    let snapshot = engine.consolidated_snapshot();
    info!(activated, "commit pass finished");
    println!("{}", TableDump(&snapshot));

    if !activated {
        anyhow::bail!("table activation was not confirmed");
    }
    Ok(())
}
