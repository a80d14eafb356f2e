//! # Station Control
//!
//! Control daemon for the propellant fill/firing station.
//!
//! Spawns four tasks and supervises them until Ctrl+C:
//! - the fixed-rate control cycle (state machine + actuator latching),
//! - the relay flush task (applies latched outputs to hardware),
//! - the sensor link (pressure sentences from the scientific board),
//! - the uplink (status push + command poll to the operator server).

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use station_common::config::load_config;
use station_control::actuators::{run_flush_task, ActuatorBank, SimRelayDriver};
use station_control::mailbox::{CommandSlot, StatusOutbox};
use station_control::pressure::PressureFeed;
use station_control::sensor_link::run_sensor_link;
use station_control::uplink::run_uplink;
use station_control::ControlCycle;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Station Control — fill/firing station control daemon
#[derive(Parser, Debug)]
#[command(name = "station_control")]
#[command(version)]
#[command(about = "Control daemon for the propellant fill/firing station")]
struct Args {
    /// Path to the station configuration TOML.
    #[arg(default_value = "config/station.toml")]
    config: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Station Control v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args).await {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Station Control shutdown complete");
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args.config)?;
    info!(
        station_id = %config.station_id,
        tick_ms = config.tick_interval_ms,
        "Config OK"
    );

    let feed = Arc::new(PressureFeed::new());
    let bank = Arc::new(ActuatorBank::new());
    let commands = Arc::new(CommandSlot::new());
    let status = Arc::new(StatusOutbox::new());
    let (sensor_tx, sensor_rx) = mpsc::channel(8);

    let cycle = ControlCycle::new(
        &config,
        Arc::clone(&feed),
        Arc::clone(&bank),
        Arc::clone(&commands),
        Arc::clone(&status),
        sensor_tx,
        Instant::now(),
    );

    let tick_interval = config.tick_interval();
    let flush_interval = config.flush_interval();
    let sensor = config.sensor.clone();
    let link = config.link.clone();
    let station_id = config.station_id.clone();

    // Each task resolves to its name so a premature exit can be
    // attributed in the log.
    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(async move {
        cycle.run(tick_interval).await;
        "control cycle"
    });
    let flush_bank = Arc::clone(&bank);
    tasks.spawn(async move {
        run_flush_task(flush_bank, Box::new(SimRelayDriver::default()), flush_interval).await;
        "relay flush"
    });
    let sensor_feed = Arc::clone(&feed);
    tasks.spawn(async move {
        run_sensor_link(sensor, sensor_feed, sensor_rx).await;
        "sensor link"
    });
    let uplink_status = Arc::clone(&status);
    let uplink_commands = Arc::clone(&commands);
    tasks.spawn(async move {
        run_uplink(link, station_id, uplink_status, uplink_commands).await;
        "uplink"
    });

    info!("All tasks spawned, station online");

    tokio::select! {
        res = signal::ctrl_c() => {
            match res {
                Ok(()) => info!("Received shutdown signal (Ctrl+C)"),
                Err(e) => error!("Unable to listen for shutdown signal: {e}"),
            }
        }
        // Every task loops until aborted; any exit is fatal, a clean
        // return no less than a panic.
        joined = tasks.join_next() => {
            return Err(task_exit_error(joined));
        }
    }

    tasks.shutdown().await;
    Ok(())
}

/// Map a finished supervised task to the error that takes the process
/// down, naming the task that exited.
fn task_exit_error(
    joined: Option<Result<&'static str, tokio::task::JoinError>>,
) -> Box<dyn std::error::Error> {
    match joined {
        Some(Ok(task)) => {
            error!(task, "task exited unexpectedly");
            format!("{task} task exited unexpectedly").into()
        }
        Some(Err(e)) => {
            error!("task panicked: {e}");
            Box::new(e)
        }
        None => "no tasks running".into(),
    }
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_task_exit_becomes_a_named_error() {
        let mut tasks = tokio::task::JoinSet::new();
        tasks.spawn(async { "sensor link" });

        let err = task_exit_error(tasks.join_next().await);
        assert!(err.to_string().contains("sensor link"));
    }

    #[tokio::test]
    async fn panicked_task_exit_becomes_an_error() {
        let mut tasks: tokio::task::JoinSet<&'static str> = tokio::task::JoinSet::new();
        tasks.spawn(async { panic!("relay driver fault") });

        let err = task_exit_error(tasks.join_next().await);
        assert!(err.to_string().contains("panic"));
    }
}
