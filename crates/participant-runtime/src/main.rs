//! # Participant Runtime
//!
//! Runs one participant configured from the environment.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry
//! 2. Load configuration from env
//! 3. Load components and plugins
//! 4. Register the heartbeat job, apply the timing file
//! 5. Initialize and start
//! 6. Run until `PARTICIPANT_RUN_SECONDS` elapse or Ctrl+C
//!
//! Shutdown runs the lifecycle backwards.

use anyhow::{Context, Result};
use participant_runtime::{HeartbeatJob, Participant, ParticipantConfig, HEARTBEAT_JOB};
use participant_telemetry::{gather_text, init_telemetry, TelemetryConfig};
use participant_types::JobConfiguration;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const HEARTBEAT_CYCLE: Duration = Duration::from_secs(1);

fn start_participant(config: ParticipantConfig) -> Result<(Participant, Arc<HeartbeatJob>)> {
    let mut participant = Participant::new(config);
    participant
        .load()
        .context("Failed to load participant components")?;

    let heartbeat = Arc::new(HeartbeatJob::new(10));
    participant
        .job_registry()
        .add_job(HEARTBEAT_JOB, heartbeat.clone(), JobConfiguration::new(HEARTBEAT_CYCLE))
        .context("Failed to register heartbeat job")?;

    participant
        .initialize()
        .context("Failed to initialize participant")?;
    participant
        .start()
        .context("Failed to start participant")?;
    Ok((participant, heartbeat))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ParticipantConfig::from_env().context("Invalid participant configuration")?;
    let _telemetry = init_telemetry(TelemetryConfig::for_participant(&config.name))
        .context("Failed to initialize telemetry")?;

    info!("===========================================");
    info!("  Participant Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("  Participant: {}", config.name);
    info!("  Main clock:  {}", config.main_clock);
    info!("===========================================");

    let run_for = config.run_for;
    let (mut participant, heartbeat) = start_participant(config)?;

    match run_for {
        Some(duration) => {
            info!(seconds = duration.as_secs(), "Participant is running");
            tokio::select! {
                _ = tokio::time::sleep(duration) => info!("Run time elapsed"),
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl+C")?;
                    info!("Ctrl+C received");
                }
            }
        }
        None => {
            info!("Participant is running. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;
        }
    }

    info!(state = %participant.state(), beats = heartbeat.beats(), "Initiating shutdown");
    if let Some(reason) = participant.error_reason() {
        error!(%reason, "Participant ended in error state");
    }
    match gather_text() {
        Ok(metrics) => debug!("Final metrics:\n{}", metrics),
        Err(e) => error!("Failed to gather metrics: {}", e),
    }
    participant
        .shutdown()
        .context("Participant shutdown failed")?;

    info!("Shutdown complete");
    Ok(())
}
