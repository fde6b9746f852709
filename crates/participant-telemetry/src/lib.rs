//! # Participant Telemetry
//!
//! Logging and metrics for participant runtimes.
//!
//! ## Components
//!
//! - **Logs**: `tracing` subscriber with env filter, human or JSON output
//! - **Metrics**: Prometheus counters and histograms for jobs, clocks and
//!   component loading, exported as text
//!
//! ## Usage
//!
//! ```rust,ignore
//! use participant_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PARTICIPANT_NAME` | `participant` | Name attached to log output |
//! | `PARTICIPANT_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `PARTICIPANT_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `PARTICIPANT_JSON_LOGS` | `false` | JSON lines instead of pretty output |

pub mod capture;
mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingGuard};
pub use metrics::{
    gather_text, register_metrics, MetricsHandle, CLOCK_RESETS, COMPONENTS_LOADED,
    JOBS_EXECUTED, JOB_EXECUTE_DURATION, JOB_FAILURES, RUNTIME_VIOLATIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let logging = init_logging(&config)?;

    Ok(TelemetryGuard {
        _logging: logging,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
