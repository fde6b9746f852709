//! Subscriber set-up and structured logging helpers.
//!
//! Console output is either human-readable or JSON, one object per line with
//! `timestamp`, `level`, `target`, the message and every structured field.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Logging handle. The subscriber stays installed for the process lifetime.
pub struct LoggingGuard {
    participant_name: String,
}

impl LoggingGuard {
    pub fn participant_name(&self) -> &str {
        &self.participant_name
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &TelemetryConfig) -> Result<LoggingGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(e.to_string()))?;

    if !config.console_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::info!(
        participant = %config.participant_name,
        json_logs = config.json_logs,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        participant_name: config.participant_name.clone(),
    })
}

/// Log a job-scoped event with standard fields.
///
/// ```rust,ignore
/// log_job_event!(warn, "[Scheduler]", "max runtime exceeded", job_name, time, elapsed_us = 1200);
/// ```
#[macro_export]
macro_rules! log_job_event {
    ($level:ident, $component:expr, $msg:expr, $job:expr, $time:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = $component,
            job = %$job,
            sim_time = %$time,
            $($($field)*,)?
            $msg
        )
    };
}
