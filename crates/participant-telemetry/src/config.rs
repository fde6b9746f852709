//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Participant name attached to every log line
    pub participant_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            participant_name: "participant".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PARTICIPANT_NAME`: Participant name (default: participant)
    /// - `PARTICIPANT_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `PARTICIPANT_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `PARTICIPANT_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self {
            participant_name: env::var("PARTICIPANT_NAME")
                .unwrap_or_else(|_| "participant".to_string()),

            log_level: env::var("PARTICIPANT_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("PARTICIPANT_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("PARTICIPANT_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Configuration for a named participant, everything else from env.
    pub fn for_participant(name: &str) -> Self {
        let mut config = Self::from_env();
        config.participant_name = name.to_string();
        config
    }
}
