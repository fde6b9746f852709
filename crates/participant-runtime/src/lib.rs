//! # Participant Runtime Library
//!
//! Assembles and drives one participant. The `participant-runtime` binary
//! in `main.rs` is a thin shell around [`Participant`].
//!
//! - [`ParticipantConfig`]: settings from the environment
//! - [`Participant`]: components, plugins and the participant state machine
//! - [`HeartbeatJob`]: liveness job of the binary

pub mod config;
pub mod heartbeat;
pub mod participant;

pub use config::{ConfigError, ParticipantConfig};
pub use heartbeat::{HeartbeatJob, HEARTBEAT_JOB};
pub use participant::{Participant, ParticipantState};
