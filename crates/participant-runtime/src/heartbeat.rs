//! Heartbeat job registered by the runtime binary.

use participant_telemetry::log_job_event;
use participant_types::{Job, Result, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};

pub const HEARTBEAT_JOB: &str = "heartbeat";

/// Counts its executions and logs every `log_every`-th one.
pub struct HeartbeatJob {
    beats: AtomicU64,
    log_every: u64,
}

impl HeartbeatJob {
    pub fn new(log_every: u64) -> Self {
        Self {
            beats: AtomicU64::new(0),
            log_every: log_every.max(1),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }
}

impl Job for HeartbeatJob {
    fn execute(&self, time: Timestamp) -> Result<()> {
        let beats = self.beats.fetch_add(1, Ordering::SeqCst) + 1;
        if beats % self.log_every == 0 {
            log_job_event!(info, "[Heartbeat]", "Alive", HEARTBEAT_JOB, time, beats);
        }
        Ok(())
    }
}
