pub mod dynamic_loading;
pub mod job_registry_flows;
pub mod plugin_boundary;
pub mod scheduling_flows;

use parking_lot::Mutex;
use participant_types::{Job, Result, Timestamp};
use std::time::{Duration, Instant};

/// Records the time of every `execute`.
#[derive(Default)]
pub struct RecordingJob(Mutex<Vec<Timestamp>>);

impl RecordingJob {
    pub fn millis(&self) -> Vec<i64> {
        self.0.lock().iter().map(|t| t.as_millis()).collect()
    }

    pub fn times(&self) -> Vec<Timestamp> {
        self.0.lock().clone()
    }
}

impl Job for RecordingJob {
    fn execute(&self, time: Timestamp) -> Result<()> {
        self.0.lock().push(time);
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
