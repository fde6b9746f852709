//! # Job Registry Component
//!
//! Jobs are kept in registration order under unique names. Each entry
//! shares its job, so a job removed here stays alive for whoever still
//! holds it (typically a scheduler's snapshot).
//!
//! The job set is frozen between `tense` and `relax`: schedulers take
//! their snapshot at `tense`, and changes after that would not reach them.

use parking_lot::RwLock;
use participant_types::{
    Component, Job, JobConfiguration, JobEntry, JobInfo, JobRegistry, ParticipantError, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Default)]
pub struct JobRegistryComponent {
    entries: RwLock<Vec<JobEntry>>,
    frozen: AtomicBool,
}

impl JobRegistryComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn ensure_mutable(&self, operation: &str, name: &str) -> Result<()> {
        if self.frozen.load(Ordering::SeqCst) {
            error!(job = name, operation, "[JobRegistry] Job set is frozen while tensed");
            return Err(ParticipantError::invalid_state(format!(
                "cannot {} job '{}' while the participant is tensed",
                operation, name
            )));
        }
        Ok(())
    }
}

impl Component for JobRegistryComponent {
    fn iid(&self) -> &str {
        <dyn JobRegistry as participant_types::ComponentInterface>::IID
    }

    fn tense(&self) -> Result<()> {
        self.frozen.store(true, Ordering::SeqCst);
        debug!(jobs = self.len(), "[JobRegistry] Job set frozen");
        Ok(())
    }

    fn relax(&self) -> Result<()> {
        self.frozen.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

impl JobRegistry for JobRegistryComponent {
    fn add_job(&self, name: &str, job: Arc<dyn Job>, config: JobConfiguration) -> Result<()> {
        self.ensure_mutable("add", name)?;
        let mut entries = self.entries.write();
        if entries.iter().any(|entry| entry.name() == name) {
            error!(job = name, "[JobRegistry] Job name already registered");
            return Err(ParticipantError::resource_in_use(format!(
                "job '{}' is already registered",
                name
            )));
        }
        let info = JobInfo::new(name, config)?;
        info!(
            job = name,
            cycle_ns = info.config().cycle_time.as_nanos() as u64,
            delay_ns = info.config().delay_time.as_nanos() as u64,
            "[JobRegistry] Job added"
        );
        entries.push(JobEntry::new(job, info));
        Ok(())
    }

    fn remove_job(&self, name: &str) -> Result<()> {
        self.ensure_mutable("remove", name)?;
        let mut entries = self.entries.write();
        let index = entries
            .iter()
            .position(|entry| entry.name() == name)
            .ok_or_else(|| ParticipantError::not_found(format!("job '{}'", name)))?;
        entries.remove(index);
        info!(job = name, "[JobRegistry] Job removed");
        Ok(())
    }

    fn job_infos(&self) -> Vec<JobInfo> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.info.clone())
            .collect()
    }

    fn jobs(&self) -> Vec<JobEntry> {
        self.entries.read().clone()
    }

    fn reconfigure_job(&self, name: &str, config: JobConfiguration) -> Result<()> {
        self.ensure_mutable("reconfigure", name)?;
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.name() == name)
            .ok_or_else(|| ParticipantError::not_found(format!("job '{}'", name)))?;
        entry.info.reconfigure(config)?;
        debug!(job = name, "[JobRegistry] Job reconfigured");
        Ok(())
    }
}
