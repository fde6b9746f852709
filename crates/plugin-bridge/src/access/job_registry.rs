//! Job registry access. Job configurations and infos cross as JSON; jobs
//! themselves cross by shared transfer through [`JobAccess`].

use crate::access::job::{expose_job, JobAccess, JobProxy};
use crate::access::{str_parts, AccessStruct};
use crate::callbacks::{read_str, ResultSink, StringSink};
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::InterfaceError;
use crate::guard::{
    guarded, guarded_release, guarded_result, remote_notify, remote_result, remote_transfer,
};
use crate::handle::{Handle, HandleArena, Transfer};
use crate::transfer::SharedBinary;
use lazy_static::lazy_static;
use participant_types::{
    Component, ComponentInterface, Job, JobConfiguration, JobEntry, JobInfo, JobRegistry,
    ParticipantError, Result,
};
use std::ffi::c_void;
use std::sync::{Arc, Weak};
use tracing::warn;

lazy_static! {
    static ref JOB_REGISTRIES: HandleArena<dyn JobRegistry> = HandleArena::new();
}

pub type JobEntryCallback =
    unsafe extern "C" fn(destination: *mut c_void, info: *const u8, len: usize, job: JobAccess);

/// Receiver of registry entries. Each delivered [`JobAccess`] is owned by
/// the receiver.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct JobEntrySink {
    pub destination: *mut c_void,
    pub callback: Option<JobEntryCallback>,
}

impl JobEntrySink {
    fn collect(target: &mut Vec<(String, JobAccess)>) -> Self {
        Self {
            destination: (target as *mut Vec<(String, JobAccess)>).cast(),
            callback: Some(store_entry),
        }
    }

    fn is_valid(&self) -> bool {
        !self.destination.is_null() && self.callback.is_some()
    }

    unsafe fn deliver(&self, info: &str, job: JobAccess) {
        if let Some(callback) = self.callback {
            callback(self.destination, info.as_ptr(), info.len(), job);
        }
    }
}

unsafe extern "C" fn store_entry(destination: *mut c_void, info: *const u8, len: usize, job: JobAccess) {
    let entries = &mut *destination.cast::<Vec<(String, JobAccess)>>();
    entries.push((read_str(info, len), job));
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct JobRegistryAccess {
    pub handle: Handle,
    pub destructor: DestructorAccess,
    pub add_job: unsafe extern "C" fn(
        Handle,
        ResultSink,
        *const u8,
        usize,
        JobAccess,
        *const u8,
        usize,
    ) -> InterfaceError,
    pub remove_job: unsafe extern "C" fn(Handle, ResultSink, *const u8, usize) -> InterfaceError,
    pub get_job_infos: unsafe extern "C" fn(Handle, StringSink) -> InterfaceError,
    pub get_jobs: unsafe extern "C" fn(Handle, JobEntrySink) -> InterfaceError,
    pub reconfigure_job: unsafe extern "C" fn(
        Handle,
        ResultSink,
        *const u8,
        usize,
        *const u8,
        usize,
    ) -> InterfaceError,
}

unsafe impl AccessStruct for JobRegistryAccess {}

pub fn expose_job_registry(registry: Weak<dyn JobRegistry>) -> JobRegistryAccess {
    let handle = JOB_REGISTRIES.admit(Transfer::Weak(registry));
    JobRegistryAccess {
        handle,
        destructor: DestructorAccess::new(handle, destroy_job_registry),
        add_job: registry_add_job,
        remove_job: registry_remove_job,
        get_job_infos: registry_get_job_infos,
        get_jobs: registry_get_jobs,
        reconfigure_job: registry_reconfigure_job,
    }
}

fn decode_config(json: &str) -> Result<JobConfiguration> {
    serde_json::from_str(json).map_err(|e| {
        ParticipantError::invalid_argument(format!("malformed job configuration: {}", e))
    })
}

fn encode_config(config: &JobConfiguration) -> Result<String> {
    serde_json::to_string(config).map_err(|e| {
        ParticipantError::invalid_argument(format!("unencodable job configuration: {}", e))
    })
}

unsafe extern "C" fn destroy_job_registry(handle: Handle) {
    guarded_release(handle, || {
        JOB_REGISTRIES.release(handle);
    });
}

unsafe extern "C" fn registry_add_job(
    handle: Handle,
    result: ResultSink,
    name: *const u8,
    name_len: usize,
    job: JobAccess,
    config: *const u8,
    config_len: usize,
) -> InterfaceError {
    guarded_result(&JOB_REGISTRIES, handle, result, |registry| {
        let job: Arc<dyn Job> = Arc::new(JobProxy::from_access(job, None));
        let config = decode_config(&read_str(config, config_len))?;
        registry.add_job(&read_str(name, name_len), job, config)
    })
}

unsafe extern "C" fn registry_remove_job(
    handle: Handle,
    result: ResultSink,
    name: *const u8,
    name_len: usize,
) -> InterfaceError {
    guarded_result(&JOB_REGISTRIES, handle, result, |registry| {
        registry.remove_job(&read_str(name, name_len))
    })
}

unsafe extern "C" fn registry_get_job_infos(handle: Handle, infos: StringSink) -> InterfaceError {
    guarded(&JOB_REGISTRIES, handle, infos.is_valid(), |registry| {
        for info in registry.job_infos() {
            match serde_json::to_string(&info) {
                Ok(json) => infos.deliver(&json),
                Err(error) => warn!(job = info.name(), %error, "[Plugin] job info not encodable"),
            }
        }
    })
}

unsafe extern "C" fn registry_get_jobs(handle: Handle, entries: JobEntrySink) -> InterfaceError {
    guarded(&JOB_REGISTRIES, handle, entries.is_valid(), |registry| {
        for entry in registry.jobs() {
            match serde_json::to_string(&entry.info) {
                Ok(json) => entries.deliver(&json, expose_job(Transfer::Shared(entry.job))),
                Err(error) => warn!(job = entry.name(), %error, "[Plugin] job info not encodable"),
            }
        }
    })
}

unsafe extern "C" fn registry_reconfigure_job(
    handle: Handle,
    result: ResultSink,
    name: *const u8,
    name_len: usize,
    config: *const u8,
    config_len: usize,
) -> InterfaceError {
    guarded_result(&JOB_REGISTRIES, handle, result, |registry| {
        let config = decode_config(&read_str(config, config_len))?;
        registry.reconfigure_job(&read_str(name, name_len), config)
    })
}

/// Local [`JobRegistry`] forwarding to another binary.
pub struct JobRegistryProxy {
    access: JobRegistryAccess,
    _destruction: DestructionManager,
    binary: Option<SharedBinary>,
}

impl JobRegistryProxy {
    /// # Safety
    ///
    /// `access` must come from [`expose_job_registry`] in a live binary.
    pub unsafe fn from_access(access: JobRegistryAccess, binary: Option<SharedBinary>) -> Self {
        Self {
            access,
            _destruction: DestructionManager::with(access.destructor),
            binary,
        }
    }
}

/// Decode a received info, revalidating its configuration.
fn decode_info(json: &str) -> Option<JobInfo> {
    let decoded: JobInfo = match serde_json::from_str(json) {
        Ok(info) => info,
        Err(error) => {
            warn!(%error, "[Plugin] malformed job info");
            return None;
        }
    };
    match JobInfo::new(decoded.name(), decoded.config().clone()) {
        Ok(info) => Some(info),
        Err(error) => {
            warn!(%error, "[Plugin] invalid job info");
            None
        }
    }
}

impl Component for JobRegistryProxy {
    fn iid(&self) -> &str {
        <dyn JobRegistry as ComponentInterface>::IID
    }
}

impl JobRegistry for JobRegistryProxy {
    fn add_job(&self, name: &str, job: Arc<dyn Job>, config: JobConfiguration) -> Result<()> {
        let config = encode_config(&config)?;
        let (name_ptr, name_len) = str_parts(name);
        let (config_ptr, config_len) = str_parts(&config);
        let job = expose_job(Transfer::Shared(job));
        remote_transfer(job.destructor, |result| unsafe {
            (self.access.add_job)(
                self.access.handle,
                result,
                name_ptr,
                name_len,
                job,
                config_ptr,
                config_len,
            )
        })
    }

    fn remove_job(&self, name: &str) -> Result<()> {
        let (name_ptr, name_len) = str_parts(name);
        remote_result(|result| unsafe {
            (self.access.remove_job)(self.access.handle, result, name_ptr, name_len)
        })
    }

    fn job_infos(&self) -> Vec<JobInfo> {
        let mut infos = Vec::new();
        let code = unsafe {
            (self.access.get_job_infos)(self.access.handle, StringSink::recurring(&mut infos))
        };
        remote_notify("get_job_infos", code);
        infos.iter().filter_map(|json| decode_info(json)).collect()
    }

    fn jobs(&self) -> Vec<JobEntry> {
        let mut received = Vec::new();
        let code = unsafe {
            (self.access.get_jobs)(self.access.handle, JobEntrySink::collect(&mut received))
        };
        remote_notify("get_jobs", code);
        received
            .into_iter()
            .filter_map(|(json, access)| {
                // The proxy owns the transferred job even if its info is unusable.
                let job: Arc<dyn Job> =
                    Arc::new(unsafe { JobProxy::from_access(access, self.binary.clone()) });
                decode_info(&json).map(|info| JobEntry::new(job, info))
            })
            .collect()
    }

    fn reconfigure_job(&self, name: &str, config: JobConfiguration) -> Result<()> {
        let config = encode_config(&config)?;
        let (name_ptr, name_len) = str_parts(name);
        let (config_ptr, config_len) = str_parts(&config);
        remote_result(|result| unsafe {
            (self.access.reconfigure_job)(
                self.access.handle,
                result,
                name_ptr,
                name_len,
                config_ptr,
                config_len,
            )
        })
    }
}
