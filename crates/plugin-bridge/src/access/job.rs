//! Job access. Jobs cross by shared transfer: the registry on the far side
//! co-owns the job until it releases the proxy.

use crate::access::AccessStruct;
use crate::callbacks::ResultSink;
use crate::destruction::{DestructionManager, DestructorAccess};
use crate::error::InterfaceError;
use crate::guard::{guarded_release, guarded_result, remote_result};
use crate::handle::{Handle, HandleArena, Transfer};
use crate::transfer::SharedBinary;
use lazy_static::lazy_static;
use participant_types::{Job, Result, Timestamp};

lazy_static! {
    static ref JOBS: HandleArena<dyn Job> = HandleArena::new();
}

type PhaseFn = unsafe extern "C" fn(Handle, ResultSink, i64) -> InterfaceError;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct JobAccess {
    pub handle: Handle,
    pub destructor: DestructorAccess,
    pub execute_data_in: PhaseFn,
    pub execute: PhaseFn,
    pub execute_data_out: PhaseFn,
}

unsafe impl AccessStruct for JobAccess {}

pub fn expose_job(transfer: Transfer<dyn Job>) -> JobAccess {
    let handle = JOBS.admit(transfer);
    JobAccess {
        handle,
        destructor: DestructorAccess::new(handle, destroy_job),
        execute_data_in: job_execute_data_in,
        execute: job_execute,
        execute_data_out: job_execute_data_out,
    }
}

/// Number of jobs currently exposed by this binary.
pub fn exposed_job_count() -> usize {
    JOBS.len()
}

unsafe extern "C" fn destroy_job(handle: Handle) {
    guarded_release(handle, || {
        JOBS.release(handle);
    });
}

unsafe extern "C" fn job_execute_data_in(handle: Handle, result: ResultSink, time: i64) -> InterfaceError {
    guarded_result(&JOBS, handle, result, |job| {
        job.execute_data_in(Timestamp::from_nanos(time))
    })
}

unsafe extern "C" fn job_execute(handle: Handle, result: ResultSink, time: i64) -> InterfaceError {
    guarded_result(&JOBS, handle, result, |job| job.execute(Timestamp::from_nanos(time)))
}

unsafe extern "C" fn job_execute_data_out(handle: Handle, result: ResultSink, time: i64) -> InterfaceError {
    guarded_result(&JOBS, handle, result, |job| {
        job.execute_data_out(Timestamp::from_nanos(time))
    })
}

/// Local [`Job`] forwarding to a job in another binary.
pub struct JobProxy {
    access: JobAccess,
    _destruction: DestructionManager,
    _binary: Option<SharedBinary>,
}

impl JobProxy {
    /// # Safety
    ///
    /// `access` must come from [`expose_job`] in a live binary.
    pub unsafe fn from_access(access: JobAccess, binary: Option<SharedBinary>) -> Self {
        Self {
            access,
            _destruction: DestructionManager::with(access.destructor),
            _binary: binary,
        }
    }

    fn phase(&self, phase: PhaseFn, time: Timestamp) -> Result<()> {
        remote_result(|result| unsafe { phase(self.access.handle, result, time.as_nanos()) })
    }
}

impl Job for JobProxy {
    fn execute_data_in(&self, time: Timestamp) -> Result<()> {
        self.phase(self.access.execute_data_in, time)
    }

    fn execute(&self, time: Timestamp) -> Result<()> {
        self.phase(self.access.execute, time)
    }

    fn execute_data_out(&self, time: Timestamp) -> Result<()> {
        self.phase(self.access.execute_data_out, time)
    }
}
