//! # Job Registry Crate
//!
//! - [`JobRegistryComponent`]: the participant's job store.
//! - [`TimingConfiguration`]: the timing file model and reader.
//! - [`reconfigure_jobs_from_timing`]: applies a timing file to registered jobs.
//! - [`JobRegistryRpc`]: read-only queries for inspection tooling.

pub mod reconfigure;
pub mod registry;
pub mod rpc;
pub mod timing;

pub use reconfigure::reconfigure_jobs_from_timing;
pub use registry::JobRegistryComponent;
pub use rpc::{JobInfoRecord, JobRegistryRpc};
pub use timing::{TimingConfiguration, TimingHeader, TimingJob, TimingParticipant};
