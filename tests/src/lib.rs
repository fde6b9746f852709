//! # Participant Test Suite
//!
//! Flows that span several crates of the workspace.
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── scheduling_flows.rs   # participant + clock service + scheduler
//!     ├── job_registry_flows.rs # timing files, RPC surface
//!     ├── plugin_boundary.rs    # demo plugin through its C entry point, in-process
//!     └── dynamic_loading.rs    # demo plugin loaded from its shared library
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p participant-tests
//! cargo test -p participant-tests integration::plugin_boundary
//! ```

#![allow(dead_code)]

pub mod integration;
