//! # Plugin Bridge
//!
//! Lets components live in separately compiled shared libraries while the
//! host talks to them through the ordinary traits of `participant-types`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────── host ─────────────┐        ┌─────────── plugin ───────────┐
//! │ Arc<dyn ClockService>         │        │ ClockServiceProxy            │
//! │   ▲                           │ access │   │                          │
//! │   └─ HandleArena (weak slot) ◀┼────────┼───┘ fn pointers + Handle     │
//! │                               │        │                              │
//! │ ComponentProxy ───────────────┼────────┼─▶ HandleArena (unique slot)  │
//! │   └─ DestructionManager       │        │     └─ InterfaceHandle       │
//! └───────────────────────────────┘        └──────────────────────────────┘
//! ```
//!
//! Every exposed method is an `extern "C"` wrapper returning an
//! [`InterfaceError`]. Domain errors travel through a [`ResultSink`],
//! strings through a [`StringSink`]. Nothing unwinds across the boundary.
//!
//! ## Transfers
//!
//! | Transfer | Receiver holds | Released by |
//! |----------|----------------|-------------|
//! | shared   | co-ownership   | receiver's destructor call |
//! | unique   | sole ownership | receiver's destructor call |
//! | weak     | weak reference | receiver; calls fail once the object is gone |
//! | borrowed | nothing        | lender's [`BorrowGuard`] |

pub mod access;
pub mod callbacks;
pub mod destruction;
pub mod error;
pub mod guard;
pub mod handle;
pub mod plugin;
pub mod remote;
pub mod transfer;
pub mod version;

pub use access::component::{exposed_component_count, proxy_component, ComponentAccess, ComponentProxy};
pub use callbacks::{ResultSink, StringSink};
pub use destruction::{DestructionManager, DestructorAccess, RemoteKey};
pub use error::InterfaceError;
pub use handle::{BorrowGuard, Handle, HandleArena, Transfer};
pub use plugin::{
    request_component, ComponentFactory, CreateComponentFn, GetLibraryVersionFn, GetVersionFn,
    IsDebugBuildFn,
};
pub use remote::{binding_for, bindings, InterfaceBinding, RemoteInterface};
pub use transfer::{Expiring, ProxyKeeper, SharedBinary};
pub use version::{
    AbiVersion, ParticipantLibraryVersion, GET_LIBRARY_VERSION_SYMBOL, GET_VERSION_SYMBOL,
    IS_DEBUG_BUILD_SYMBOL, LIBRARY_ID,
};
