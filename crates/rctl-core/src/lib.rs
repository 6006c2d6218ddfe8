#![forbid(unsafe_code)]

//! Renderer control vocabulary.
//!
//! `rctl-core` holds the types shared between the control actor and its
//! collaborators: the inbound/outbound message enums, the embedded engine
//! contract, process-start switches, shared-memory handles, and the counter
//! and histogram tables the engine writes into.
//!
//! # Role in the workspace
//! `rctl-runtime` builds the actor on top of these types; `rctl-harness`
//! drives it end to end. Nothing here schedules work or owns a thread.

pub mod engine;
pub mod error;
pub mod message;
pub mod shared_memory;
pub mod stats;
pub mod switches;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use engine::{
    CacheCapacities, Capability, Engine, EngineHooks, PlatformSupport, RegistrationTarget,
    ResourceTypeStat, ResourceTypeStats, UsageStats,
};
pub use error::{TableError, TableResult};
pub use message::{
    AppCacheEvent, AppCacheMsg, ColorMapping, ControlMsg, Fingerprint, HostMsg, MsgKind,
    NewViewParams,
};
pub use shared_memory::SharedMemoryHandle;
pub use stats::{HistogramDelta, HistogramId, HistogramRegistry, StatsTable};
pub use switches::Switches;
