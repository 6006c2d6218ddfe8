#![forbid(unsafe_code)]

//! Renderer control actor.
//!
//! `rctl-runtime` owns the renderer's control channel: it brings the
//! embedded engine up on first use, dispatches control messages to the
//! subsystem handlers, reclaims idle resources while every widget is hidden,
//! and debounces statistics reports to the parent process.
//!
//! # Key Components
//!
//! - [`ControlThread`] - the per-thread actor and its message handlers
//! - [`DispatchTable`] - message kind to handler routing
//! - [`IdleScheduler`] - damped idle-notification timer
//! - [`EngineInitGate`] - one-time engine bring-up
//! - [`CacheStatsReporter`] - debounced cache usage reports
//! - [`RendererLoop`] - blocking loop for a dedicated OS thread
//! - [`LoopSimulator`] - the same loop on a virtual clock, for tests
//!
//! # Role in the workspace
//! Builds on the vocabulary in `rctl-core`. `rctl-harness` drives a
//! spawned loop end to end.

pub mod cache_stats;
pub mod channel;
pub mod config;
pub mod control_thread;
pub mod dispatch;
pub mod engine_gate;
pub mod filters;
pub mod handlers;
pub mod idle;
pub mod renderer_loop;
pub mod simulator;
pub mod task_runner;

pub use cache_stats::CacheStatsReporter;
pub use channel::{ControlChannel, MessageFilter};
pub use config::ControlConfig;
pub use control_thread::{ControlThread, ControlThreadBuilder, Resource, SharedControlThread};
pub use dispatch::{DispatchTable, Handler};
pub use engine_gate::{EngineInitGate, GateState, InitContext};
pub use filters::{
    DbMessageFilter, DevToolsAgentFilter, SuicideOnChannelError, Terminator, DB_FILTER,
    DEVTOOLS_FILTER, DEVTOOLS_INBOX_CAPACITY, SUICIDE_FILTER,
};
pub use idle::{IdleScheduler, IdleState};
pub use renderer_loop::{
    spawn, ChannelEvent, ExitReason, RendererHandle, RendererLoop, WidgetEvent,
};
pub use simulator::{LoopSimulator, TaskRecord};
pub use task_runner::{Task, TaskRunner};
