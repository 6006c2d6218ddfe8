#![forbid(unsafe_code)]

//! Deterministic control-thread simulator for testing.
//!
//! `LoopSimulator` drives a real [`ControlThread`] the way
//! [`RendererLoop`](crate::RendererLoop) does, but on a virtual clock that
//! only moves when the test says so. Timers fire in deadline order as the
//! clock is advanced past them, and every fired task is recorded with the
//! virtual time it ran at.
//!
//! # Example
//!
//! ```ignore
//! use rctl_runtime::LoopSimulator;
//!
//! let (engine, probe) = RecordingEngine::new();
//! let mut sim = LoopSimulator::new(ControlConfig::default(), engine);
//! sim.send(ControlMsg::New(NewViewParams::default()));
//! sim.widget(WidgetEvent::Hidden);
//! sim.advance(Duration::from_secs(1));
//! assert_eq!(probe.count(|c| *c == EngineCall::IdleNotification), 1);
//! ```

use std::cell::{Ref, RefMut};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rctl_core::{ControlMsg, Engine, HostMsg};

use crate::config::ControlConfig;
use crate::control_thread::{ControlThread, ControlThreadBuilder, Resource, SharedControlThread};
use crate::renderer_loop::{self, ChannelEvent, ExitReason, WidgetEvent};
use crate::task_runner::{Task, TaskRunner};

/// A task the simulator ran, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    /// Virtual time since the simulator started.
    pub at: Duration,
    pub task: Task,
}

pub struct LoopSimulator {
    thread: SharedControlThread,
    runner: TaskRunner,
    outbound: mpsc::Receiver<HostMsg>,
    start: Instant,
    task_log: Vec<TaskRecord>,
    exit: Option<ExitReason>,
    released: Vec<Resource>,
}

impl LoopSimulator {
    /// Simulate a control thread with the standard bindings.
    pub fn new(config: ControlConfig, engine: impl Engine + 'static) -> Self {
        Self::with_builder(config, engine, |builder| builder)
    }

    /// Simulate a control thread, adjusting its builder first.
    pub fn with_builder(
        config: ControlConfig,
        engine: impl Engine + 'static,
        customize: impl FnOnce(ControlThreadBuilder) -> ControlThreadBuilder,
    ) -> Self {
        let start = Instant::now();
        let runner = TaskRunner::new(start);
        let (tx, rx) = mpsc::channel();
        let thread = customize(ControlThread::builder(config, engine, tx, runner.clone())).build();
        Self {
            thread,
            runner,
            outbound: rx,
            start,
            task_log: Vec::new(),
            exit: None,
            released: Vec::new(),
        }
    }

    /// Deliver a control message, then run anything due.
    pub fn send(&mut self, msg: ControlMsg) {
        self.deliver(ChannelEvent::Message(msg));
    }

    /// Deliver a widget visibility change, then run anything due.
    pub fn widget(&mut self, event: WidgetEvent) {
        self.deliver(ChannelEvent::Widget(event));
    }

    /// Deliver any channel event. An event that would stop the real loop
    /// tears the control thread down; later events are ignored.
    pub fn deliver(&mut self, event: ChannelEvent) -> Option<ExitReason> {
        if self.exit.is_some() {
            return self.exit;
        }
        self.exit = renderer_loop::deliver(&self.thread, event);
        if self.exit.is_some() {
            self.shutdown();
        } else {
            self.run_due();
        }
        self.exit
    }

    /// Move the clock forward by `by`, firing every task that falls due on
    /// the way at its own deadline.
    pub fn advance(&mut self, by: Duration) {
        let target = self.runner.now() + by;
        while let Some(deadline) = self.runner.next_deadline() {
            if deadline > target {
                break;
            }
            self.runner.set_now(deadline);
            self.run_due();
        }
        self.runner.set_now(target);
    }

    fn run_due(&mut self) {
        while let Some(task) = self.runner.pop_due() {
            let at = self.elapsed();
            self.task_log.push(TaskRecord { at, task });
            self.thread.borrow_mut().run_task(task);
        }
    }

    /// Virtual time since the simulator started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.runner.now().saturating_duration_since(self.start)
    }

    #[must_use]
    pub fn thread(&self) -> Ref<'_, ControlThread> {
        self.thread.borrow()
    }

    pub fn thread_mut(&mut self) -> RefMut<'_, ControlThread> {
        self.thread.borrow_mut()
    }

    #[must_use]
    pub fn shared(&self) -> &SharedControlThread {
        &self.thread
    }

    /// Outbound messages not yet taken.
    pub fn take_outbound(&mut self) -> Vec<HostMsg> {
        self.outbound.try_iter().collect()
    }

    /// Queued tasks with time left until each is due.
    #[must_use]
    pub fn pending_tasks(&self) -> Vec<(Duration, Task)> {
        self.runner.pending_tasks()
    }

    #[must_use]
    pub fn task_log(&self) -> &[TaskRecord] {
        &self.task_log
    }

    #[must_use]
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit
    }

    /// Tear the control thread down now. Returns the release order.
    pub fn shutdown(&mut self) -> &[Resource] {
        let released = self.thread.borrow_mut().shutdown();
        if !released.is_empty() {
            self.released = released;
        }
        &self.released
    }

    /// Release order of the teardown, once it has happened.
    #[must_use]
    pub fn released(&self) -> &[Resource] {
        &self.released
    }
}
