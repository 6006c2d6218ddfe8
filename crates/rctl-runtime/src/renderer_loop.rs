#![forbid(unsafe_code)]

//! The control thread's message loop.
//!
//! [`RendererLoop::run`] blocks on the inbound channel, waking early when a
//! delayed task falls due. Events are handled strictly in arrival order, each
//! to completion, and due tasks run between events. There is no other
//! concurrency: nothing here is `Send` except the channels.
//!
//! [`spawn`] puts a loop on a dedicated OS thread and hands back the
//! parent-side ends of both channels.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use rctl_core::{ControlMsg, Engine, HostMsg};

use crate::config::ControlConfig;
use crate::control_thread::{ControlThread, SharedControlThread};
use crate::task_runner::TaskRunner;

/// Visibility changes routed to a widget owned by the control thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetEvent {
    Hidden,
    Restored,
    Destroyed { was_hidden: bool },
}

/// Something that arrived on the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A control message.
    Message(ControlMsg),
    /// A message routed to a widget.
    Widget(WidgetEvent),
    /// The transport reported an error.
    Error,
    /// Orderly stop requested by the parent.
    Shutdown,
}

/// Why [`RendererLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Shutdown,
    ChannelError,
    /// Every inbound sender was dropped.
    Disconnected,
}

/// Apply one inbound event. Returns the exit reason if the loop should stop.
pub(crate) fn deliver(thread: &SharedControlThread, event: ChannelEvent) -> Option<ExitReason> {
    let mut thread = thread.borrow_mut();
    match event {
        ChannelEvent::Message(msg) => thread.on_channel_message(msg),
        ChannelEvent::Widget(WidgetEvent::Hidden) => thread.widget_hidden(),
        ChannelEvent::Widget(WidgetEvent::Restored) => thread.widget_restored(),
        ChannelEvent::Widget(WidgetEvent::Destroyed { was_hidden }) => {
            thread.widget_destroyed(was_hidden);
        }
        ChannelEvent::Error => {
            thread.on_channel_error();
            return Some(ExitReason::ChannelError);
        }
        ChannelEvent::Shutdown => return Some(ExitReason::Shutdown),
    }
    None
}

/// Run every task that is due at the runner's current time.
pub(crate) fn run_due_tasks(thread: &SharedControlThread, runner: &TaskRunner) -> usize {
    let mut ran = 0;
    while let Some(task) = runner.pop_due() {
        tracing::trace!(task = task.name(), "task due");
        thread.borrow_mut().run_task(task);
        ran += 1;
    }
    ran
}

pub struct RendererLoop {
    thread: SharedControlThread,
    runner: TaskRunner,
    inbound: mpsc::Receiver<ChannelEvent>,
}

impl RendererLoop {
    #[must_use]
    pub fn new(thread: SharedControlThread, inbound: mpsc::Receiver<ChannelEvent>) -> Self {
        let runner = thread.borrow().runner().clone();
        Self {
            thread,
            runner,
            inbound,
        }
    }

    #[must_use]
    pub fn thread(&self) -> &SharedControlThread {
        &self.thread
    }

    /// Process events until told to stop, then tear the control thread down.
    pub fn run(self) -> ExitReason {
        let reason = loop {
            self.runner.set_now(Instant::now());
            run_due_tasks(&self.thread, &self.runner);

            let received = match self.runner.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    self.inbound.recv_timeout(wait)
                }
                None => self.inbound.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => {
                    tracing::trace!(?event, "channel event");
                    if let Some(reason) = deliver(&self.thread, event) {
                        break reason;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // A vanished parent is a channel error as far as the
                    // filters are concerned.
                    self.thread.borrow_mut().on_channel_error();
                    break ExitReason::Disconnected;
                }
            }
        };
        tracing::info!(?reason, "renderer loop exiting");
        self.thread.borrow_mut().shutdown();
        reason
    }
}

/// Parent-side view of a spawned renderer loop.
#[derive(Debug)]
pub struct RendererHandle {
    inbound: mpsc::Sender<ChannelEvent>,
    outbound: mpsc::Receiver<HostMsg>,
    join: JoinHandle<ExitReason>,
}

impl RendererHandle {
    /// Queue an event for the renderer. Returns `false` if it has exited.
    pub fn send(&self, event: ChannelEvent) -> bool {
        self.inbound.send(event).is_ok()
    }

    /// Messages the renderer has sent so far.
    #[must_use]
    pub fn outbound(&self) -> &mpsc::Receiver<HostMsg> {
        &self.outbound
    }

    /// Ask the renderer to stop and wait for it.
    pub fn shutdown(self) -> thread::Result<ExitReason> {
        let _ = self.inbound.send(ChannelEvent::Shutdown);
        self.join.join()
    }

    /// Wait for the renderer without asking it to stop, returning whatever
    /// it sent that was not yet read.
    pub fn join(self) -> (thread::Result<ExitReason>, Vec<HostMsg>) {
        let Self {
            inbound,
            outbound,
            join,
        } = self;
        drop(inbound);
        let result = join.join();
        (result, outbound.try_iter().collect())
    }
}

/// Start a control thread on its own OS thread.
///
/// The engine is built on the new thread by `make_engine`, since engines
/// are not `Send`.
pub fn spawn<E, F>(config: ControlConfig, make_engine: F) -> io::Result<RendererHandle>
where
    E: Engine + 'static,
    F: FnOnce() -> E + Send + 'static,
{
    let (inbound_tx, inbound_rx) = mpsc::channel();
    let (outbound_tx, outbound_rx) = mpsc::channel();
    let join = thread::Builder::new()
        .name("renderer-control".into())
        .spawn(move || {
            let runner = TaskRunner::new(Instant::now());
            let thread = ControlThread::new(config, make_engine(), outbound_tx, runner);
            RendererLoop::new(thread, inbound_rx).run()
        })?;
    Ok(RendererHandle {
        inbound: inbound_tx,
        outbound: outbound_rx,
        join,
    })
}
