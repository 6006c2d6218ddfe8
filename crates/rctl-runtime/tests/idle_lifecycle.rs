#![forbid(unsafe_code)]

//! Idle reclamation driven through the simulated loop.
//!
//! Every test here runs on the virtual clock; nothing sleeps.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use rctl_core::testing::{EngineCall, EngineProbe, RecordingEngine};
use rctl_core::{ControlMsg, NewViewParams};
use rctl_runtime::idle::{next_delay, timer_for};
use rctl_runtime::{ControlConfig, IdleScheduler, IdleState, LoopSimulator, Task, TaskRunner, WidgetEvent};

fn simulator() -> (LoopSimulator, EngineProbe) {
    let (engine, probe) = RecordingEngine::new();
    let config = ControlConfig::default().with_exit_on_channel_error(false);
    (LoopSimulator::new(config, engine), probe)
}

fn create_views(sim: &mut LoopSimulator, n: i32) {
    for view_id in 0..n {
        sim.send(ControlMsg::New(NewViewParams {
            view_id,
            ..NewViewParams::default()
        }));
    }
}

fn idle_calls(probe: &EngineProbe) -> usize {
    probe.count(|c| *c == EngineCall::IdleNotification)
}

fn idle_timers(sim: &LoopSimulator) -> Vec<(Duration, Task)> {
    sim.pending_tasks()
        .into_iter()
        .filter(|(_, t)| matches!(t, Task::IdleHandler { .. }))
        .collect()
}

#[test]
fn three_widgets_end_to_end() {
    let (mut sim, probe) = simulator();
    create_views(&mut sim, 3);
    assert_eq!(sim.thread().widget_count(), 3);

    for _ in 0..3 {
        sim.widget(WidgetEvent::Hidden);
    }
    assert_eq!(sim.thread().idle_state(), IdleState::ArmedIdle);
    assert_eq!(sim.thread().idle_delay(), 1.0);
    assert_eq!(
        idle_timers(&sim),
        vec![(Duration::from_secs(1), Task::IdleHandler { generation: 1 })]
    );

    sim.widget(WidgetEvent::Restored);
    sim.advance(Duration::from_secs(1));
    assert_eq!(idle_calls(&probe), 0, "restored widget must silence the timer");
    assert!(idle_timers(&sim).is_empty());

    sim.advance(Duration::from_secs(30));
    assert_eq!(idle_calls(&probe), 0);
    assert!(idle_timers(&sim).is_empty());

    sim.widget(WidgetEvent::Hidden);
    assert_eq!(
        idle_timers(&sim),
        vec![(Duration::from_secs(1), Task::IdleHandler { generation: 2 })]
    );
    sim.advance(Duration::from_secs(1));
    assert_eq!(idle_calls(&probe), 1);
}

#[test]
fn backoff_follows_damping_curve() {
    let (mut sim, probe) = simulator();
    create_views(&mut sim, 1);
    sim.widget(WidgetEvent::Hidden);

    // Engine never reports completion, so the chain keeps going.
    sim.advance(Duration::from_secs(7));
    let fired: Vec<Duration> = sim
        .task_log()
        .iter()
        .filter(|r| matches!(r.task, Task::IdleHandler { .. }))
        .map(|r| r.at)
        .collect();
    // Delays 1, 1 (1.33), 1 (1.63), 1 (1.91), 2 (2.16), ...
    assert_eq!(
        fired,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
            Duration::from_secs(4),
            Duration::from_secs(6),
        ]
    );
    assert_eq!(idle_calls(&probe), 5);

    let mut expected = 1.0;
    for _ in 0..5 {
        expected = next_delay(expected);
    }
    assert!((sim.thread().idle_delay() - expected).abs() < 1e-12);
}

#[test]
fn completion_stops_the_chain() {
    let (mut sim, probe) = simulator();
    probe.push_idle_results([false, true]);
    create_views(&mut sim, 1);
    sim.widget(WidgetEvent::Hidden);
    sim.advance(Duration::from_secs(60));
    assert_eq!(idle_calls(&probe), 2);
    assert_eq!(sim.thread().idle_state(), IdleState::Quiescent);
    assert!(idle_timers(&sim).is_empty());
}

#[test]
fn rearm_resets_delay() {
    let (mut sim, probe) = simulator();
    create_views(&mut sim, 1);
    sim.widget(WidgetEvent::Hidden);
    sim.advance(Duration::from_secs(3));
    assert!(sim.thread().idle_delay() > 1.5);

    sim.widget(WidgetEvent::Restored);
    sim.widget(WidgetEvent::Hidden);
    assert_eq!(sim.thread().idle_delay(), 1.0);

    // The old chain dies at its next firing; only the new one notifies.
    let before = idle_calls(&probe);
    sim.advance(Duration::from_secs(1));
    assert_eq!(idle_calls(&probe), before + 1);
    let live: Vec<u64> = idle_timers(&sim)
        .into_iter()
        .filter_map(|(_, t)| match t {
            Task::IdleHandler { generation } => Some(generation),
            _ => None,
        })
        .collect();
    assert_eq!(live, vec![2]);
}

#[test]
fn dead_engine_is_never_notified() {
    let (mut sim, probe) = simulator();
    create_views(&mut sim, 1);
    probe.set_dead(true);
    sim.widget(WidgetEvent::Hidden);
    sim.advance(Duration::from_secs(10));
    assert_eq!(idle_calls(&probe), 0);
    assert!(idle_timers(&sim).is_empty());
}

#[test]
fn idle_timer_does_not_start_the_engine() {
    let (mut sim, probe) = simulator();
    sim.thread_mut().widget_created();
    sim.widget(WidgetEvent::Hidden);
    assert!(!sim.thread().engine_initialized());
    sim.advance(Duration::from_secs(1));
    assert!(!sim.thread().engine_initialized());
    assert!(probe.calls().is_empty());
    assert!(idle_timers(&sim).is_empty(), "no follow-up timer without an engine");

    // The next view brings the engine up; a fresh hide cycle notifies it.
    sim.send(ControlMsg::New(NewViewParams::default()));
    sim.widget(WidgetEvent::Hidden);
    sim.advance(Duration::from_secs(1));
    assert_eq!(probe.calls().first(), Some(&EngineCall::SetHooks));
    assert_eq!(idle_calls(&probe), 1);
}

#[test]
fn destroying_the_visible_widget_leaves_counts_consistent() {
    let (mut sim, _probe) = simulator();
    create_views(&mut sim, 2);
    sim.widget(WidgetEvent::Hidden);
    sim.widget(WidgetEvent::Destroyed { was_hidden: false });
    assert_eq!(sim.thread().widget_count(), 1);
    assert_eq!(sim.thread().hidden_widget_count(), 1);
}

#[test]
fn floor_of_delay_sequence() {
    let mut d = 1.0;
    let mut secs = Vec::new();
    for _ in 0..6 {
        d = next_delay(d);
        secs.push(timer_for(d).as_secs());
    }
    assert_eq!(secs, vec![1, 1, 1, 2, 2, 2]);
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Create,
    Destroy,
    Hide,
    Restore,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Create),
        Just(Op::Destroy),
        Just(Op::Hide),
        Just(Op::Restore),
    ]
}

proptest! {
    #[test]
    fn hidden_never_exceeds_total(ops in proptest::collection::vec(op(), 0..200)) {
        let runner = TaskRunner::new(Instant::now());
        let mut idle = IdleScheduler::new(1.0);
        for op in ops {
            // Only issue calls whose preconditions hold; the scheduler
            // panics on the rest.
            match op {
                Op::Create => idle.widget_created(),
                Op::Destroy if idle.widget_count() > 0 => {
                    let visible = idle.widget_count() - idle.hidden_widget_count();
                    idle.widget_destroyed(visible == 0);
                }
                Op::Hide if idle.hidden_widget_count() < idle.widget_count() => {
                    idle.widget_hidden(&runner);
                }
                Op::Restore if idle.hidden_widget_count() > 0 => idle.widget_restored(),
                _ => {}
            }
            prop_assert!(idle.hidden_widget_count() <= idle.widget_count());
            prop_assert!(idle.state() != IdleState::ArmedIdle || idle.is_fully_hidden());
        }
    }

    #[test]
    fn delay_strictly_increases(start in 0.5f64..10.0, steps in 1usize..50) {
        let mut d = start;
        for _ in 0..steps {
            let next = next_delay(d);
            prop_assert!(next > d);
            prop_assert!(next - d <= 1.0 / (start + 2.0) + 1e-12);
            d = next;
        }
    }
}
