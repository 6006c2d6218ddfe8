#![forbid(unsafe_code)]

//! Outbound reports: cache statistics, DNS prefetch, histograms.

use std::time::Duration;

use rctl_core::testing::{EngineCall, EngineProbe, RecordingEngine};
use rctl_core::{ControlMsg, HostMsg, ResourceTypeStat, ResourceTypeStats, UsageStats};
use rctl_runtime::{ControlConfig, LoopSimulator, Task};

fn simulator() -> (LoopSimulator, EngineProbe) {
    let (engine, probe) = RecordingEngine::new();
    let config = ControlConfig::default().with_exit_on_channel_error(false);
    (LoopSimulator::new(config, engine), probe)
}

#[test]
fn cache_stats_requests_collapse_into_one_report() {
    let (mut sim, probe) = simulator();
    let usage = UsageStats {
        capacity: 64 << 20,
        live_size: 3 << 20,
        dead_size: 1 << 20,
        ..UsageStats::default()
    };
    probe.set_usage_stats(usage);

    for _ in 0..25 {
        sim.thread_mut().inform_host_of_cache_stats_later();
        sim.advance(Duration::from_millis(50));
    }
    // 1250 ms in: still inside the window.
    assert!(sim.take_outbound().is_empty());
    assert!(sim.thread().cache_stats_pending());

    sim.advance(Duration::from_millis(750));
    assert_eq!(sim.take_outbound(), vec![HostMsg::UpdatedCacheStats(usage)]);
    assert!(!sim.thread().cache_stats_pending());
    assert_eq!(probe.count(|c| *c == EngineCall::UsageStats), 1);

    // The next request opens a fresh window.
    sim.thread_mut().inform_host_of_cache_stats_later();
    sim.advance(Duration::from_secs(2));
    assert_eq!(sim.take_outbound().len(), 1);
}

#[test]
fn cache_stats_delay_is_configurable() {
    let (engine, _probe) = RecordingEngine::new();
    let config = ControlConfig::default()
        .with_exit_on_channel_error(false)
        .with_cache_stats_delay(Duration::from_millis(300));
    let mut sim = LoopSimulator::new(config, engine);
    sim.thread_mut().inform_host_of_cache_stats_later();
    sim.advance(Duration::from_millis(299));
    assert!(sim.take_outbound().is_empty());
    sim.advance(Duration::from_millis(1));
    assert_eq!(sim.task_log().len(), 1);
    assert_eq!(sim.task_log()[0].task, Task::InformHostOfCacheStats);
    assert_eq!(sim.task_log()[0].at, Duration::from_millis(300));
}

#[test]
fn resource_stats_reply_immediately() {
    let (mut sim, probe) = simulator();
    let stats = ResourceTypeStats {
        images: ResourceTypeStat {
            count: 12,
            size: 4096,
            live_size: 2048,
            decoded_size: 16384,
        },
        ..ResourceTypeStats::default()
    };
    probe.set_resource_stats(stats);
    sim.send(ControlMsg::GetCacheResourceStats);
    assert_eq!(sim.take_outbound(), vec![HostMsg::ResourceTypeStats(stats)]);
}

#[test]
fn dns_names_are_batched_and_deduplicated() {
    let (mut sim, _probe) = simulator();
    {
        let mut thread = sim.thread_mut();
        for i in 0..45 {
            assert!(thread.resolve(&format!("host{i}.example.com")));
        }
        assert!(!thread.resolve("HOST0.example.com."), "duplicate after normalizing");
        assert!(!thread.resolve("192.168.0.1"));
        assert!(!thread.resolve("[::1]"));
        assert!(!thread.resolve(""));
    }

    sim.advance(Duration::from_millis(10));
    let first = sim.take_outbound();
    assert_eq!(first.len(), 1);
    let HostMsg::DnsPrefetch(names) = &first[0] else {
        panic!("expected a prefetch batch, got {first:?}");
    };
    assert_eq!(names.len(), 30);
    assert_eq!(names[0], "host0.example.com");

    sim.advance(Duration::from_millis(10));
    let second = sim.take_outbound();
    assert!(matches!(&second[..], [HostMsg::DnsPrefetch(rest)] if rest.len() == 15));

    sim.advance(Duration::from_secs(1));
    assert!(sim.take_outbound().is_empty());
}

#[test]
fn histograms_report_only_new_samples() {
    let (mut sim, _probe) = simulator();
    let (load, scratch) = {
        let thread = sim.thread();
        let registry = thread.hooks().histograms();
        (
            registry.create("Renderer.Load", 1, 10_000, 20, true),
            registry.create("Renderer.Scratch", 1, 100, 4, false),
        )
    };
    {
        let thread = sim.thread();
        let registry = thread.hooks().histograms();
        registry.add_sample(load, 120);
        registry.add_sample(load, 300);
        registry.add_sample(scratch, 7);
    }

    sim.send(ControlMsg::GetRendererHistograms { sequence: 7 });
    let out = sim.take_outbound();
    let [HostMsg::RendererHistograms { sequence, deltas }] = &out[..] else {
        panic!("expected one histogram reply, got {out:?}");
    };
    assert_eq!(*sequence, 7);
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].name, "Renderer.Load");
    assert_eq!(deltas[0].total_count(), 2);
    assert_eq!(deltas[0].sum, 420);

    // Nothing new: the reply still goes out, empty.
    sim.send(ControlMsg::GetRendererHistograms { sequence: 8 });
    assert_eq!(
        sim.take_outbound(),
        vec![HostMsg::RendererHistograms {
            sequence: 8,
            deltas: vec![]
        }]
    );
}

#[test]
fn direct_host_messages() {
    let (mut sim, _probe) = simulator();
    {
        let mut thread = sim.thread_mut();
        thread.close_idle_connections();
        thread.set_cache_mode(false);
        assert!(thread.register_appcache_host(3));
        assert!(!thread.register_appcache_host(3));
        assert!(thread.unregister_appcache_host(3));
        assert!(!thread.unregister_appcache_host(3));
    }
    assert_eq!(
        sim.take_outbound(),
        vec![
            HostMsg::CloseIdleConnections,
            HostMsg::SetCacheMode(false),
            HostMsg::AppCacheRegisterHost(3),
            HostMsg::AppCacheUnregisterHost(3),
        ]
    );
}

#[test]
fn engine_counters_flow_into_hooks() {
    let (mut sim, probe) = simulator();
    sim.send(ControlMsg::GetCacheResourceStats);
    let hooks = probe.hooks().expect("hooks installed at bring-up");
    let slot = hooks.find_counter("c:renderer.custom");
    hooks.add_to_counter(slot, 5);
    assert_eq!(sim.thread().hooks().counters().value("c:renderer.custom"), Some(5));
}
