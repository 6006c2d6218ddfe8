#![forbid(unsafe_code)]

//! Span instrumentation of the control thread.
//!
//!   cargo test -p rctl-runtime --test tracing_spans

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rctl_core::testing::RecordingEngine;
use rctl_core::{ControlMsg, NewViewParams};
use rctl_runtime::{ControlConfig, LoopSimulator, WidgetEvent};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

#[derive(Debug, Clone)]
struct CapturedSpan {
    name: String,
    fields: HashMap<String, String>,
    parent_name: Option<String>,
}

/// Layer that records every span created, with its fields and the span
/// that was current at the time.
struct SpanCapture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

struct CaptureHandle {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

impl CaptureHandle {
    fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.lock().unwrap().clone()
    }

    fn named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }
}

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S> tracing_subscriber::Layer<S> for SpanCapture
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        attrs.record(&mut visitor);
        let parent_name = ctx
            .current_span()
            .id()
            .and_then(|id| ctx.span(id))
            .map(|span_ref| span_ref.name().to_string());
        self.spans.lock().unwrap().push(CapturedSpan {
            name: attrs.metadata().name().to_string(),
            fields: visitor.0.into_iter().collect(),
            parent_name,
        });
    }
}

fn with_captured_spans<F>(f: F) -> CaptureHandle
where
    F: FnOnce(),
{
    let spans = Arc::new(Mutex::new(Vec::new()));
    let layer = SpanCapture {
        spans: Arc::clone(&spans),
    };
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, f);
    CaptureHandle { spans }
}

fn simulator() -> LoopSimulator {
    let config = ControlConfig::default().with_exit_on_channel_error(false);
    LoopSimulator::new(config, RecordingEngine::new().0)
}

#[test]
fn each_dispatch_gets_a_span_with_its_kind() {
    let handle = with_captured_spans(|| {
        let mut sim = simulator();
        sim.send(ControlMsg::SetNextPageId(2));
        sim.send(ControlMsg::GetRendererHistograms { sequence: 1 });
    });
    let kinds: Vec<String> = handle
        .named("dispatch")
        .into_iter()
        .map(|s| s.fields["kind"].clone())
        .collect();
    assert_eq!(kinds, ["set_next_page_id", "get_renderer_histograms"]);
}

#[test]
fn filtered_messages_never_reach_dispatch() {
    let handle = with_captured_spans(|| {
        let mut sim = simulator();
        sim.send(ControlMsg::DevToolsRpc("{}".into()));
    });
    assert!(handle.named("dispatch").is_empty());
}

#[test]
fn engine_init_nests_under_the_triggering_dispatch() {
    let handle = with_captured_spans(|| {
        let mut sim = simulator();
        sim.send(ControlMsg::New(NewViewParams::default()));
        sim.send(ControlMsg::New(NewViewParams::default()));
    });
    let init = handle.named("engine_init");
    assert_eq!(init.len(), 1, "engine is brought up once");
    assert_eq!(init[0].parent_name.as_deref(), Some("dispatch"));
}

#[test]
fn engine_init_from_a_timer_has_no_dispatch_parent() {
    let handle = with_captured_spans(|| {
        let mut sim = simulator();
        sim.thread_mut().inform_host_of_cache_stats_later();
        sim.advance(Duration::from_secs(2));
    });
    let init = handle.named("engine_init");
    assert_eq!(init.len(), 1);
    assert_eq!(init[0].parent_name, None);
}

#[test]
fn idle_timer_never_opens_an_engine_init_span() {
    let handle = with_captured_spans(|| {
        let mut sim = simulator();
        sim.thread_mut().widget_created();
        sim.widget(WidgetEvent::Hidden);
        sim.advance(Duration::from_secs(1));
    });
    assert!(handle.named("engine_init").is_empty());
}
