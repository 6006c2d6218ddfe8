#![forbid(unsafe_code)]

//! Renderer control harness.
//!
//! Spawns a control thread on its own OS thread with a recording engine,
//! plays a short scripted session from the "parent" side, and prints every
//! message the renderer sent back as one JSON object per line.
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=rctl_runtime=debug cargo run -p rctl-harness
//! ```
//!
//! # Environment
//!
//! - `RUST_LOG`: log filter, `info` when unset
//! - `RCTL_HARNESS_IDLE_WAIT_MS`: how long to leave every widget hidden
//!   before stopping (default 2500)
//! - `RCTL_HARNESS_VIEWS`: number of views to create (default 2)
//! - plus the `RCTL_*` overrides read by `ControlConfig::from_env`

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use rctl_core::testing::RecordingEngine;
use rctl_core::{ControlMsg, NewViewParams, SharedMemoryHandle};
use rctl_runtime::handlers::visited_links::encode_table;
use rctl_runtime::{ChannelEvent, ControlConfig, RendererHandle, WidgetEvent};
use tracing_subscriber::EnvFilter;

const DEFAULT_IDLE_WAIT_MS: u64 = 2500;
const DEFAULT_VIEWS: i32 = 2;

const USER_SCRIPTS: &str = r#"[
  {"name": "greeter", "matches": ["https://*.example.com/*"], "run_at": "document_start",
   "js": ["console.log('hi')"]},
  {"name": "styler", "matches": ["*"], "css": ["body { margin: 0 }"]}
]"#;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn send(handle: &RendererHandle, event: ChannelEvent) -> io::Result<()> {
    if handle.send(event) {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "renderer exited early",
        ))
    }
}

fn play_session(handle: &RendererHandle, views: i32, idle_wait: Duration) -> io::Result<()> {
    send(handle, ChannelEvent::Message(ControlMsg::SetNextPageId(100)))?;

    let table = encode_table(*b"harness!", 64, &[0x1d2c_3b4a, 0x5e6f_7081]);
    send(
        handle,
        ChannelEvent::Message(ControlMsg::VisitedLinkNewTable(
            SharedMemoryHandle::from_bytes(table),
        )),
    )?;
    send(
        handle,
        ChannelEvent::Message(ControlMsg::UserScriptsUpdated(
            SharedMemoryHandle::from_bytes(USER_SCRIPTS),
        )),
    )?;

    for view_id in 0..views {
        send(
            handle,
            ChannelEvent::Message(ControlMsg::New(NewViewParams {
                view_id,
                ..NewViewParams::default()
            })),
        )?;
    }
    send(handle, ChannelEvent::Message(ControlMsg::GetCacheResourceStats))?;
    send(
        handle,
        ChannelEvent::Message(ControlMsg::GetRendererHistograms { sequence: 1 }),
    )?;

    for _ in 0..views {
        send(handle, ChannelEvent::Widget(WidgetEvent::Hidden))?;
    }
    tracing::info!(?idle_wait, "all views hidden; waiting for idle notifications");
    thread::sleep(idle_wait);

    send(handle, ChannelEvent::Widget(WidgetEvent::Restored))?;
    send(handle, ChannelEvent::Shutdown)
}

fn main() -> io::Result<()> {
    init_tracing();

    let idle_wait = Duration::from_millis(
        env_parse("RCTL_HARNESS_IDLE_WAIT_MS").unwrap_or(DEFAULT_IDLE_WAIT_MS),
    );
    let views = env_parse("RCTL_HARNESS_VIEWS")
        .unwrap_or(DEFAULT_VIEWS)
        .max(1);
    // The harness must survive its own teardown, so no suicide filter.
    let config = ControlConfig::for_process().with_exit_on_channel_error(false);

    let handle = rctl_runtime::spawn(config, || RecordingEngine::new().0)?;
    let session = play_session(&handle, views, idle_wait);

    let (result, outbound) = handle.join();
    let reason = result.map_err(|_| io::Error::other("renderer thread panicked"))?;
    session?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for msg in &outbound {
        serde_json::to_writer(&mut out, msg)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    tracing::info!(?reason, messages = outbound.len(), "renderer stopped");
    Ok(())
}
