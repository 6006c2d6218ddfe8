#![forbid(unsafe_code)]

//! One-time engine bring-up.
//!
//! The engine is started lazily, on the first operation that needs it, and
//! exactly once per process. Start-up is a fixed sequence of side effects
//! whose order is observable (later registrations depend on earlier ones):
//!
//! 1. install counter and histogram hooks;
//! 2. initialize with the platform-support object;
//! 3. lock the script engine to this thread;
//! 4. isolate the `chrome` and `print` schemes (local, then no-access);
//! 5. register the base script capabilities and the extension bindings;
//! 6. register benchmarking and playback support when the process was
//!    started for it;
//! 7. enable the media player when the media library loaded.
//!
//! # Invariants
//!
//! - The gate moves `Uninitialized -> Initialized` once and never back.
//! - A scheme is never registered as local without being registered as
//!   no-access right after.

use rctl_core::{
    Capability, Engine, EngineHooks, PlatformSupport, RegistrationTarget, Switches,
};

/// Schemes whose pages may not script, or be scripted by, other origins.
pub const ISOLATED_SCHEMES: [&str; 2] = ["chrome", "print"];

/// Scheme extension pages are served from.
pub const EXTENSION_SCHEME: &str = "chrome-extension";

/// Capabilities offered to content scripts and extension pages alike.
const EXTENSION_CAPABILITIES: [Capability; 5] = [
    Capability::BaseJs,
    Capability::JsonSchema,
    Capability::EventBindings,
    Capability::RendererExtensionBindings,
    Capability::ExtensionApiTest,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Uninitialized,
    Initialized,
}

/// What the gate needs to bring the engine up.
#[derive(Debug, Clone)]
pub struct InitContext {
    pub hooks: EngineHooks,
    pub platform: PlatformSupport,
    pub switches: Switches,
    pub media_library_initialized: bool,
}

#[derive(Debug)]
pub struct EngineInitGate {
    state: GateState,
}

impl Default for EngineInitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineInitGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: GateState::Uninitialized,
        }
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        self.state
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state == GateState::Initialized
    }

    /// Bring the engine up if it is not already. Returns `true` if this call
    /// did the work.
    pub fn ensure_initialized(&mut self, engine: &mut dyn Engine, ctx: &InitContext) -> bool {
        if self.is_initialized() {
            return false;
        }
        let _span = tracing::info_span!("engine_init").entered();

        engine.set_hooks(ctx.hooks.clone());
        engine.initialize(ctx.platform.clone());
        engine.enable_single_thread_mode();

        for scheme in ISOLATED_SCHEMES {
            register_isolated_scheme(engine, scheme);
        }

        if cfg!(windows) {
            engine.register_extension(Capability::Gears, RegistrationTarget::AllContexts);
        }
        for capability in [Capability::Interval, Capability::LoadTimes, Capability::External] {
            engine.register_extension(capability, RegistrationTarget::AllContexts);
        }

        let extension_scheme = RegistrationTarget::Scheme(EXTENSION_SCHEME.to_owned());
        engine.register_extension(Capability::ExtensionProcessBindings, extension_scheme.clone());
        for capability in EXTENSION_CAPABILITIES {
            engine.register_extension(capability, RegistrationTarget::ContentScripts);
            engine.register_extension(capability, extension_scheme.clone());
        }

        if ctx.switches.contains(Switches::ENABLE_BENCHMARKING) {
            engine.register_extension(Capability::Benchmarking, RegistrationTarget::AllContexts);
        }
        if ctx.switches.wants_playback() {
            engine.register_extension(Capability::Playback, RegistrationTarget::AllContexts);
        }

        if ctx.media_library_initialized {
            engine.enable_media_player();
        }

        self.state = GateState::Initialized;
        tracing::info!(switches = ?ctx.switches, "engine initialized");
        true
    }
}

fn register_isolated_scheme(engine: &mut dyn Engine, scheme: &str) {
    engine.register_scheme_as_local(scheme);
    engine.register_scheme_as_no_access(scheme);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rctl_core::testing::{EngineCall, RecordingEngine};
    use std::cell::Cell;
    use std::rc::Rc;

    fn ctx(switches: Switches, media: bool) -> InitContext {
        InitContext {
            hooks: EngineHooks::default(),
            platform: PlatformSupport::new(Rc::new(Cell::new(true))),
            switches,
            media_library_initialized: media,
        }
    }

    #[test]
    fn second_call_is_a_no_op() {
        let (mut engine, probe) = RecordingEngine::new();
        let mut gate = EngineInitGate::new();
        assert!(gate.ensure_initialized(&mut engine, &ctx(Switches::empty(), false)));
        let first = probe.calls().len();
        assert!(!gate.ensure_initialized(&mut engine, &ctx(Switches::empty(), false)));
        assert_eq!(probe.calls().len(), first);
        assert_eq!(gate.state(), GateState::Initialized);
    }

    #[test]
    fn start_up_order_is_fixed() {
        let (mut engine, probe) = RecordingEngine::new();
        EngineInitGate::new().ensure_initialized(&mut engine, &ctx(Switches::empty(), false));
        let calls = probe.calls();
        assert_eq!(
            &calls[..7],
            &[
                EngineCall::SetHooks,
                EngineCall::Initialize,
                EngineCall::EnableSingleThreadMode,
                EngineCall::RegisterSchemeAsLocal("chrome".into()),
                EngineCall::RegisterSchemeAsNoAccess("chrome".into()),
                EngineCall::RegisterSchemeAsLocal("print".into()),
                EngineCall::RegisterSchemeAsNoAccess("print".into()),
            ]
        );
        assert!(!calls.contains(&EngineCall::EnableMediaPlayer));
        assert!(!calls.iter().any(|c| matches!(
            c,
            EngineCall::RegisterExtension(Capability::Playback | Capability::Benchmarking, _)
        )));
    }

    #[test]
    fn extension_capabilities_register_twice() {
        let (mut engine, probe) = RecordingEngine::new();
        EngineInitGate::new().ensure_initialized(&mut engine, &ctx(Switches::empty(), false));
        for capability in EXTENSION_CAPABILITIES {
            let n = probe.count(|c| matches!(c, EngineCall::RegisterExtension(cap, _) if *cap == capability));
            assert_eq!(n, 2, "{capability}");
        }
    }

    #[test]
    fn switches_and_media_add_registrations() {
        let (mut engine, probe) = RecordingEngine::new();
        let switches = Switches::ENABLE_BENCHMARKING | Switches::NO_JS_RANDOMNESS;
        EngineInitGate::new().ensure_initialized(&mut engine, &ctx(switches, true));
        let calls = probe.calls();
        let tail: Vec<_> = calls.iter().rev().take(3).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                EngineCall::RegisterExtension(Capability::Benchmarking, RegistrationTarget::AllContexts),
                EngineCall::RegisterExtension(Capability::Playback, RegistrationTarget::AllContexts),
                EngineCall::EnableMediaPlayer,
            ]
        );
    }
}
