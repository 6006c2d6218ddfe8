#![forbid(unsafe_code)]

//! Process-start switches that gate optional engine capabilities.

use bitflags::bitflags;

bitflags! {
    /// Command-line switches the renderer was launched with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Switches: u8 {
        /// `--enable-benchmarking`
        const ENABLE_BENCHMARKING = 0b0001;
        /// `--playback-mode`
        const PLAYBACK_MODE = 0b0010;
        /// `--record-mode`
        const RECORD_MODE = 0b0100;
        /// `--no-js-randomness`
        const NO_JS_RANDOMNESS = 0b1000;
    }
}

impl Switches {
    /// Switch spellings, without the leading dashes.
    const NAMES: [(&'static str, Switches); 4] = [
        ("enable-benchmarking", Switches::ENABLE_BENCHMARKING),
        ("playback-mode", Switches::PLAYBACK_MODE),
        ("record-mode", Switches::RECORD_MODE),
        ("no-js-randomness", Switches::NO_JS_RANDOMNESS),
    ];

    /// Parse switches out of a process argument list.
    ///
    /// Accepts `--name` and `-name`, ignores `=value` suffixes, and skips
    /// anything it does not recognize.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut switches = Self::empty();
        for arg in args {
            let arg = arg.as_ref();
            let Some(body) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
                continue;
            };
            let name = body.split_once('=').map_or(body, |(name, _)| name);
            if let Some((_, flag)) = Self::NAMES.iter().find(|(n, _)| *n == name) {
                switches |= *flag;
            }
        }
        switches
    }

    /// Switches of the current process.
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_args(std::env::args().skip(1))
    }

    /// Whether the deterministic playback capability should be exposed.
    #[inline]
    #[must_use]
    pub fn wants_playback(self) -> bool {
        self.intersects(Self::PLAYBACK_MODE | Self::RECORD_MODE | Self::NO_JS_RANDOMNESS)
    }
}
