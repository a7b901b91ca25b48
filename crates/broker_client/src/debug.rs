//! Protocol debug sink
//!
//! Receives one line per frame (`>>> SUBSCRIBE ...`, `<<< MESSAGE ...`).

use std::fmt;
use std::sync::Arc;

/// Caller-supplied debug hook
pub type DebugHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Where protocol-level debug lines go
#[derive(Clone, Default)]
pub enum DebugSink {
    /// Discard
    #[default]
    Off,
    /// `tracing::debug!` under target `stomp`
    Tracing,
    /// Caller-supplied function
    Hook(DebugHook),
}

impl DebugSink {
    /// `debug = true` maps to tracing output
    pub fn from_flag(enabled: bool) -> Self {
        if enabled {
            Self::Tracing
        } else {
            Self::Off
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Emit a line; the closure only runs when the sink is enabled
    pub fn emit(&self, line: impl FnOnce() -> String) {
        match self {
            Self::Off => {}
            Self::Tracing => tracing::debug!(target: "stomp", "{}", line()),
            Self::Hook(hook) => hook(&line()),
        }
    }
}

impl fmt::Debug for DebugSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("Off"),
            Self::Tracing => f.write_str("Tracing"),
            Self::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}
