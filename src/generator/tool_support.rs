//! Per-adapter tool-support probe.
//!
//! Whether a configured model accepts tool declarations is only learnable by
//! trying. Every adapter starts optimistic; the first request the backend
//! rejects because of the attached tools flips the probe to `Disabled` for
//! the adapter's whole lifetime. There is deliberately no way back: a model
//! that rejected tools once will reject them again, and re-probing on every
//! call would double the failure traffic.
//!
//! The flag is a relaxed atomic with no lock around the check-translate-send
//! window. Concurrent calls may both observe `Enabled`, both fail, and both
//! land the same `disable()`; the flag converges and both retries go out
//! tool-free, so the race is harmless and not worth a mutex.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::Error;

/// What the adapter currently believes about tool support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSupportState {
    Enabled,
    Disabled,
}

/// One-way tool-support flag, `Enabled` until proven otherwise.
#[derive(Debug, Default)]
pub struct ToolSupport {
    disabled: AtomicBool,
}

impl ToolSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ToolSupportState {
        if self.is_enabled() {
            ToolSupportState::Enabled
        } else {
            ToolSupportState::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled.load(Ordering::Relaxed)
    }

    /// Permanently switch the adapter to tool-free payloads.
    pub fn disable(&self) {
        self.disabled.store(true, Ordering::Relaxed);
    }
}

static UNSUPPORTED_TOOLS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)does not support tool|tool (?:use|calling) is not supported|tools? (?:is|are) not supported|no tool support",
    )
    .expect("hardcoded pattern compiles")
});

/// Whether an error is the backend refusing tool declarations.
pub fn is_unsupported_tools_error(error: &Error) -> bool {
    match error {
        Error::ToolsUnsupported { .. } => true,
        Error::Provider { message, .. } => UNSUPPORTED_TOOLS.is_match(message),
        _ => false,
    }
}

/// Upgrade a generic backend failure into [`Error::ToolsUnsupported`] when
/// its message matches the known refusal patterns.
pub fn classify(error: Error) -> Error {
    match error {
        Error::Provider { backend, message } if UNSUPPORTED_TOOLS.is_match(&message) => {
            Error::ToolsUnsupported { backend, message }
        }
        other => other,
    }
}
