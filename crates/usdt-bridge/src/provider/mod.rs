//! Native probe provider abstraction.
//!
//! The provider defines the gated trace points and owns their activation
//! counters. [`DylibProvider`] resolves them from a shared library; tests
//! substitute their own [`ProbeProvider`].

mod dylib;

use std::ffi::CStr;
use std::fmt;
use std::sync::Arc;

use usdt_hooks::Event;

use crate::error::ProviderError;

pub use dylib::{DylibProvider, ProbeFn};

/// Trace points the bridge can fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Function entry.
    Start,
    /// Suspended frame resumed.
    Resume,
}

impl ProbeKind {
    pub const ALL: [Self; 2] = [Self::Start, Self::Resume];

    /// Hook event that feeds this probe.
    #[must_use]
    pub const fn event(self) -> Event {
        match self {
            Self::Start => Event::FunctionStart,
            Self::Resume => Event::FunctionResume,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Resume => "resume",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A loaded native probe provider.
///
/// Implementations must be callable from any thread, and `fire` must be a
/// no-op on the provider side when the probe's own counter is zero.
pub trait ProbeProvider: Send + Sync {
    /// Probes this provider exposes. Always includes [`ProbeKind::Start`].
    fn probes(&self) -> &[ProbeKind];

    /// Make the single foreign call for one event.
    fn fire(&self, kind: ProbeKind, name: &CStr, file: &CStr, line: i64);

    /// Current activation counter, summed over all exposed probes.
    ///
    /// # Errors
    /// Returns an error if the counter cannot be read.
    fn activation(&self) -> Result<u32, ProviderError>;
}

/// Write-once reference to the provider.
#[derive(Clone, Default)]
pub enum ProviderHandle {
    Present(Arc<dyn ProbeProvider>),
    #[default]
    Absent,
}

impl ProviderHandle {
    pub fn present(provider: impl ProbeProvider + 'static) -> Self {
        Self::Present(Arc::new(provider))
    }

    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Probes available through this handle; empty when absent.
    #[must_use]
    pub fn probes(&self) -> &[ProbeKind] {
        match self {
            Self::Present(provider) => provider.probes(),
            Self::Absent => &[],
        }
    }

    /// Read the activation counter.
    ///
    /// # Errors
    /// Returns [`ProviderError::Absent`] when no provider is loaded, or the
    /// provider's own read error.
    pub fn activation(&self) -> Result<u32, ProviderError> {
        match self {
            Self::Present(provider) => provider.activation(),
            Self::Absent => Err(ProviderError::Absent),
        }
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(provider) => f
                .debug_tuple("Present")
                .field(&provider.probes())
                .finish(),
            Self::Absent => f.write_str("Absent"),
        }
    }
}
