//! Probe emission: turn a call event into the provider's foreign call.
//!
//! Nothing here propagates out. Encoding problems and provider panics are
//! counted, reported once per kind and dropped.

use std::any::Any;
use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};
use usdt_hooks::CodeInfo;

use crate::error::EmitError;
use crate::log_once::LogOnce;
use crate::provider::{ProbeKind, ProbeProvider, ProviderHandle};

/// One function entry, borrowed from the hook payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallEvent<'a> {
    pub name: &'a str,
    pub source_file: &'a str,
    pub line: i64,
}

impl<'a> CallEvent<'a> {
    #[must_use]
    pub const fn new(name: &'a str, source_file: &'a str, line: i64) -> Self {
        Self {
            name,
            source_file,
            line,
        }
    }
}

impl<'a> From<&CodeInfo<'a>> for CallEvent<'a> {
    fn from(code: &CodeInfo<'a>) -> Self {
        Self::new(code.name, code.filename, code.first_line)
    }
}

/// Emission counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitterStats {
    /// Foreign calls that returned normally.
    pub emitted: u64,
    /// Events dropped because encoding or the foreign call failed.
    pub failed: u64,
}

/// Probe emission adapter.
pub struct ProbeEmitter {
    provider: ProviderHandle,
    emitted: AtomicU64,
    failed: AtomicU64,
    failures: LogOnce,
}

impl ProbeEmitter {
    #[must_use]
    pub fn new(provider: ProviderHandle) -> Self {
        Self {
            provider,
            emitted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failures: LogOnce::default(),
        }
    }

    #[must_use]
    pub const fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    /// Fire the function-entry probe for `event`.
    pub fn emit(&self, event: &CallEvent<'_>) {
        self.emit_probe(ProbeKind::Start, event);
    }

    /// Fire probe `kind` for `event`. No-op when the provider is absent.
    pub fn emit_probe(&self, kind: ProbeKind, event: &CallEvent<'_>) {
        let ProviderHandle::Present(provider) = &self.provider else {
            return;
        };
        match fire(provider.as_ref(), kind, event) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.report(kind, event, &e),
        }
    }

    #[must_use]
    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn report(&self, kind: ProbeKind, event: &CallEvent<'_>, error: &EmitError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if self.failures.first(error.kind()) {
            warn!(
                probe = %kind,
                function = event.name,
                file = event.source_file,
                line = event.line,
                error = %error,
                "probe emission failed"
            );
        } else {
            debug!(probe = %kind, function = event.name, error = %error, "probe emission failed");
        }
    }
}

fn fire(
    provider: &dyn ProbeProvider,
    kind: ProbeKind,
    event: &CallEvent<'_>,
) -> Result<(), EmitError> {
    let name = CString::new(event.name).map_err(|_| EmitError::InteriorNul { field: "name" })?;
    let file = CString::new(event.source_file)
        .map_err(|_| EmitError::InteriorNul { field: "source_file" })?;
    panic::catch_unwind(AssertUnwindSafe(|| {
        provider.fire(kind, &name, &file, event.line);
    }))
    .map_err(|payload| EmitError::ProviderPanicked(panic_message(payload.as_ref())))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
