//! Event hook controller: registers and removes the function-entry hook.
//!
//! Registration changes are serialized by `registration`; the armed flag is
//! read lock-free by the hook itself, so no lock is ever held while an event
//! is forwarded to the emitter.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, info};
use usdt_hooks::{Callback, EventSet, Monitoring, ToolId, callback};

use crate::emit::{CallEvent, ProbeEmitter};
use crate::error::ControllerError;
use crate::provider::ProbeKind;

/// Whether the hook is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationState {
    Disarmed,
    Armed,
}

impl ActivationState {
    #[must_use]
    pub const fn is_armed(self) -> bool {
        matches!(self, Self::Armed)
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disarmed => "disarmed",
            Self::Armed => "armed",
        })
    }
}

/// Drives hook registration on a [`Monitoring`] table.
pub struct HookController {
    hooks: Arc<Monitoring>,
    emitter: Arc<ProbeEmitter>,
    tool_id: ToolId,
    tool_name: String,
    armed: Arc<AtomicBool>,
    registration: Mutex<()>,
}

impl HookController {
    pub fn new(
        hooks: Arc<Monitoring>,
        emitter: Arc<ProbeEmitter>,
        tool_id: ToolId,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            hooks,
            emitter,
            tool_id,
            tool_name: tool_name.into(),
            armed: Arc::new(AtomicBool::new(false)),
            registration: Mutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ActivationState {
        if self.armed.load(Ordering::Acquire) {
            ActivationState::Armed
        } else {
            ActivationState::Disarmed
        }
    }

    #[must_use]
    pub const fn emitter(&self) -> &Arc<ProbeEmitter> {
        &self.emitter
    }

    /// Events the hook listens to: one per probe the provider exposes.
    #[must_use]
    pub fn events(&self) -> EventSet {
        self.emitter
            .provider()
            .probes()
            .iter()
            .map(|kind| kind.event())
            .collect()
    }

    /// Register the hook.
    ///
    /// # Errors
    /// [`ControllerError::AlreadyArmed`] if armed (nothing is registered
    /// twice); [`ControllerError::Registration`] if the hook table refused,
    /// in which case any partial registration is rolled back.
    pub fn arm(&self) -> Result<(), ControllerError> {
        let _guard = self.registration.lock();
        if self.armed.load(Ordering::Acquire) {
            return Err(ControllerError::AlreadyArmed);
        }
        self.install()?;
        self.armed.store(true, Ordering::Release);

        counter!("usdt_bridge_transitions_total", "to" => "armed").increment(1);
        gauge!("usdt_bridge_armed").set(1.0);
        info!(tool = %self.tool_id, events = ?self.events(), "hook armed");
        Ok(())
    }

    /// Deregister the hook.
    ///
    /// # Errors
    /// [`ControllerError::AlreadyDisarmed`] if not armed;
    /// [`ControllerError::Registration`] if the hook table refused, in which
    /// case the controller stays armed.
    pub fn disarm(&self) -> Result<(), ControllerError> {
        let _guard = self.registration.lock();
        if !self.armed.load(Ordering::Acquire) {
            return Err(ControllerError::AlreadyDisarmed);
        }
        // Stop forwarding before the hook leaves the table; events already
        // past the table's gate see the flag and drop.
        self.armed.store(false, Ordering::Release);
        if let Err(e) = self.uninstall() {
            self.armed.store(true, Ordering::Release);
            return Err(e);
        }

        counter!("usdt_bridge_transitions_total", "to" => "disarmed").increment(1);
        gauge!("usdt_bridge_armed").set(0.0);
        info!(tool = %self.tool_id, "hook disarmed");
        Ok(())
    }

    fn install(&self) -> Result<(), ControllerError> {
        let probes = self.emitter.provider().probes();
        self.hooks.use_tool_id(self.tool_id, &self.tool_name)?;
        let registered = probes
            .iter()
            .try_for_each(|&kind| {
                self.hooks
                    .register_callback(self.tool_id, kind.event(), Some(self.hook(kind)))
                    .map(drop)
            })
            .and_then(|()| self.hooks.set_events(self.tool_id, self.events()));
        if let Err(e) = registered {
            if let Err(cleanup) = self.hooks.free_tool_id(self.tool_id) {
                debug!(error = %cleanup, "rollback after failed arm");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ControllerError> {
        if self.hooks.get_tool(self.tool_id).as_deref() != Some(self.tool_name.as_str()) {
            debug!(tool = %self.tool_id, "hook slot already released");
            return Ok(());
        }
        self.hooks.set_events(self.tool_id, EventSet::EMPTY)?;
        self.hooks.free_tool_id(self.tool_id)?;
        Ok(())
    }

    fn hook(&self, kind: ProbeKind) -> Callback {
        let emitter = Arc::clone(&self.emitter);
        let armed = Arc::clone(&self.armed);
        callback(move |code, _offset| {
            if armed.load(Ordering::Acquire) {
                emitter.emit_probe(kind, &CallEvent::from(code));
            }
        })
    }
}

impl fmt::Debug for HookController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookController")
            .field("tool_id", &self.tool_id)
            .field("tool_name", &self.tool_name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
