//! One-time installation and the process-wide bridge.
//!
//! ```text
//!         provider load fails
//!  [INIT] ---------------------> [INERT]
//!    |
//!    | provider loaded
//!    v
//! [DISARMED] <--- disarm() --- [ARMED]
//!    |--- arm() ------------------->|
//! ```
//!
//! Installation never blocks and never fails outward: a missing provider
//! leaves the bridge inert with the monitor still running as a no-op.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{info, warn};
use usdt_hooks::Monitoring;

use crate::config::BridgeConfig;
use crate::controller::{ActivationState, HookController};
use crate::emit::{EmitterStats, ProbeEmitter};
use crate::error::BridgeError;
use crate::monitor::{ActivationMonitor, Sampler};
use crate::provider::{DylibProvider, ProviderHandle};

/// Lifecycle state of an installed bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    /// No provider; the hook is never armed.
    Inert,
    Disarmed,
    Armed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inert => "inert",
            Self::Disarmed => "disarmed",
            Self::Armed => "armed",
        })
    }
}

/// A running bridge: provider, hook controller and activation monitor.
pub struct Bridge {
    provider: ProviderHandle,
    controller: Arc<HookController>,
    monitor: Mutex<Option<ActivationMonitor>>,
    inert: bool,
}

impl Bridge {
    /// Load the provider named by `config` and start monitoring.
    pub fn start(config: &BridgeConfig, hooks: Arc<Monitoring>) -> Self {
        let provider = match DylibProvider::open(config) {
            Ok(provider) => ProviderHandle::present(provider),
            Err(e) => {
                warn!(error = %e, "could not load probe provider, bridge inactive");
                ProviderHandle::Absent
            }
        };
        Self::start_with_provider(config, hooks, provider)
    }

    /// Start monitoring with an already-resolved provider.
    pub fn start_with_provider(
        config: &BridgeConfig,
        hooks: Arc<Monitoring>,
        provider: ProviderHandle,
    ) -> Self {
        let emitter = Arc::new(ProbeEmitter::new(provider.clone()));
        let controller = Arc::new(HookController::new(
            hooks,
            emitter,
            config.tool_id,
            config.tool_name.clone(),
        ));
        let sampler = Sampler::new(provider.clone(), Arc::clone(&controller));
        let monitor = match ActivationMonitor::spawn(sampler, config.poll_interval) {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                warn!(error = %e, "failed to start activation monitor, bridge inactive");
                None
            }
        };

        let inert = !provider.is_present() || monitor.is_none();
        if !inert {
            info!(
                probes = ?provider.probes(),
                poll_interval = ?config.poll_interval,
                "usdt bridge installed, waiting for tracer"
            );
        }
        Self {
            provider,
            controller,
            monitor: Mutex::new(monitor),
            inert,
        }
    }

    #[must_use]
    pub fn state(&self) -> BridgeState {
        if self.inert {
            return BridgeState::Inert;
        }
        match self.controller.state() {
            ActivationState::Disarmed => BridgeState::Disarmed,
            ActivationState::Armed => BridgeState::Armed,
        }
    }

    #[must_use]
    pub const fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    #[must_use]
    pub const fn controller(&self) -> &Arc<HookController> {
        &self.controller
    }

    #[must_use]
    pub fn stats(&self) -> EmitterStats {
        self.controller.emitter().stats()
    }

    /// Stop the monitor and leave the hook disarmed. Idempotent.
    pub fn shutdown(&self) {
        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.shutdown();
        }
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("provider", &self.provider)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

/// Install the process-wide bridge on the global hook table, configured
/// from the environment. Later calls return the same bridge.
pub fn install() -> &'static Bridge {
    BRIDGE.get_or_init(|| {
        Bridge::start(&BridgeConfig::from_env(), Arc::clone(usdt_hooks::global()))
    })
}

/// Install the process-wide bridge with an explicit configuration.
///
/// # Errors
/// Returns [`BridgeError::AlreadyInstalled`] if a bridge is already
/// installed; the existing one is left untouched.
pub fn install_with(config: &BridgeConfig) -> Result<&'static Bridge, BridgeError> {
    let mut fresh = false;
    let bridge = BRIDGE.get_or_init(|| {
        fresh = true;
        Bridge::start(config, Arc::clone(usdt_hooks::global()))
    });
    if fresh {
        Ok(bridge)
    } else {
        Err(BridgeError::AlreadyInstalled)
    }
}

/// The process-wide bridge, if installed.
pub fn installed() -> Option<&'static Bridge> {
    BRIDGE.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::test_log::CapturedLogs;

    #[test]
    fn test_missing_provider_is_inert() {
        let config = BridgeConfig::default()
            .with_library("/nonexistent/libpyusdt.so")
            .with_poll_interval(Duration::from_millis(1));
        let hooks = Arc::new(Monitoring::new());
        let logs = CapturedLogs::default();
        let bridge = logs.capture("usdt_bridge=warn", || {
            Bridge::start(&config, Arc::clone(&hooks))
        });
        assert_eq!(bridge.state(), BridgeState::Inert);
        let warnings = logs.at("WARN");
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("could not load probe provider"));
        assert!(logs.at("ERROR").is_empty());
        assert!(!bridge.provider().is_present());
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(bridge.state(), BridgeState::Inert);
        assert_eq!(hooks.get_tool(config.tool_id), None);
        bridge.shutdown();
        bridge.shutdown();
    }
}
