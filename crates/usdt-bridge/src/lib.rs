//! Adaptive bridge from runtime function hooks to USDT probes.
//!
//! The bridge keeps a host's function-entry hooks switched off until an
//! external tracer attaches to the probe provider. A background monitor
//! polls the provider's activation counter and arms or disarms the hooks
//! accordingly, so an untraced process pays no per-call cost.
//!
//! ```text
//!   host runtime ──fire──> usdt_hooks::Monitoring ──callback──> ProbeEmitter ──> provider
//!                                  ^                                               |
//!                                  |  arm / disarm                    activation   |
//!                           HookController <──────── ActivationMonitor <───────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let bridge = usdt_bridge::install();
//! println!("bridge is {}", bridge.state());
//! ```

mod bootstrap;
pub mod config;
mod controller;
mod emit;
mod error;
mod log_once;
pub mod metrics;
mod monitor;
mod provider;
pub mod script;
#[cfg(test)]
mod test_log;

pub use bootstrap::{Bridge, BridgeState, install, install_with, installed};
pub use config::{BridgeConfig, ProbeSymbol, ProbeSymbols};
pub use controller::{ActivationState, HookController};
pub use emit::{CallEvent, EmitterStats, ProbeEmitter};
pub use error::{BridgeError, ControllerError, EmitError, ProviderError, ScriptError};
pub use monitor::{ActivationMonitor, Sampler, Transition, decide};
pub use provider::{DylibProvider, ProbeFn, ProbeKind, ProbeProvider, ProviderHandle};
pub use script::{HOST_API, HostApi, Script};
