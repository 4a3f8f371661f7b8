//! Activation monitor: polls the provider's counter and arms or disarms the
//! hook on edges.
//!
//! [`Sampler`] holds the per-tick logic so it can be driven directly;
//! [`ActivationMonitor`] runs it on a background thread until shut down.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::controller::{ActivationState, HookController};
use crate::emit::EmitterStats;
use crate::error::{ControllerError, ProviderError};
use crate::log_once::LogOnce;
use crate::provider::ProviderHandle;

/// Controller action requested by one sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Arm,
    Disarm,
    Hold,
}

/// Edge detection: only a mismatch between counter and state asks for work.
#[must_use]
pub const fn decide(counter: u32, state: ActivationState) -> Transition {
    match (counter > 0, state) {
        (true, ActivationState::Disarmed) => Transition::Arm,
        (false, ActivationState::Armed) => Transition::Disarm,
        _ => Transition::Hold,
    }
}

/// One poll step.
pub struct Sampler {
    provider: ProviderHandle,
    controller: Arc<HookController>,
    read_failures: LogOnce,
    registration_failing: bool,
    published: EmitterStats,
}

impl Sampler {
    #[must_use]
    pub fn new(provider: ProviderHandle, controller: Arc<HookController>) -> Self {
        Self {
            provider,
            controller,
            read_failures: LogOnce::default(),
            registration_failing: false,
            published: EmitterStats::default(),
        }
    }

    #[must_use]
    pub const fn controller(&self) -> &Arc<HookController> {
        &self.controller
    }

    /// Sample the counter once, apply any transition and return the
    /// resulting state.
    pub fn tick(&mut self) -> ActivationState {
        let counter = self.read_counter();
        let state = self.controller.state();
        trace!(counter, %state, "activation sample");
        match decide(counter, state) {
            Transition::Arm => {
                let result = self.controller.arm();
                self.apply(Transition::Arm, result);
            }
            Transition::Disarm => {
                let result = self.controller.disarm();
                self.apply(Transition::Disarm, result);
            }
            Transition::Hold => {}
        }
        self.publish_stats();
        self.controller.state()
    }

    /// Read failures count as zero so the hook falls back to disarmed.
    fn read_counter(&self) -> u32 {
        let read = panic::catch_unwind(AssertUnwindSafe(|| self.provider.activation()))
            .unwrap_or_else(|_| Err(ProviderError::Panicked("activation read".to_string())));
        match read {
            Ok(counter) => counter,
            // Bootstrap already reported the missing provider.
            Err(ProviderError::Absent) => 0,
            Err(e) => {
                counter!("usdt_bridge_counter_read_failures_total", "kind" => e.kind())
                    .increment(1);
                if self.read_failures.first(e.kind()) {
                    warn!(error = %e, "failed to read activation counter, treating as detached");
                } else {
                    trace!(error = %e, "failed to read activation counter");
                }
                0
            }
        }
    }

    fn apply(&mut self, transition: Transition, result: Result<(), ControllerError>) {
        match result {
            Ok(()) => self.registration_failing = false,
            Err(ControllerError::AlreadyArmed | ControllerError::AlreadyDisarmed) => {
                debug!(?transition, "state changed outside the monitor");
            }
            Err(e @ ControllerError::Registration(_)) => {
                counter!("usdt_bridge_registration_failures_total").increment(1);
                if self.registration_failing {
                    debug!(?transition, error = %e, "hook registration still failing");
                } else {
                    warn!(?transition, error = %e, "hook registration failed, retrying next poll");
                }
                self.registration_failing = true;
            }
        }
    }

    fn publish_stats(&mut self) {
        let stats = self.controller.emitter().stats();
        if stats != self.published {
            crate::metrics::record_emitter(stats);
            self.published = stats;
        }
    }
}

struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.cv.notify_all();
    }

    /// Sleep for `timeout` or until stopped. Returns true if stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut stopped = self.stopped.lock();
        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if self.cv.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cv.wait(&mut stopped),
            }
        }
        *stopped
    }
}

/// Background poller.
pub struct ActivationMonitor {
    stop: Arc<StopSignal>,
    controller: Arc<HookController>,
    thread: Option<JoinHandle<()>>,
}

impl ActivationMonitor {
    /// Start polling every `interval`.
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(mut sampler: Sampler, interval: Duration) -> io::Result<Self> {
        let stop = Arc::new(StopSignal::new());
        let controller = Arc::clone(sampler.controller());
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("usdt-monitor".to_string())
                .spawn(move || {
                    debug!(?interval, "activation monitor started");
                    loop {
                        sampler.tick();
                        if stop.wait(interval) {
                            break;
                        }
                    }
                    disarm_if_armed(sampler.controller());
                    debug!("activation monitor stopped");
                })?
        };
        Ok(Self {
            stop,
            controller,
            thread: Some(thread),
        })
    }

    /// Stop polling and leave the hook disarmed.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("activation monitor thread panicked");
            }
        }
        disarm_if_armed(&self.controller);
    }
}

impl Drop for ActivationMonitor {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn disarm_if_armed(controller: &HookController) {
    match controller.disarm() {
        Ok(()) | Err(ControllerError::AlreadyDisarmed) => {}
        Err(e) => warn!(error = %e, "failed to disarm hook on monitor shutdown"),
    }
}
