//! Tool-slot monitoring table.
//!
//! Tools claim a slot, choose the events they want and register one
//! callback per event. The host calls [`Monitoring::fire`] at every
//! function entry; when no slot listens to that event the call is a single
//! atomic load.
//!
//! Registration takes the table's write lock. Delivery clones the matching
//! callbacks under the read lock and invokes them after releasing it, so a
//! callback may run briefly after it has been unregistered but never while
//! the table is locked.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::HookError;
use crate::events::{CodeInfo, Event, EventSet, NUM_EVENTS};

/// Number of tool slots.
pub const MAX_TOOLS: usize = 6;

/// Callback invoked for an event: `(code, instruction_offset)`.
pub type Callback = Arc<dyn Fn(&CodeInfo<'_>, u32) + Send + Sync>;

/// Box a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&CodeInfo<'_>, u32) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Index of a tool slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolId(u8);

impl ToolId {
    pub const DEBUGGER_ID: Self = Self(0);
    pub const COVERAGE_ID: Self = Self(1);
    pub const PROFILER_ID: Self = Self(2);
    pub const OPTIMIZER_ID: Self = Self(5);

    /// Validate a raw slot index.
    ///
    /// # Errors
    /// Returns [`HookError::InvalidToolId`] if `raw` is not a slot index.
    pub const fn new(raw: u8) -> Result<Self, HookError> {
        if (raw as usize) < MAX_TOOLS {
            Ok(Self(raw))
        } else {
            Err(HookError::InvalidToolId(raw))
        }
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct ToolSlot {
    owner: Option<String>,
    events: EventSet,
    callbacks: [Option<Callback>; NUM_EVENTS],
}

impl ToolSlot {
    /// Events that will actually reach a callback.
    fn live_events(&self) -> EventSet {
        self.events
            .iter()
            .filter(|e| self.callbacks[e.index()].is_some())
            .collect()
    }
}

/// Process-wide event hook table.
pub struct Monitoring {
    /// Union of `live_events()` across all slots.
    active: AtomicU32,
    tools: RwLock<[ToolSlot; MAX_TOOLS]>,
}

impl Monitoring {
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: AtomicU32::new(0),
            tools: RwLock::new(Default::default()),
        }
    }

    /// Claim a tool slot under `name`.
    ///
    /// Re-claiming a slot already held under the same name succeeds.
    ///
    /// # Errors
    /// Returns [`HookError::ToolInUse`] if another owner holds the slot.
    pub fn use_tool_id(&self, id: ToolId, name: &str) -> Result<(), HookError> {
        let mut tools = self.tools.write();
        let slot = &mut tools[id.slot()];
        match &slot.owner {
            Some(owner) if owner != name => Err(HookError::ToolInUse {
                id,
                owner: owner.clone(),
            }),
            _ => {
                slot.owner = Some(name.to_string());
                debug!(tool = %id, name, "tool id claimed");
                Ok(())
            }
        }
    }

    /// Release a tool slot, dropping its events and callbacks.
    ///
    /// # Errors
    /// Returns [`HookError::ToolNotInUse`] if the slot is free.
    pub fn free_tool_id(&self, id: ToolId) -> Result<(), HookError> {
        let mut tools = self.tools.write();
        let slot = &mut tools[id.slot()];
        if slot.owner.is_none() {
            return Err(HookError::ToolNotInUse(id));
        }
        *slot = ToolSlot::default();
        self.publish_active(&tools);
        debug!(tool = %id, "tool id freed");
        Ok(())
    }

    /// Name of the current owner of a slot.
    #[must_use]
    pub fn get_tool(&self, id: ToolId) -> Option<String> {
        self.tools.read()[id.slot()].owner.clone()
    }

    /// Replace the set of events a tool listens to.
    ///
    /// # Errors
    /// Returns [`HookError::ToolNotInUse`] if the slot has not been claimed.
    pub fn set_events(&self, id: ToolId, events: EventSet) -> Result<(), HookError> {
        let mut tools = self.tools.write();
        let slot = &mut tools[id.slot()];
        if slot.owner.is_none() {
            return Err(HookError::ToolNotInUse(id));
        }
        slot.events = events;
        self.publish_active(&tools);
        Ok(())
    }

    /// Events a tool currently listens to.
    #[must_use]
    pub fn get_events(&self, id: ToolId) -> EventSet {
        self.tools.read()[id.slot()].events
    }

    /// Install (or with `None`, remove) the callback for one event.
    ///
    /// Returns the previously registered callback.
    ///
    /// # Errors
    /// Returns [`HookError::ToolNotInUse`] if the slot has not been claimed.
    pub fn register_callback(
        &self,
        id: ToolId,
        event: Event,
        callback: Option<Callback>,
    ) -> Result<Option<Callback>, HookError> {
        let mut tools = self.tools.write();
        let slot = &mut tools[id.slot()];
        if slot.owner.is_none() {
            return Err(HookError::ToolNotInUse(id));
        }
        let previous = std::mem::replace(&mut slot.callbacks[event.index()], callback);
        self.publish_active(&tools);
        Ok(previous)
    }

    /// True if at least one tool will receive `event`.
    #[inline]
    #[must_use]
    pub fn is_active(&self, event: Event) -> bool {
        self.active.load(Ordering::Acquire) & event.bit() != 0
    }

    /// Deliver `event` to every listening tool, in slot order.
    #[inline]
    pub fn fire(&self, event: Event, code: &CodeInfo<'_>, offset: u32) {
        if !self.is_active(event) {
            return;
        }
        self.dispatch(event, code, offset);
    }

    #[inline(never)]
    fn dispatch(&self, event: Event, code: &CodeInfo<'_>, offset: u32) {
        let callbacks: [Option<Callback>; MAX_TOOLS] = {
            let tools = self.tools.read();
            std::array::from_fn(|i| {
                let slot = &tools[i];
                if slot.events.contains(event) {
                    slot.callbacks[event.index()].clone()
                } else {
                    None
                }
            })
        };
        for callback in callbacks.iter().flatten() {
            callback(code, offset);
        }
    }

    /// Recompute the active mask. Caller holds the write lock.
    fn publish_active(&self, tools: &[ToolSlot; MAX_TOOLS]) {
        let bits = tools
            .iter()
            .fold(0, |acc, slot| acc | slot.live_events().bits());
        self.active.store(bits, Ordering::Release);
        trace!(active = bits, "active event mask updated");
    }
}

impl Default for Monitoring {
    fn default() -> Self {
        Self::new()
    }
}
