//! Function event hooks for an embedding host runtime.
//!
//! A host (interpreter, VM, scripting layer) reports function entries by
//! calling [`Monitoring::fire`]; tools claim a [`ToolId`] slot and register
//! callbacks for the [`Event`]s they care about. With no callbacks
//! registered, reporting an event costs one atomic load.
//!
//! # Example
//!
//! ```ignore
//! use usdt_hooks::{Event, ToolId, callback, global};
//!
//! let mon = global();
//! mon.use_tool_id(ToolId::PROFILER_ID, "my-profiler")?;
//! mon.set_events(ToolId::PROFILER_ID, Event::FunctionStart.into())?;
//! mon.register_callback(
//!     ToolId::PROFILER_ID,
//!     Event::FunctionStart,
//!     Some(callback(|code, _| println!("{}", code.name))),
//! )?;
//!
//! usdt_hooks::enter("fibonacci");
//! ```

mod error;
mod events;
mod monitoring;

use std::panic::Location;
use std::sync::{Arc, OnceLock};

pub use error::HookError;
pub use events::{CodeInfo, Event, EventSet, NUM_EVENTS};
pub use monitoring::{Callback, MAX_TOOLS, Monitoring, ToolId, callback};

/// The process-wide hook table.
pub fn global() -> &'static Arc<Monitoring> {
    static GLOBAL: OnceLock<Arc<Monitoring>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(Monitoring::new()))
}

/// Report entry into `name` on the global table, located at the caller.
#[track_caller]
#[inline]
pub fn enter(name: &str) {
    fire_at_caller(Event::FunctionStart, name, Location::caller());
}

/// Report resumption of `name` on the global table, located at the caller.
#[track_caller]
#[inline]
pub fn resume(name: &str) {
    fire_at_caller(Event::FunctionResume, name, Location::caller());
}

#[inline]
fn fire_at_caller(event: Event, name: &str, location: &Location<'_>) {
    let mon = global();
    if mon.is_active(event) {
        let code = CodeInfo::new(name, location.file(), i64::from(location.line()));
        mon.fire(event, &code, 0);
    }
}
