//! Event kinds, event masks and the per-event payload.

use std::fmt;

/// Number of distinct event kinds.
pub const NUM_EVENTS: usize = 2;

/// Function-level events a host runtime reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// A function begins executing from its first instruction.
    FunctionStart,
    /// A suspended frame (generator, coroutine) resumes.
    FunctionResume,
}

impl Event {
    /// All events, in index order.
    pub const ALL: [Self; NUM_EVENTS] = [Self::FunctionStart, Self::FunctionResume];

    /// Dense index used for callback tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::FunctionStart => 0,
            Self::FunctionResume => 1,
        }
    }

    /// Single-bit mask for this event.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u32 {
        1 << self.index()
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FunctionStart => "function_start",
            Self::FunctionResume => "function_resume",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`Event`]s, stored as a bit mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EventSet(u32);

impl EventSet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self((1 << NUM_EVENTS) - 1);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn with(self, event: Event) -> Self {
        Self(self.0 | event.bit())
    }

    #[must_use]
    pub const fn contains(self, event: Event) -> bool {
        self.0 & event.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the events in this set.
    pub fn iter(self) -> impl Iterator<Item = Event> {
        Event::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}

impl From<Event> for EventSet {
    fn from(event: Event) -> Self {
        Self(event.bit())
    }
}

impl FromIterator<Event> for EventSet {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Identity of the code unit an event refers to.
///
/// Borrowed for the duration of one event delivery; callbacks must copy
/// anything they want to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeInfo<'a> {
    /// Function name.
    pub name: &'a str,
    /// Source file the function is defined in.
    pub filename: &'a str,
    /// First line of the function definition.
    pub first_line: i64,
}

impl<'a> CodeInfo<'a> {
    #[must_use]
    pub const fn new(name: &'a str, filename: &'a str, first_line: i64) -> Self {
        Self {
            name,
            filename,
            first_line,
        }
    }
}
