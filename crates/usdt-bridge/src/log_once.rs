//! Bounded diagnostics: remember which failure kinds were already reported.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

#[derive(Default)]
pub(crate) struct LogOnce {
    seen: Mutex<FxHashSet<&'static str>>,
}

impl LogOnce {
    /// True the first time `kind` is seen.
    pub(crate) fn first(&self, kind: &'static str) -> bool {
        self.seen.lock().insert(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_per_kind() {
        let log = LogOnce::default();
        assert!(log.first("a"));
        assert!(!log.first("a"));
        assert!(log.first("b"));
        assert!(!log.first("b"));
    }
}
