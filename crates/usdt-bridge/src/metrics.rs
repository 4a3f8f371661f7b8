//! Bridge metrics and an in-memory recorder for the run-wrapper.
//!
//! The hot path never touches a recorder: emission counts live in atomics
//! on the emitter and the activation monitor publishes them once per poll.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_gauge,
};
use parking_lot::RwLock;

use crate::emit::EmitterStats;

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "usdt_bridge_events_emitted_total",
        Unit::Count,
        "Probe foreign calls that completed"
    );
    describe_counter!(
        "usdt_bridge_emit_failures_total",
        Unit::Count,
        "Events dropped by encoding or provider failures"
    );
    describe_counter!(
        "usdt_bridge_transitions_total",
        Unit::Count,
        "Hook arm/disarm transitions"
    );
    describe_counter!(
        "usdt_bridge_registration_failures_total",
        Unit::Count,
        "Hook registration attempts refused by the host"
    );
    describe_counter!(
        "usdt_bridge_counter_read_failures_total",
        Unit::Count,
        "Activation counter reads that failed"
    );
    describe_gauge!(
        "usdt_bridge_armed",
        Unit::Count,
        "1 while the function-entry hook is registered"
    );
}

/// Publish the emitter's running totals.
pub fn record_emitter(stats: EmitterStats) {
    counter!("usdt_bridge_events_emitted_total").absolute(stats.emitted);
    counter!("usdt_bridge_emit_failures_total").absolute(stats.failed);
}

#[derive(Default)]
struct CounterStorage {
    values: RwLock<HashMap<String, u64>>,
}

#[derive(Default)]
struct GaugeStorage {
    values: RwLock<HashMap<String, f64>>,
}

struct CliCounter {
    key: String,
    storage: Arc<CounterStorage>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        let mut values = self.storage.values.write();
        *values.entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        let mut values = self.storage.values.write();
        values.insert(self.key.clone(), value);
    }
}

struct CliGauge {
    key: String,
    storage: Arc<GaugeStorage>,
}

impl metrics::GaugeFn for CliGauge {
    fn increment(&self, value: f64) {
        let mut values = self.storage.values.write();
        *values.entry(self.key.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        let mut values = self.storage.values.write();
        *values.entry(self.key.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        let mut values = self.storage.values.write();
        values.insert(self.key.clone(), value);
    }
}

/// Recorder that keeps counters and gauges in memory for a summary at exit.
#[derive(Default)]
pub struct CliRecorder {
    counters: Arc<CounterStorage>,
    gauges: Arc<GaugeStorage>,
}

impl CliRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the global recorder. `None` if one is already installed.
    #[must_use]
    pub fn install(self) -> Option<CliRecorderHandle> {
        let counters = Arc::clone(&self.counters);
        let gauges = Arc::clone(&self.gauges);
        metrics::set_global_recorder(self).ok()?;
        Some(CliRecorderHandle { counters, gauges })
    }
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            storage: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(CliGauge {
            key: key_to_string(key),
            storage: Arc::clone(&self.gauges),
        }))
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Read access to what a [`CliRecorder`] collected.
pub struct CliRecorderHandle {
    counters: Arc<CounterStorage>,
    gauges: Arc<GaugeStorage>,
}

impl CliRecorderHandle {
    #[must_use]
    pub fn get_counter(&self, key: &str) -> Option<u64> {
        self.counters.values.read().get(key).copied()
    }

    #[must_use]
    pub fn get_gauge(&self, key: &str) -> Option<f64> {
        self.gauges.values.read().get(key).copied()
    }

    /// Write a sorted summary.
    ///
    /// # Errors
    /// Propagates write errors from `out`.
    pub fn write_summary(&self, out: &mut impl Write) -> io::Result<()> {
        let counters = self.counters.values.read();
        let gauges = self.gauges.values.read();
        if counters.is_empty() && gauges.is_empty() {
            return writeln!(out, "No metrics collected.");
        }

        writeln!(out, "## Metrics Summary")?;
        if !counters.is_empty() {
            writeln!(out, "### Counters")?;
            let mut entries: Vec<_> = counters.iter().collect();
            entries.sort();
            for (key, value) in entries {
                writeln!(out, "  {key}: {value}")?;
            }
        }
        if !gauges.is_empty() {
            writeln!(out, "### Gauges")?;
            let mut entries: Vec<_> = gauges.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in entries {
                writeln!(out, "  {key}: {value:.6}")?;
            }
        }
        Ok(())
    }

    /// Print the summary to stderr, leaving the program's stdout alone.
    pub fn print_summary(&self) {
        let _ = self.write_summary(&mut io::stderr().lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{CounterFn, GaugeFn, Label};

    #[test]
    fn test_key_to_string() {
        let key = Key::from_name("usdt_bridge_armed");
        assert_eq!(key_to_string(&key), "usdt_bridge_armed");

        let key = Key::from_parts(
            "usdt_bridge_transitions_total",
            vec![Label::new("to", "armed")],
        );
        assert_eq!(key_to_string(&key), "usdt_bridge_transitions_total{to=armed}");
    }

    #[test]
    fn test_summary() {
        let recorder = CliRecorder::new();
        let handle = CliRecorderHandle {
            counters: Arc::clone(&recorder.counters),
            gauges: Arc::clone(&recorder.gauges),
        };
        let mut out = Vec::new();
        handle.write_summary(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No metrics collected.\n");

        let counter = CliCounter {
            key: "b_total".to_string(),
            storage: Arc::clone(&recorder.counters),
        };
        counter.increment(2);
        counter.increment(3);
        let counter = CliCounter {
            key: "a_total".to_string(),
            storage: Arc::clone(&recorder.counters),
        };
        counter.absolute(9);
        let gauge = CliGauge {
            key: "armed".to_string(),
            storage: Arc::clone(&recorder.gauges),
        };
        gauge.set(1.0);
        assert_eq!(handle.get_counter("b_total"), Some(5));
        assert_eq!(handle.get_gauge("armed"), Some(1.0));

        let mut out = Vec::new();
        handle.write_summary(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "## Metrics Summary\n### Counters\n  a_total: 9\n  b_total: 5\n### Gauges\n  armed: 1.000000\n"
        );
    }
}
