#![allow(dead_code)]

use std::ffi::CStr;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use usdt_bridge::{ProbeKind, ProbeProvider, ProviderError, ProviderHandle};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// One probe firing as seen by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub kind: ProbeKind,
    pub name: String,
    pub file: String,
    pub line: i64,
}

/// In-process provider with a settable activation counter.
pub struct FakeProvider {
    kinds: Vec<ProbeKind>,
    counter: AtomicU32,
    calls: Mutex<Vec<Call>>,
}

impl FakeProvider {
    pub fn new(kinds: &[ProbeKind]) -> Arc<Self> {
        Arc::new(Self {
            kinds: kinds.to_vec(),
            counter: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_counter(&self, value: u32) {
        self.counter.store(value, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn handle(self: &Arc<Self>) -> ProviderHandle {
        let provider: Arc<dyn ProbeProvider> = self.clone();
        ProviderHandle::Present(provider)
    }
}

impl ProbeProvider for FakeProvider {
    fn probes(&self) -> &[ProbeKind] {
        &self.kinds
    }

    fn fire(&self, kind: ProbeKind, name: &CStr, file: &CStr, line: i64) {
        self.calls.lock().push(Call {
            kind,
            name: name.to_string_lossy().into_owned(),
            file: file.to_string_lossy().into_owned(),
            line,
        });
    }

    fn activation(&self) -> Result<u32, ProviderError> {
        Ok(self.counter.load(Ordering::SeqCst))
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Formatted `tracing` output written while [`CapturedLogs::capture`] runs.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Run `f` with a thread-local subscriber filtered by `directives`.
    pub fn capture<R>(&self, directives: &str, f: impl FnOnce() -> R) -> R {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(directives))
            .with_writer(move || logs.clone())
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    /// Lines logged at `level` (`"WARN"`, `"ERROR"`, ...).
    pub fn at(&self, level: &str) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .filter(|line| line.trim_start().starts_with(level))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
