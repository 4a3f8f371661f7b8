//! Bridge configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;
use usdt_hooks::ToolId;

/// Default provider library file name.
pub const DEFAULT_LIBRARY_NAME: &str = "libpyusdt.so";

/// Default activation poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Smallest poll interval accepted; zero would spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Name the bridge registers its hook tool under.
pub const DEFAULT_TOOL_NAME: &str = "usdt-bridge";

/// Environment variable naming the provider library path.
pub const ENV_LIBRARY: &str = "USDT_BRIDGE_LIBRARY";
/// Environment variable overriding the poll interval, in milliseconds.
pub const ENV_POLL_MS: &str = "USDT_BRIDGE_POLL_MS";
/// Environment variable enabling the run-wrapper's metrics summary.
pub const ENV_METRICS: &str = "USDT_BRIDGE_METRICS";

/// Symbols for one gated trace point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSymbol {
    /// `void (const char *name, const char *file, long long line)`.
    pub entry: String,
    /// `unsigned short` activation counter.
    pub semaphore: String,
}

impl ProbeSymbol {
    pub fn new(entry: impl Into<String>, semaphore: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            semaphore: semaphore.into(),
        }
    }
}

/// Trace points the bridge looks for in the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSymbols {
    /// Function-entry probe. Required.
    pub start: ProbeSymbol,
    /// Function-resume probe. Used only if both symbols resolve.
    pub resume: Option<ProbeSymbol>,
}

impl Default for ProbeSymbols {
    fn default() -> Self {
        Self {
            start: ProbeSymbol::new("pyusdt_PY_START", "__usdt_sema_pyusdt__PY_START"),
            resume: Some(ProbeSymbol::new(
                "pyusdt_PY_RESUME",
                "__usdt_sema_pyusdt__PY_RESUME",
            )),
        }
    }
}

/// Bridge configuration.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Explicit provider path. Skips the search when set.
    pub library: Option<PathBuf>,
    /// File name searched for next to the executable and in the working directory.
    pub library_name: String,
    /// Activation monitor poll interval.
    pub poll_interval: Duration,
    /// Provider symbols.
    pub symbols: ProbeSymbols,
    /// Hook slot claimed while armed.
    pub tool_id: ToolId,
    /// Name the hook slot is claimed under.
    pub tool_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library: None,
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            symbols: ProbeSymbols::default(),
            tool_id: ToolId::PROFILER_ID,
            tool_name: DEFAULT_TOOL_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `USDT_BRIDGE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup(ENV_LIBRARY).filter(|p| !p.is_empty()) {
            config.library = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_POLL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config = config.with_poll_interval(Duration::from_millis(ms)),
                Err(e) => {
                    warn!(
                        var = ENV_POLL_MS,
                        value = %raw,
                        error = %e,
                        "ignoring invalid poll interval"
                    );
                }
            }
        }
        config
    }

    /// Set an explicit provider path.
    #[must_use]
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = Some(path.into());
        self
    }

    /// Set the poll interval, clamped to [`MIN_POLL_INTERVAL`].
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Set the provider symbols.
    #[must_use]
    pub fn with_symbols(mut self, symbols: ProbeSymbols) -> Self {
        self.symbols = symbols;
        self
    }

    /// Set the hook slot and the name it is claimed under.
    #[must_use]
    pub fn with_tool(mut self, id: ToolId, name: impl Into<String>) -> Self {
        self.tool_id = id;
        self.tool_name = name.into();
        self
    }

    /// Paths tried when locating the provider, in order.
    #[must_use]
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.library {
            return vec![path.clone()];
        }
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        let cwd = std::env::current_dir().ok();
        exe_dir
            .into_iter()
            .chain(cwd)
            .map(|dir| dir.join(&self.library_name))
            .collect()
    }

    /// First candidate that exists on disk.
    #[must_use]
    pub fn resolve_library(&self) -> Option<PathBuf> {
        self.candidate_paths().into_iter().find(|p| p.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.library_name, "libpyusdt.so");
        assert_eq!(config.tool_id, ToolId::PROFILER_ID);
        assert_eq!(config.symbols.start.entry, "pyusdt_PY_START");
        assert!(config.symbols.resume.is_some());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (ENV_LIBRARY, "/opt/probes/libpyusdt.so"),
            (ENV_POLL_MS, " 250 "),
        ]));
        assert_eq!(config.library, Some(PathBuf::from("/opt/probes/libpyusdt.so")));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_from_lookup_invalid_poll_keeps_default() {
        let config = BridgeConfig::from_lookup(lookup(&[(ENV_POLL_MS, "fast"), (ENV_LIBRARY, "")]));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.library, None);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = BridgeConfig::default().with_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_explicit_library_is_sole_candidate() {
        let config = BridgeConfig::default().with_library("/nonexistent/libprobe.so");
        assert_eq!(config.candidate_paths(), vec![PathBuf::from("/nonexistent/libprobe.so")]);
        assert_eq!(config.resolve_library(), None);
    }

    #[test]
    fn test_resolve_library_finds_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libprobe.so");
        std::fs::write(&path, b"").unwrap();
        let config = BridgeConfig::default().with_library(&path);
        assert_eq!(config.resolve_library(), Some(path));
    }

    #[test]
    fn test_search_uses_library_name() {
        let mut config = BridgeConfig::default();
        config.library_name = "libcustom.so".to_string();
        let candidates = config.candidate_paths();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|p| p.ends_with("libcustom.so")));
    }
}
