//! Provider backed by a shared library loaded with `dlopen`.

use std::ffi::{CStr, c_char, c_longlong};
use std::path::Path;
use std::ptr;

use libloading::os::unix::{Library, RTLD_NOW, Symbol};
use tracing::debug;

use super::{ProbeKind, ProbeProvider};
use crate::config::{BridgeConfig, ProbeSymbol, ProbeSymbols};
use crate::error::ProviderError;

/// `void probe(const char *name, const char *file, long long line)`.
pub type ProbeFn = unsafe extern "C" fn(*const c_char, *const c_char, c_longlong);

#[derive(Clone, Copy)]
struct ProbePoint {
    kind: ProbeKind,
    entry: ProbeFn,
    semaphore: *const u16,
}

impl ProbePoint {
    /// Resolve both symbols of one probe.
    ///
    /// # Safety
    /// The entry symbol must have the [`ProbeFn`] signature and the
    /// semaphore symbol must name an `unsigned short`.
    unsafe fn load(
        lib: &Library,
        kind: ProbeKind,
        symbols: &ProbeSymbol,
    ) -> Result<Self, ProviderError> {
        unsafe {
            Ok(Self {
                kind,
                entry: load_symbol(lib, &symbols.entry)?,
                semaphore: load_symbol::<*const u16>(lib, &symbols.semaphore)?,
            })
        }
    }

    fn read_semaphore(&self) -> u16 {
        // SAFETY: the pointer comes from the provider library, which lives
        // as long as `self`. The tracer writes it from outside the process,
        // hence the volatile read.
        unsafe { ptr::read_volatile(self.semaphore) }
    }
}

/// Resolve one symbol. Reporting is left to the caller, which knows
/// whether the symbol was optional.
unsafe fn load_symbol<T: Copy>(lib: &Library, name: &str) -> Result<T, ProviderError> {
    unsafe {
        let sym: Symbol<T> = lib
            .get(name.as_bytes())
            .map_err(|e| ProviderError::SymbolNotFound(name.to_string(), e))?;
        Ok(*sym)
    }
}

/// Probe provider resolved from a shared library.
pub struct DylibProvider {
    points: Vec<ProbePoint>,
    kinds: Vec<ProbeKind>,
    _lib: Library,
}

// SAFETY: the raw pointers refer to immutable code and to counters that are
// only read (volatile) here; the provider contract requires its entry points
// to be callable from any thread.
unsafe impl Send for DylibProvider {}
unsafe impl Sync for DylibProvider {}

impl DylibProvider {
    /// Locate and load the provider named by `config`.
    ///
    /// # Errors
    /// Returns [`ProviderError::LibraryNotFound`] when no candidate path
    /// exists, otherwise whatever [`DylibProvider::open_path`] returns.
    pub fn open(config: &BridgeConfig) -> Result<Self, ProviderError> {
        let Some(path) = config.resolve_library() else {
            return Err(ProviderError::LibraryNotFound {
                searched: config.candidate_paths(),
            });
        };
        Self::open_path(&path, &config.symbols)
    }

    /// Load the provider at `path` and resolve its probes.
    ///
    /// The start probe is required; the resume probe is used only if both
    /// of its symbols resolve.
    ///
    /// # Errors
    /// Returns [`ProviderError::Load`] if `dlopen` fails and
    /// [`ProviderError::SymbolNotFound`] if a start probe symbol is missing.
    pub fn open_path(path: &Path, symbols: &ProbeSymbols) -> Result<Self, ProviderError> {
        debug!(path = %path.display(), "loading probe provider");
        // SAFETY: loading runs the library's initializers; the provider is
        // trusted native code by contract.
        let lib = unsafe { Library::open(Some(path), RTLD_NOW)? };

        // SAFETY: symbol shapes are the provider's documented ABI.
        let start = unsafe { ProbePoint::load(&lib, ProbeKind::Start, &symbols.start)? };
        let mut points = vec![start];
        if let Some(resume) = &symbols.resume {
            match unsafe { ProbePoint::load(&lib, ProbeKind::Resume, resume) } {
                Ok(point) => points.push(point),
                Err(e) => debug!(error = %e, "resume probe unavailable, using start only"),
            }
        }

        let kinds = points.iter().map(|p| p.kind).collect();
        Ok(Self {
            points,
            kinds,
            _lib: lib,
        })
    }
}

impl ProbeProvider for DylibProvider {
    fn probes(&self) -> &[ProbeKind] {
        &self.kinds
    }

    fn fire(&self, kind: ProbeKind, name: &CStr, file: &CStr, line: i64) {
        let Some(point) = self.points.iter().find(|p| p.kind == kind) else {
            return;
        };
        // SAFETY: both strings are NUL-terminated and outlive the call.
        unsafe { (point.entry)(name.as_ptr(), file.as_ptr(), line) }
    }

    fn activation(&self) -> Result<u32, ProviderError> {
        Ok(self
            .points
            .iter()
            .fold(0u32, |acc, p| acc.saturating_add(u32::from(p.read_semaphore()))))
    }
}
