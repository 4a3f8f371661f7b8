//! Script host for the run-wrapper.
//!
//! A script is a native shared object exporting
//!
//! ```c
//! int usdt_script_main(int argc, const char *const *argv, const UsdtHostApi *host);
//! ```
//!
//! and reporting its own function entries through the [`HostApi`] table,
//! which forwards them to the global hook table.

use std::ffi::{CStr, CString, OsStr, OsString, c_char, c_int};
use std::os::unix::ffi::OsStrExt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use libloading::os::unix::{Library, RTLD_NOW, Symbol};
use tracing::{debug, warn};
use usdt_hooks::{CodeInfo, Event};

use crate::emit::panic_message;
use crate::error::ScriptError;

/// Symbol every script exports.
pub const SCRIPT_ENTRY: &str = "usdt_script_main";

/// Version of the [`HostApi`] layout.
pub const HOST_API_VERSION: u32 = 1;

/// `void (const char *name, const char *file, long long line)`.
pub type EventFn = unsafe extern "C" fn(*const c_char, *const c_char, i64);

type ScriptMain = unsafe extern "C" fn(c_int, *const *const c_char, *const HostApi) -> c_int;

/// Callback table handed to the script.
///
/// Matches:
/// ```c
/// typedef struct UsdtHostApi {
///     uint32_t version;
///     void (*function_entry)(const char *name, const char *file, long long line);
///     void (*function_resume)(const char *name, const char *file, long long line);
/// } UsdtHostApi;
/// ```
#[repr(C)]
pub struct HostApi {
    pub version: u32,
    pub function_entry: EventFn,
    pub function_resume: EventFn,
}

/// The table passed to every script.
pub static HOST_API: HostApi = HostApi {
    version: HOST_API_VERSION,
    function_entry: host_function_entry,
    function_resume: host_function_resume,
};

unsafe extern "C" fn host_function_entry(name: *const c_char, file: *const c_char, line: i64) {
    report(Event::FunctionStart, name, file, line);
}

unsafe extern "C" fn host_function_resume(name: *const c_char, file: *const c_char, line: i64) {
    report(Event::FunctionResume, name, file, line);
}

static CALLBACK_PANICKED: AtomicBool = AtomicBool::new(false);

fn report(event: Event, name: *const c_char, file: *const c_char, line: i64) {
    let hooks = usdt_hooks::global();
    if !hooks.is_active(event) || name.is_null() || file.is_null() {
        return;
    }
    // SAFETY: non-null and NUL-terminated per the host API contract.
    let (name, file) = unsafe { (CStr::from_ptr(name), CStr::from_ptr(file)) };
    let (name, file) = (name.to_string_lossy(), file.to_string_lossy());
    // Unwinding into the script's C frames would abort the process.
    let fired = panic::catch_unwind(AssertUnwindSafe(|| {
        hooks.fire(event, &CodeInfo::new(&name, &file, line), 0);
    }));
    if let Err(payload) = fired {
        let message = panic_message(payload.as_ref());
        if CALLBACK_PANICKED.swap(true, Ordering::Relaxed) {
            debug!(%event, function = %name, error = %message, "hook callback panicked");
        } else {
            warn!(
                %event,
                function = %name,
                file = %file,
                line,
                error = %message,
                "hook callback panicked, event dropped"
            );
        }
    }
}

/// A loaded script.
pub struct Script {
    path: PathBuf,
    main: ScriptMain,
    _lib: Library,
}

impl Script {
    /// Load the script at `path` and resolve its entry point.
    ///
    /// # Errors
    /// [`ScriptError::NotFound`] if `path` does not exist,
    /// [`ScriptError::Load`] if it is not a loadable library and
    /// [`ScriptError::SymbolNotFound`] if it lacks [`SCRIPT_ENTRY`].
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        if !path.exists() {
            return Err(ScriptError::NotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "loading script");
        // SAFETY: running the script's initializers is what the user asked for.
        let lib = unsafe { Library::open(Some(path), RTLD_NOW)? };
        let main = unsafe {
            let sym: Symbol<ScriptMain> = lib
                .get(SCRIPT_ENTRY.as_bytes())
                .map_err(|e| ScriptError::SymbolNotFound(SCRIPT_ENTRY.to_string(), e))?;
            *sym
        };
        Ok(Self {
            path: path.to_path_buf(),
            main,
            _lib: lib,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Call the script's entry point with `argv = [script, args...]` and
    /// return its exit code.
    ///
    /// # Errors
    /// Returns an error if an argument cannot be passed as a C string.
    pub fn run(&self, args: &[OsString]) -> Result<i32, ScriptError> {
        debug!(path = %self.path.display(), args = args.len(), "running script");
        // SAFETY: `main` was resolved from the script, which `self` keeps loaded.
        unsafe { call_main(self.main, self.path.as_os_str(), args) }
    }
}

/// Call `main` with `argv = [program, args...]` and the host table.
///
/// # Safety
/// `main` must be a valid [`ScriptMain`] for the duration of the call.
unsafe fn call_main(
    main: ScriptMain,
    program: &OsStr,
    args: &[OsString],
) -> Result<i32, ScriptError> {
    let owned = c_argv(program, args)?;
    let argc =
        c_int::try_from(owned.len()).map_err(|_| ScriptError::TooManyArguments(owned.len()))?;
    let mut argv: Vec<*const c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(ptr::null());

    // SAFETY: `argv` is NULL-terminated and, like `HOST_API`, outlives the call.
    Ok(unsafe { main(argc, argv.as_ptr(), &HOST_API) })
}

fn c_argv(program: &OsStr, args: &[OsString]) -> Result<Vec<CString>, ScriptError> {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|arg| {
            CString::new(arg.as_bytes())
                .map_err(|_| ScriptError::InvalidArgument(arg.to_string_lossy().into_owned()))
        })
        .collect()
}
