//! Bridge error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to resolve or read the native probe provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("probe provider library not found (searched: {searched:?})")]
    LibraryNotFound { searched: Vec<PathBuf> },

    #[error("failed to load probe provider: {0}")]
    Load(#[from] libloading::Error),

    #[error("failed to find symbol '{0}': {1}")]
    SymbolNotFound(String, libloading::Error),

    #[error("probe provider is absent")]
    Absent,

    #[error("probe provider panicked: {0}")]
    Panicked(String),
}

impl ProviderError {
    /// Stable label, used for metrics and log-once bookkeeping.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LibraryNotFound { .. } => "library_not_found",
            Self::Load(_) => "load",
            Self::SymbolNotFound(..) => "symbol_not_found",
            Self::Absent => "absent",
            Self::Panicked(_) => "panicked",
        }
    }
}

/// A single probe emission failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmitError {
    #[error("{field} contains an interior NUL byte")]
    InteriorNul { field: &'static str },

    #[error("probe provider panicked: {0}")]
    ProviderPanicked(String),
}

impl EmitError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InteriorNul { .. } => "interior_nul",
            Self::ProviderPanicked(_) => "provider_panicked",
        }
    }
}

/// Arm/disarm outcome other than a clean transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("hook already armed")]
    AlreadyArmed,

    #[error("hook already disarmed")]
    AlreadyDisarmed,

    #[error("hook registration failed: {0}")]
    Registration(#[from] usdt_hooks::HookError),
}

/// Run-wrapper script loading errors.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to load script: {0}")]
    Load(#[from] libloading::Error),

    #[error("failed to find symbol '{0}': {1}")]
    SymbolNotFound(String, libloading::Error),

    #[error("argument contains an interior NUL byte: {0:?}")]
    InvalidArgument(String),

    #[error("too many arguments: {0}")]
    TooManyArguments(usize),
}

/// Top-level bridge errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("bridge already installed")]
    AlreadyInstalled,
}
