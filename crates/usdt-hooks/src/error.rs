//! Hook registration errors.

use thiserror::Error;

use crate::ToolId;

/// Errors returned by the registration side of [`Monitoring`](crate::Monitoring).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("invalid tool id {0}")]
    InvalidToolId(u8),

    #[error("tool id {id} is already in use by '{owner}'")]
    ToolInUse { id: ToolId, owner: String },

    #[error("tool id {0} is not in use")]
    ToolNotInUse(ToolId),
}
