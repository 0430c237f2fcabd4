//! Error taxonomy for the run lifecycle.
//!
//! Validation errors never leave the process. Transport errors are absorbed by
//! the poller and surfaced by one-shot operations. A remote `failed` status is a
//! terminal outcome, not an error of the lifecycle itself.

use crate::model::RunHandle;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tenant id is required")]
    MissingTenant,
    #[error("select at least one subscription")]
    NoSubscriptions,
}

#[derive(Debug, Error)]
pub enum PortalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The single active-run slot is occupied.
    #[error("run {0} is still in progress")]
    RunActive(RunHandle),

    #[error("transport error: {0}")]
    Transport(String),

    /// The portal accepted the request but did not allocate a run.
    #[error("submission rejected: {0}")]
    Submission(String),

    #[error("run {0} not found")]
    NotFound(RunHandle),

    #[error("assessment {run_id} failed: {message}")]
    RemoteJob { run_id: RunHandle, message: String },
}

impl From<reqwest::Error> for PortalError {
    fn from(e: reqwest::Error) -> Self {
        PortalError::Transport(e.to_string())
    }
}
