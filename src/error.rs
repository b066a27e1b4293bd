//! Errors shared across layers.

use std::time::Duration;

use thiserror::Error;

/// Request rejected before any layer runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Password must not be empty")]
    EmptyPassword,
    /// Identity field with a blank name, by position in the request.
    #[error("Identity field #{position} has an empty name")]
    EmptyIdentityField { position: usize },
}

/// Failure of one layer. The orchestrator turns it into an `unknown` report.
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Collaborator failed: {0}")]
    Collaborator(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Evaluation cancelled")]
    Cancelled,
}
