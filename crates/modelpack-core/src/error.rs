//! Error types for modelpack collaborators.
//!
//! Collaborator failures carry only the underlying message; the
//! orchestrator adds the stage context when it wraps them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Generate(String),

    #[error("{0}")]
    Build(String),

    #[error("{0}")]
    Inspect(String),

    #[error("{0}")]
    Label(String),

    #[error("{0}")]
    Cleanup(String),

    #[error("docker error: {0}")]
    Docker(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
