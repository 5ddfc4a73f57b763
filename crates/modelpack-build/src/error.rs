//! Stage-wrapped orchestration errors.

use std::fmt;
use thiserror::Error;

/// A step of the build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Generate,
    Build,
    Inspect,
    Encode,
    Label,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStage::Generate => "generate",
            BuildStage::Build => "build",
            BuildStage::Inspect => "inspect",
            BuildStage::Encode => "encode",
            BuildStage::Label => "label",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal pipeline failure, tagged with the stage that failed.
///
/// Inspect and Label failures leave a built image behind that is not a
/// valid finished artifact.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to generate Dockerfile: {0}")]
    Generate(#[source] modelpack_core::Error),

    #[error("failed to build Docker image: {0}")]
    Build(#[source] modelpack_core::Error),

    #[error("failed to get type signature: {0}")]
    Inspect(#[source] modelpack_core::Error),

    #[error("failed to convert type signature to JSON: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to add labels to image: {0}")]
    Label(#[source] modelpack_core::Error),
}

impl BuildError {
    pub fn stage(&self) -> BuildStage {
        match self {
            BuildError::Generate(_) => BuildStage::Generate,
            BuildError::Build(_) => BuildStage::Build,
            BuildError::Inspect(_) => BuildStage::Inspect,
            BuildError::Encode(_) => BuildStage::Encode,
            BuildError::Label(_) => BuildStage::Label,
        }
    }
}
