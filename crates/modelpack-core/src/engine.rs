//! Container engine capabilities used by the build pipeline.
//!
//! Each capability is its own trait so that orchestration can be exercised
//! with substitutable fakes independent of a real container engine.

use std::path::Path;

use async_trait::async_trait;

use crate::{ImageName, LabelSet, Result, TypeSignature};

/// Builds an image from a script against a filesystem context.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build `script` against `context`, tagging the result `image`.
    ///
    /// `progress_mode` selects output verbosity only; it is passed through
    /// unvalidated.
    async fn build(
        &self,
        context: &Path,
        script: &str,
        image: &ImageName,
        progress_mode: &str,
    ) -> Result<()>;
}

/// Inspects a built image and derives its callable interface.
#[async_trait]
pub trait SignatureExtractor: Send + Sync {
    async fn type_signature(&self, image: &ImageName) -> Result<TypeSignature>;
}

/// Attaches labels to an existing image in place.
#[async_trait]
pub trait LabelWriter: Send + Sync {
    async fn add_labels(&self, image: &ImageName, labels: &LabelSet) -> Result<()>;
}
