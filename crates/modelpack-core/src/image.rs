//! Image names.

use derive_more::Display;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::LazyLock;

const IMAGE_NAME_PREFIX: &str = "modelpack-";
const BASE_IMAGE_SUFFIX: &str = "-base";
/// Longest project-derived name before the base suffix is applied.
const MAX_PROJECT_NAME_LEN: usize = 30;
const FALLBACK_DIGEST_LEN: usize = 12;

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\-]+").expect("valid regex"));

/// Name of a built image, e.g. `registry.example.com/team/model:latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ImageName(String);

impl ImageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the base image name for a build context.
    ///
    /// The result depends only on the path string, never on the filesystem
    /// or on the build configuration, so the same context always maps to the
    /// same name across calls and processes.
    pub fn base_for_context(context: &Path) -> Self {
        Self(format!("{}{}", project_image_name(context), BASE_IMAGE_SUFFIX))
    }
}

impl From<String> for ImageName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for ImageName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for ImageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn project_image_name(context: &Path) -> String {
    let component = context
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
        .replace(' ', "-");
    let sanitized = DISALLOWED_CHARS.replace_all(&component, "");

    let project = if sanitized.is_empty() {
        let digest = hex::encode(Sha256::digest(context.to_string_lossy().as_bytes()));
        digest[..FALLBACK_DIGEST_LEN].to_string()
    } else {
        sanitized.into_owned()
    };

    let mut name = format!("{}{}", IMAGE_NAME_PREFIX, project);
    // Only ASCII survives sanitizing, so byte truncation is safe.
    name.truncate(MAX_PROJECT_NAME_LEN);
    name
}
