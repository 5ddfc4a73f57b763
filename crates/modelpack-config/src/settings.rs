//! Orchestrator settings parsing.
//!
//! ```kdl
//! labels namespace="run.modelpack."
//! progress "plain"
//! docker {
//!     host "unix:///var/run/docker.sock"
//!     timeout 120
//! }
//! signature {
//!     command "python" "-m" "modelpack.type_signature"
//! }
//! ```
//!
//! Every node is optional.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use modelpack_core::DEFAULT_LABEL_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_PROGRESS_MODE: &str = "auto";
pub const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 120;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Prefix for every label written to built images.
    pub label_namespace: String,
    /// Progress mode used when the caller does not pick one.
    pub progress: String,
    /// Docker Engine connection.
    pub docker: DockerSettings,
    /// Command run inside a built image to print its type signature.
    pub signature_command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerSettings {
    /// Engine address; local defaults when unset.
    pub host: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            label_namespace: DEFAULT_LABEL_NAMESPACE.to_string(),
            progress: DEFAULT_PROGRESS_MODE.to_string(),
            docker: DockerSettings::default(),
            signature_command: vec![
                "python".to_string(),
                "-m".to_string(),
                "modelpack.type_signature".to_string(),
            ],
        }
    }
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            host: None,
            timeout_secs: DEFAULT_DOCKER_TIMEOUT_SECS,
        }
    }
}

/// Read and parse a settings file.
pub fn load_settings(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), "Loaded settings file");
    parse_settings(&content)
}

/// Parse settings from KDL text.
pub fn parse_settings(kdl: &str) -> ConfigResult<Settings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = Settings::default();
    let mut seen: Vec<&str> = Vec::new();

    for node in doc.nodes() {
        let name = node.name().value();
        match name {
            "labels" | "progress" | "docker" | "signature" => {
                if seen.contains(&name) {
                    return Err(ConfigError::Duplicate(name.to_string()));
                }
                seen.push(name);
            }
            _ => {} // Ignore unknown nodes
        }

        match name {
            "labels" => {
                if let Some(namespace) = get_string_prop(node, "namespace") {
                    settings.label_namespace = namespace;
                }
            }
            "progress" => {
                settings.progress = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("progress mode".to_string()))?;
            }
            "docker" => {
                settings.docker = parse_docker(node)?;
            }
            "signature" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        if child.name().value() == "command" {
                            settings.signature_command = get_all_string_args(child);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    validate(&settings)?;
    Ok(settings)
}

fn parse_docker(node: &KdlNode) -> ConfigResult<DockerSettings> {
    let mut docker = DockerSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "host" => {
                    docker.host = get_first_string_arg(child);
                }
                "timeout" => {
                    let raw = get_first_int_arg(child)
                        .ok_or_else(|| ConfigError::MissingField("docker timeout".to_string()))?;
                    docker.timeout_secs = u64::try_from(raw)
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or_else(|| ConfigError::InvalidValue {
                            field: "docker timeout".to_string(),
                            message: format!("expected a positive number of seconds, got {}", raw),
                        })?;
                }
                _ => {}
            }
        }
    }

    Ok(docker)
}

fn validate(settings: &Settings) -> ConfigResult<()> {
    if settings.label_namespace.is_empty() || !settings.label_namespace.ends_with('.') {
        return Err(ConfigError::InvalidValue {
            field: "labels namespace".to_string(),
            message: format!(
                "namespace must be non-empty and end with '.', got '{}'",
                settings.label_namespace
            ),
        });
    }

    if settings.signature_command.is_empty() {
        return Err(ConfigError::MissingField("signature command".to_string()));
    }

    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}
