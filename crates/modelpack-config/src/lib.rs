//! KDL configuration parsing for modelpack.
//!
//! This crate handles parsing of the orchestrator settings file
//! (`modelpack.kdl`): label namespace, default progress mode, Docker
//! connection and the type signature command.

pub mod error;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use settings::{DEFAULT_PROGRESS_MODE, DockerSettings, Settings, load_settings, parse_settings};
