//! Image build orchestration for modelpack.
//!
//! Drives the generate → build → inspect → label pipeline for a model
//! directory, and the shorter generate → build pipeline for base images.

pub mod error;
pub mod orchestrator;
pub mod telemetry;

pub use error::{BuildError, BuildStage};
pub use orchestrator::{BuildEvent, ImageBuildOrchestrator};
pub use telemetry::{LogFormat, init_tracing};
