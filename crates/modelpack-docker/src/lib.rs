//! Docker Engine adapters for modelpack.
//!
//! Implements the engine capabilities against a Docker daemon:
//! - image builds from a generated script and a context directory
//! - type signature extraction by running the built image
//! - label application by re-tagging the image with extra metadata

pub mod context;
pub mod docker;

pub use docker::DockerEngine;
pub use modelpack_core::engine::{ImageBuilder, LabelWriter, SignatureExtractor};
