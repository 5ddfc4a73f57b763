//! Core domain types and traits for modelpack.
//!
//! This crate contains:
//! - Image names and base-image name derivation
//! - Type signatures and their canonical label encoding
//! - Capability traits for the build collaborators
//!   (script generation, image build, inspection, labelling)

pub mod engine;
pub mod error;
pub mod generator;
pub mod image;
pub mod label;
pub mod signature;

pub use engine::{ImageBuilder, LabelWriter, SignatureExtractor};
pub use error::{Error, Result};
pub use generator::{GeneratorFactory, ScriptGenerator};
pub use image::ImageName;
pub use label::{DEFAULT_LABEL_NAMESPACE, LabelSet};
pub use signature::TypeSignature;
