//! Build-script generator capability.
//!
//! A generator is bound to one build configuration and one build context.
//! It may hold transient working state (temporary files, staged wheels) which
//! is released by [`ScriptGenerator::cleanup`]. Callers must invoke `cleanup`
//! exactly once after generating, whether generation succeeded or not.

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Produces build scripts for a bound configuration and context.
#[async_trait]
pub trait ScriptGenerator: Send {
    /// Generate the full build script, including the runtime entry point.
    async fn generate(&mut self) -> Result<String>;

    /// Generate a reduced script containing only the base environment.
    async fn generate_base(&mut self) -> Result<String>;

    /// Release transient state created while generating.
    async fn cleanup(&mut self) -> Result<()>;
}

/// Creates generators bound to a configuration and a build context.
///
/// The configuration type is opaque to the orchestrator; it is only passed
/// through to the factory.
pub trait GeneratorFactory: Send + Sync {
    type Config: Send + Sync;

    fn generator(&self, config: &Self::Config, context: &Path) -> Box<dyn ScriptGenerator>;
}
