//! Build orchestrator - runs the image build pipeline for a model directory.
//!
//! Full builds run generate → build → inspect → encode → label. Base builds
//! run generate (base script) → build under a name derived from the context.
//!
//! The generator is released exactly once per call, after the pipeline has
//! finished, failed or panicked. A cleanup failure is reported as a warning
//! and never replaces the pipeline result.

use futures::FutureExt;
use modelpack_config::{DEFAULT_PROGRESS_MODE, Settings};
use modelpack_core::engine::{ImageBuilder, LabelWriter, SignatureExtractor};
use modelpack_core::generator::{GeneratorFactory, ScriptGenerator};
use modelpack_core::label::type_signature_key;
use modelpack_core::{DEFAULT_LABEL_NAMESPACE, ImageName, LabelSet};
use modelpack_docker::DockerEngine;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{BuildError, BuildStage};

/// Event emitted during a build.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    StageStarted { stage: BuildStage },
    StageCompleted { stage: BuildStage, success: bool },
    CleanupWarning { message: String },
    BuildCompleted { image: ImageName, success: bool },
}

/// Orchestrates image builds over the build collaborators.
pub struct ImageBuildOrchestrator<F: GeneratorFactory> {
    generators: F,
    builder: Arc<dyn ImageBuilder>,
    extractor: Arc<dyn SignatureExtractor>,
    labeler: Arc<dyn LabelWriter>,
    label_namespace: String,
    default_progress: String,
    events: Option<mpsc::Sender<BuildEvent>>,
}

impl<F: GeneratorFactory> ImageBuildOrchestrator<F> {
    pub fn new(
        generators: F,
        builder: Arc<dyn ImageBuilder>,
        extractor: Arc<dyn SignatureExtractor>,
        labeler: Arc<dyn LabelWriter>,
    ) -> Self {
        Self {
            generators,
            builder,
            extractor,
            labeler,
            label_namespace: DEFAULT_LABEL_NAMESPACE.to_string(),
            default_progress: DEFAULT_PROGRESS_MODE.to_string(),
            events: None,
        }
    }

    /// Create an orchestrator backed by the Docker daemon from `settings`.
    pub fn with_docker(generators: F, settings: &Settings) -> modelpack_core::Result<Self> {
        let engine = Arc::new(
            DockerEngine::connect(&settings.docker)?
                .with_signature_command(settings.signature_command.clone()),
        );

        Ok(Self::new(generators, engine.clone(), engine.clone(), engine)
            .with_label_namespace(settings.label_namespace.clone())
            .with_default_progress(settings.progress.clone()))
    }

    pub fn with_label_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.label_namespace = namespace.into();
        self
    }

    /// Progress mode used when a build call does not pick one.
    pub fn with_default_progress(mut self, mode: impl Into<String>) -> Self {
        self.default_progress = mode.into();
        self
    }

    pub fn default_progress(&self) -> &str {
        &self.default_progress
    }

    /// Report progress and cleanup warnings on `tx`.
    ///
    /// Events that do not fit in the channel are dropped rather than
    /// stalling the build.
    pub fn with_events(mut self, tx: mpsc::Sender<BuildEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Build, inspect and label `image` from `config` and `context`.
    ///
    /// On success the image exists and carries the type signature label.
    pub async fn full_build(
        &self,
        config: &F::Config,
        context: &Path,
        image: &ImageName,
        progress_mode: Option<&str>,
    ) -> Result<(), BuildError> {
        info!(image = %image, "Building Docker image from environment as {}", image);
        let progress_mode = progress_mode.unwrap_or(self.default_progress.as_str());

        let mut generator = self.generators.generator(config, context);
        let outcome = AssertUnwindSafe(self.run_full(
            generator.as_mut(),
            context,
            image,
            progress_mode,
        ))
        .catch_unwind()
        .await;
        self.release(generator).await;

        let result = outcome.unwrap_or_else(|panic| panic::resume_unwind(panic));
        self.finish(image, &result).await;
        result
    }

    /// Build the base environment image for `context` and return its name.
    ///
    /// The name depends only on the context path, so two configurations in
    /// the same directory share one base image.
    pub async fn base_build(
        &self,
        config: &F::Config,
        context: &Path,
        progress_mode: Option<&str>,
    ) -> Result<ImageName, BuildError> {
        let image = ImageName::base_for_context(context);
        info!(image = %image, "Building Docker image from environment");
        let progress_mode = progress_mode.unwrap_or(self.default_progress.as_str());

        let mut generator = self.generators.generator(config, context);
        let outcome = AssertUnwindSafe(self.run_base(
            generator.as_mut(),
            context,
            &image,
            progress_mode,
        ))
        .catch_unwind()
        .await;
        self.release(generator).await;

        let result = outcome.unwrap_or_else(|panic| panic::resume_unwind(panic));
        self.finish(&image, &result).await;
        result.map(|()| image)
    }

    async fn run_full(
        &self,
        generator: &mut dyn ScriptGenerator,
        context: &Path,
        image: &ImageName,
        progress_mode: &str,
    ) -> Result<(), BuildError> {
        let script = self
            .stage(BuildStage::Generate, generator.generate(), BuildError::Generate)
            .await?;

        self.stage(
            BuildStage::Build,
            self.builder.build(context, &script, image, progress_mode),
            BuildError::Build,
        )
        .await?;

        info!(image = %image, "Adding labels to image...");
        let signature = self
            .stage(
                BuildStage::Inspect,
                self.extractor.type_signature(image),
                BuildError::Inspect,
            )
            .await?;

        let encoded = self
            .stage(
                BuildStage::Encode,
                async { signature.to_canonical_json() },
                BuildError::Encode,
            )
            .await?;

        let mut labels = LabelSet::new();
        labels.insert(type_signature_key(&self.label_namespace), encoded);

        self.stage(
            BuildStage::Label,
            self.labeler.add_labels(image, &labels),
            BuildError::Label,
        )
        .await
    }

    async fn run_base(
        &self,
        generator: &mut dyn ScriptGenerator,
        context: &Path,
        image: &ImageName,
        progress_mode: &str,
    ) -> Result<(), BuildError> {
        let script = self
            .stage(
                BuildStage::Generate,
                generator.generate_base(),
                BuildError::Generate,
            )
            .await?;

        self.stage(
            BuildStage::Build,
            self.builder.build(context, &script, image, progress_mode),
            BuildError::Build,
        )
        .await
    }

    /// Run one pipeline step, reporting it and tagging its failure.
    async fn stage<T, E, Fut>(
        &self,
        stage: BuildStage,
        step: Fut,
        wrap: fn(E) -> BuildError,
    ) -> Result<T, BuildError>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.emit(BuildEvent::StageStarted { stage }).await;

        let result = step.await.map_err(wrap);
        if let Err(e) = &result {
            error!(stage = %stage, error = %e, "Build stage failed");
        }

        self.emit(BuildEvent::StageCompleted {
            stage,
            success: result.is_ok(),
        })
        .await;
        result
    }

    /// Consume the generator and release its working state.
    async fn release(&self, mut generator: Box<dyn ScriptGenerator>) {
        if let Err(e) = generator.cleanup().await {
            warn!(error = %e, "Error cleaning up Dockerfile generator");
            self.emit(BuildEvent::CleanupWarning {
                message: e.to_string(),
            })
            .await;
        }
    }

    async fn finish<T>(&self, image: &ImageName, result: &Result<T, BuildError>) {
        self.emit(BuildEvent::BuildCompleted {
            image: image.clone(),
            success: result.is_ok(),
        })
        .await;
    }

    async fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                debug!(error = %e, "Dropped build event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use modelpack_core::{Error, TypeSignature};
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    const ENTRY_POINT: &str = r#"CMD ["python", "-m", "modelpack.server"]"#;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        NewGenerator { predict: String, context: PathBuf },
        Generate,
        GenerateBase,
        Cleanup,
        Build { script: String, image: String, progress: String },
        TypeSignature { image: String },
        AddLabels { image: String },
    }

    type Calls = Arc<Mutex<Vec<Call>>>;

    struct ModelConfig {
        predict: String,
    }

    fn config() -> ModelConfig {
        ModelConfig {
            predict: "predict.py:Predictor".to_string(),
        }
    }

    #[derive(Default, Clone, Copy)]
    struct Failures {
        generate: bool,
        cleanup: bool,
        build: bool,
        panic_in_build: bool,
        inspect: bool,
        label: bool,
    }

    struct FakeGenerators {
        calls: Calls,
        failures: Failures,
    }

    struct FakeGenerator {
        calls: Calls,
        failures: Failures,
    }

    impl GeneratorFactory for FakeGenerators {
        type Config = ModelConfig;

        fn generator(&self, config: &ModelConfig, context: &Path) -> Box<dyn ScriptGenerator> {
            self.calls.lock().unwrap().push(Call::NewGenerator {
                predict: config.predict.clone(),
                context: context.to_path_buf(),
            });
            Box::new(FakeGenerator {
                calls: self.calls.clone(),
                failures: self.failures,
            })
        }
    }

    #[async_trait]
    impl ScriptGenerator for FakeGenerator {
        async fn generate(&mut self) -> modelpack_core::Result<String> {
            self.calls.lock().unwrap().push(Call::Generate);
            if self.failures.generate {
                return Err(Error::Generate("unsupported python version".to_string()));
            }
            Ok(format!("FROM python:3.11\nRUN pip install torch\n{}\n", ENTRY_POINT))
        }

        async fn generate_base(&mut self) -> modelpack_core::Result<String> {
            self.calls.lock().unwrap().push(Call::GenerateBase);
            if self.failures.generate {
                return Err(Error::Generate("unsupported python version".to_string()));
            }
            Ok("FROM python:3.11\nRUN pip install torch\n".to_string())
        }

        async fn cleanup(&mut self) -> modelpack_core::Result<()> {
            self.calls.lock().unwrap().push(Call::Cleanup);
            if self.failures.cleanup {
                return Err(Error::Cleanup("permission denied: .modelpack/tmp".to_string()));
            }
            Ok(())
        }
    }

    struct FakeEngine {
        calls: Calls,
        failures: Failures,
        signature: TypeSignature,
        labels: Mutex<HashMap<String, LabelSet>>,
    }

    #[async_trait]
    impl ImageBuilder for FakeEngine {
        async fn build(
            &self,
            _context: &Path,
            script: &str,
            image: &ImageName,
            progress_mode: &str,
        ) -> modelpack_core::Result<()> {
            self.calls.lock().unwrap().push(Call::Build {
                script: script.to_string(),
                image: image.to_string(),
                progress: progress_mode.to_string(),
            });
            if self.failures.panic_in_build {
                panic!("build engine crashed");
            }
            if self.failures.build {
                return Err(Error::Build("pip install exited with code 1".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SignatureExtractor for FakeEngine {
        async fn type_signature(&self, image: &ImageName) -> modelpack_core::Result<TypeSignature> {
            self.calls.lock().unwrap().push(Call::TypeSignature {
                image: image.to_string(),
            });
            if self.failures.inspect {
                return Err(Error::Inspect("ModuleNotFoundError: predict".to_string()));
            }
            Ok(self.signature.clone())
        }
    }

    #[async_trait]
    impl LabelWriter for FakeEngine {
        async fn add_labels(&self, image: &ImageName, labels: &LabelSet) -> modelpack_core::Result<()> {
            self.calls.lock().unwrap().push(Call::AddLabels {
                image: image.to_string(),
            });
            if self.failures.label {
                return Err(Error::Label("image not found".to_string()));
            }
            self.labels
                .lock()
                .unwrap()
                .entry(image.to_string())
                .or_default()
                .extend(labels.clone());
            Ok(())
        }
    }

    fn signature() -> TypeSignature {
        TypeSignature::new(json!({
            "inputs": [{ "name": "image", "type": "path" }, { "name": "scale", "type": "number", "default": 1.5 }],
            "output": { "type": "path" }
        }))
    }

    struct Harness {
        orchestrator: ImageBuildOrchestrator<FakeGenerators>,
        engine: Arc<FakeEngine>,
        calls: Calls,
    }

    fn harness(failures: Failures) -> Harness {
        let calls: Calls = Arc::default();
        let engine = Arc::new(FakeEngine {
            calls: calls.clone(),
            failures,
            signature: signature(),
            labels: Mutex::default(),
        });
        let generators = FakeGenerators {
            calls: calls.clone(),
            failures,
        };
        let orchestrator =
            ImageBuildOrchestrator::new(generators, engine.clone(), engine.clone(), engine.clone());

        Harness {
            orchestrator,
            engine,
            calls,
        }
    }

    impl Harness {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|c| pred(c)).count()
        }

        fn cleanups(&self) -> usize {
            self.count(|c| matches!(c, Call::Cleanup))
        }

        fn inspects(&self) -> usize {
            self.count(|c| matches!(c, Call::TypeSignature { .. }))
        }

        fn label_writes(&self) -> usize {
            self.count(|c| matches!(c, Call::AddLabels { .. }))
        }

        fn labels_of(&self, image: &str) -> LabelSet {
            self.engine
                .labels
                .lock()
                .unwrap()
                .get(image)
                .cloned()
                .unwrap_or_default()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<BuildEvent>) -> Vec<BuildEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_full_build_labels_image_with_signature() {
        let h = harness(Failures::default());
        let image = ImageName::from("m1");

        h.orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &image, Some("plain"))
            .await
            .unwrap();

        let labels = h.labels_of("m1");
        assert_eq!(labels.len(), 1);
        let value = labels.get("run.modelpack.type_signature").unwrap();
        assert_eq!(TypeSignature::from_canonical_json(value).unwrap(), signature());
        assert_eq!(value, &signature().to_canonical_json().unwrap());
    }

    #[tokio::test]
    async fn test_full_build_call_order() {
        let h = harness(Failures::default());
        let image = ImageName::from("m1");

        h.orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &image, Some("plain"))
            .await
            .unwrap();

        let calls = h.calls();
        assert_eq!(
            calls[0],
            Call::NewGenerator {
                predict: "predict.py:Predictor".to_string(),
                context: PathBuf::from("/tmp/proj"),
            }
        );
        assert_eq!(calls[1], Call::Generate);
        assert!(matches!(&calls[2], Call::Build { image, progress, .. } if image == "m1" && progress == "plain"));
        assert_eq!(calls[3], Call::TypeSignature { image: "m1".to_string() });
        assert_eq!(calls[4], Call::AddLabels { image: "m1".to_string() });
        assert_eq!(calls[5], Call::Cleanup);
        assert_eq!(calls.len(), 6);
    }

    #[tokio::test]
    async fn test_full_build_uses_full_script() {
        let h = harness(Failures::default());

        h.orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), Some("auto"))
            .await
            .unwrap();

        assert_eq!(h.count(|c| matches!(c, Call::GenerateBase)), 0);
        let script = h
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Build { script, .. } => Some(script),
                _ => None,
            })
            .unwrap();
        assert!(script.contains(ENTRY_POINT));
    }

    #[tokio::test]
    async fn test_generate_failure_still_cleans_up() {
        let h = harness(Failures {
            generate: true,
            ..Default::default()
        });

        let err = h
            .orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), Some("auto"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), BuildStage::Generate);
        assert!(err.to_string().contains("unsupported python version"));
        assert_eq!(h.cleanups(), 1);
        assert_eq!(h.count(|c| matches!(c, Call::Build { .. })), 0);
    }

    #[tokio::test]
    async fn test_build_failure_skips_inspect_and_label() {
        let h = harness(Failures {
            build: true,
            ..Default::default()
        });

        let err = h
            .orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), Some("auto"))
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Build(Error::Build(_))));
        assert!(err.to_string().contains("pip install exited with code 1"));
        assert_eq!(h.inspects(), 0);
        assert_eq!(h.label_writes(), 0);
        assert_eq!(h.cleanups(), 1);
    }

    #[tokio::test]
    async fn test_inspect_failure_skips_label() {
        let h = harness(Failures {
            inspect: true,
            ..Default::default()
        });

        let err = h
            .orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), Some("auto"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), BuildStage::Inspect);
        assert!(err.to_string().contains("type signature"));
        assert_eq!(h.inspects(), 1);
        assert_eq!(h.label_writes(), 0);
        assert_eq!(h.cleanups(), 1);
    }

    #[tokio::test]
    async fn test_label_failure_is_surfaced() {
        let h = harness(Failures {
            label: true,
            ..Default::default()
        });

        let err = h
            .orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), Some("auto"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), BuildStage::Label);
        assert!(err.to_string().contains("failed to add labels to image"));
        assert!(h.labels_of("m1").is_empty());
        assert_eq!(h.cleanups(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_fail_build() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut h = harness(Failures {
            cleanup: true,
            ..Default::default()
        });
        h.orchestrator = h.orchestrator.with_events(tx);

        let result = h
            .orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), Some("auto"))
            .await;

        assert!(result.is_ok());
        assert_eq!(h.cleanups(), 1);
        let warnings: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                BuildEvent::CleanupWarning { message } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("permission denied"));
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_build_failure() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut h = harness(Failures {
            build: true,
            cleanup: true,
            ..Default::default()
        });
        h.orchestrator = h.orchestrator.with_events(tx);

        let err = h
            .orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), Some("auto"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), BuildStage::Build);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, BuildEvent::CleanupWarning { .. }))
        );
    }

    #[tokio::test]
    async fn test_full_build_events() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut h = harness(Failures::default());
        h.orchestrator = h.orchestrator.with_events(tx);
        let image = ImageName::from("m1");

        h.orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &image, Some("auto"))
            .await
            .unwrap();

        let mut expected = Vec::new();
        for stage in [
            BuildStage::Generate,
            BuildStage::Build,
            BuildStage::Inspect,
            BuildStage::Encode,
            BuildStage::Label,
        ] {
            expected.push(BuildEvent::StageStarted { stage });
            expected.push(BuildEvent::StageCompleted {
                stage,
                success: true,
            });
        }
        expected.push(BuildEvent::BuildCompleted {
            image,
            success: true,
        });

        assert_eq!(drain(&mut rx), expected);
    }

    #[tokio::test]
    async fn test_custom_label_namespace() {
        let mut h = harness(Failures::default());
        h.orchestrator = h.orchestrator.with_label_namespace("org.example.");

        h.orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), Some("auto"))
            .await
            .unwrap();

        let labels = h.labels_of("m1");
        assert_eq!(
            labels.keys().collect::<Vec<_>>(),
            vec!["org.example.type_signature"]
        );
    }

    #[tokio::test]
    async fn test_base_build_derives_name_and_skips_labels() {
        let h = harness(Failures::default());

        let image = h
            .orchestrator
            .base_build(&config(), Path::new("/tmp/proj"), Some("auto"))
            .await
            .unwrap();

        assert_eq!(image.as_str(), "modelpack-proj-base");
        assert_eq!(h.count(|c| matches!(c, Call::GenerateBase)), 1);
        assert_eq!(h.count(|c| matches!(c, Call::Generate)), 0);
        assert_eq!(h.inspects(), 0);
        assert_eq!(h.label_writes(), 0);
        assert_eq!(h.cleanups(), 1);

        let built = h
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Build { script, image, .. } => Some((script, image)),
                _ => None,
            })
            .unwrap();
        assert!(!built.0.contains(ENTRY_POINT));
        assert_eq!(built.1, "modelpack-proj-base");
    }

    #[tokio::test]
    async fn test_base_build_name_is_stable() {
        let h = harness(Failures::default());

        let first = h
            .orchestrator
            .base_build(&config(), Path::new("/tmp/proj"), Some("auto"))
            .await
            .unwrap();
        let second = h
            .orchestrator
            .base_build(
                &ModelConfig {
                    predict: "other.py:Model".to_string(),
                },
                Path::new("/tmp/proj"),
                Some("quiet"),
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(h.cleanups(), 2);
    }

    #[tokio::test]
    async fn test_base_build_failure() {
        let h = harness(Failures {
            build: true,
            ..Default::default()
        });

        let err = h
            .orchestrator
            .base_build(&config(), Path::new("/tmp/proj"), Some("auto"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), BuildStage::Build);
        assert_eq!(h.cleanups(), 1);
    }

    #[tokio::test]
    async fn test_base_build_generate_failure() {
        let h = harness(Failures {
            generate: true,
            ..Default::default()
        });

        let err = h
            .orchestrator
            .base_build(&config(), Path::new("/tmp/proj"), Some("auto"))
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Generate(_)));
        assert_eq!(h.cleanups(), 1);
        assert_eq!(h.count(|c| matches!(c, Call::Build { .. })), 0);
    }

    #[tokio::test]
    async fn test_panicking_builder_still_cleans_up() {
        let h = harness(Failures {
            panic_in_build: true,
            ..Default::default()
        });

        let outcome = AssertUnwindSafe(h.orchestrator.full_build(
            &config(),
            Path::new("/tmp/proj"),
            &ImageName::from("m1"),
            None,
        ))
        .catch_unwind()
        .await;

        assert!(outcome.is_err(), "panic should propagate to the caller");
        assert_eq!(h.cleanups(), 1);
        assert_eq!(h.inspects(), 0);
        assert_eq!(h.label_writes(), 0);
    }

    #[tokio::test]
    async fn test_panicking_base_build_still_cleans_up() {
        let h = harness(Failures {
            panic_in_build: true,
            ..Default::default()
        });

        let outcome = AssertUnwindSafe(h.orchestrator.base_build(
            &config(),
            Path::new("/tmp/proj"),
            None,
        ))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(h.cleanups(), 1);
    }

    #[tokio::test]
    async fn test_default_progress_mode_used_when_unset() {
        let mut h = harness(Failures::default());
        h.orchestrator = h.orchestrator.with_default_progress("quiet");
        assert_eq!(h.orchestrator.default_progress(), "quiet");

        h.orchestrator
            .full_build(&config(), Path::new("/tmp/proj"), &ImageName::from("m1"), None)
            .await
            .unwrap();
        h.orchestrator
            .base_build(&config(), Path::new("/tmp/proj"), Some("plain"))
            .await
            .unwrap();

        let progress: Vec<String> = h
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Build { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec!["quiet", "plain"]);
    }

    #[tokio::test]
    async fn test_full_event_channel_does_not_stall_build() {
        let (tx, _rx) = mpsc::channel(1);
        let mut h = harness(Failures {
            cleanup: true,
            ..Default::default()
        });
        h.orchestrator = h.orchestrator.with_events(tx);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            h.orchestrator.full_build(
                &config(),
                Path::new("/tmp/proj"),
                &ImageName::from("m1"),
                None,
            ),
        )
        .await
        .expect("build should not wait on an unread event channel");

        assert!(result.is_ok());
        assert_eq!(h.cleanups(), 1);
    }

    #[test]
    fn test_default_progress_matches_settings_default() {
        let h = harness(Failures::default());
        assert_eq!(h.orchestrator.default_progress(), Settings::default().progress);
    }
}
