//! Docker Engine implementation of the build capabilities.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::BuildImageOptions;
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use futures::StreamExt;
use modelpack_config::DockerSettings;
use modelpack_core::engine::{ImageBuilder, LabelWriter, SignatureExtractor};
use modelpack_core::{Error, ImageName, LabelSet, Result, TypeSignature};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::{self, SCRIPT_FILE_NAME};

/// Progress mode that demotes build output to debug level.
const QUIET_PROGRESS: &str = "quiet";

/// Docker Engine client implementing image build, inspection and labelling.
pub struct DockerEngine {
    docker: Docker,
    signature_command: Vec<String>,
}

impl DockerEngine {
    /// Connect to the Docker daemon described by `settings`.
    pub fn connect(settings: &DockerSettings) -> Result<Self> {
        let timeout = settings.timeout_secs;
        let docker = match settings.host.as_deref() {
            None => Docker::connect_with_local_defaults()
                .map(|d| d.with_timeout(Duration::from_secs(timeout))),
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, timeout, API_DEFAULT_VERSION)
            }
            Some(host) => Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION),
        }
        .map_err(|e| Error::Docker(format!("Failed to connect to Docker: {}", e)))?;

        Ok(Self::with_client(docker))
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            signature_command: modelpack_config::Settings::default().signature_command,
        }
    }

    /// Override the command run inside an image to print its type signature.
    pub fn with_signature_command(mut self, command: Vec<String>) -> Self {
        self.signature_command = command;
        self
    }

    fn signature_container_name() -> String {
        format!("modelpack-signature-{}", uuid::Uuid::new_v4())
    }

    /// Run an Engine build from an archived context and drain its output.
    async fn run_build(
        &self,
        archive: Vec<u8>,
        image: &ImageName,
        labels: HashMap<String, String>,
        progress_mode: &str,
    ) -> std::result::Result<(), String> {
        let options = BuildImageOptions {
            dockerfile: SCRIPT_FILE_NAME.to_string(),
            t: image.to_string(),
            rm: true,
            labels,
            ..Default::default()
        };

        let quiet = progress_mode == QUIET_PROGRESS;
        let mut stream = self
            .docker
            .build_image(options, None, Some(Bytes::from(archive)));

        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| e.to_string())?;

            if let Some(error) = info.error {
                return Err(error);
            }

            if let Some(line) = info.stream.as_deref().map(str::trim_end) {
                if line.is_empty() {
                    continue;
                }
                if quiet {
                    debug!(image = %image, "{}", line);
                } else {
                    info!(image = %image, "{}", line);
                }
            } else if let Some(status) = info.status {
                debug!(image = %image, status = %status, "Build progress");
            }
        }

        Ok(())
    }

    /// Run the signature command in a fresh container and capture its output.
    async fn run_signature_command(
        &self,
        container_name: &str,
        image: &ImageName,
    ) -> std::result::Result<TypeSignature, String> {
        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(self.signature_command.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.to_string(),
            platform: None,
        };

        self.docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| format!("Failed to create container: {}", e))?;

        self.docker
            .start_container(container_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| format!("Failed to start container: {}", e))?;

        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = self.docker.wait_container(container_name, Some(options));
        let exit_code = match wait_stream.next().await {
            Some(Ok(response)) => response.status_code,
            // Non-zero exits surface as wait errors.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(format!("Failed to wait for container: {}", e)),
            None => return Err("Container wait stream ended without a status".to_string()),
        };

        let (stdout, stderr) = self.collect_output(container_name).await?;

        if exit_code != 0 {
            return Err(format!(
                "signature command exited with code {}: {}",
                exit_code,
                stderr.trim()
            ));
        }

        TypeSignature::from_json(stdout.as_bytes())
            .map_err(|e| format!("Failed to parse type signature output: {}", e))
    }

    async fn collect_output(
        &self,
        container_name: &str,
    ) -> std::result::Result<(String, String), String> {
        let options = LogsOptions::<String> {
            follow: false,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stream = self.docker.logs(container_name, Some(options));
        while let Some(result) = stream.next().await {
            match result.map_err(|e| format!("Failed to read container output: {}", e))? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdErr { message } => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok((stdout, stderr))
    }

    async fn remove_container(&self, container_name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        if let Err(e) = self
            .docker
            .remove_container(container_name, Some(options))
            .await
        {
            warn!(container = %container_name, error = %e, "Failed to remove container");
        }
    }
}

#[async_trait]
impl ImageBuilder for DockerEngine {
    async fn build(
        &self,
        context: &Path,
        script: &str,
        image: &ImageName,
        progress_mode: &str,
    ) -> Result<()> {
        let context_dir: PathBuf = context.to_path_buf();
        let script_owned = script.to_string();
        let archive = tokio::task::spawn_blocking(move || {
            context::archive_context(&context_dir, &script_owned)
        })
        .await
        .map_err(|e| Error::Internal(format!("Archive task failed: {}", e)))?
        .map_err(|e| {
            Error::Build(format!(
                "Failed to archive build context {}: {}",
                context.display(),
                e
            ))
        })?;

        info!(image = %image, context = %context.display(), bytes = archive.len(), "Sending build context");
        self.run_build(archive, image, HashMap::new(), progress_mode)
            .await
            .map_err(Error::Build)
    }
}

#[async_trait]
impl LabelWriter for DockerEngine {
    async fn add_labels(&self, image: &ImageName, labels: &LabelSet) -> Result<()> {
        let script = format!("FROM {}\n", image);
        let archive = context::archive_script(&script)
            .map_err(|e| Error::Label(format!("Failed to archive label script: {}", e)))?;

        let labels: HashMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        debug!(image = %image, count = labels.len(), "Applying labels");
        self.run_build(archive, image, labels, QUIET_PROGRESS)
            .await
            .map_err(Error::Label)
    }
}

#[async_trait]
impl SignatureExtractor for DockerEngine {
    async fn type_signature(&self, image: &ImageName) -> Result<TypeSignature> {
        let container_name = Self::signature_container_name();
        info!(image = %image, container = %container_name, "Extracting type signature");

        let result = self.run_signature_command(&container_name, image).await;
        self.remove_container(&container_name).await;

        result.map_err(Error::Inspect)
    }
}
