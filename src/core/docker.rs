/// Docker and Docker Compose integration
///
/// Helper containers are driven through the Docker API (bollard), while the
/// compose system is stopped and started through the `docker compose` CLI.

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::error::{BackupError, Result};
use super::runtime::{ComposeControl, ContainerRuntime, HelperContainer, STAGING_MOUNT_POINT};
use crate::utils::DEFAULT_STOP_TIMEOUT_SECS;

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    stop_timeout_secs: i64,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            BackupError::ContainerRuntime(format!("Failed to connect to Docker daemon. Is Docker running? {}", e))
        })?;

        Ok(Self {
            docker,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        })
    }

    pub fn with_stop_timeout(mut self, secs: i64) -> Self {
        self.stop_timeout_secs = secs;
        self
    }

    /// Check if Docker daemon is accessible
    pub async fn check_docker(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// Pull `image` unless it is already present locally
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!("Pulling image {}", image);
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut progress = self.docker.create_image(options, None, None);
        while let Some(step) = progress.next().await {
            step?;
        }

        Ok(())
    }

    async fn wait_for_exit(&self, name: &str) -> Result<()> {
        let options = Some(WaitContainerOptions { condition: "not-running" });
        let mut stream = self.docker.wait_container(name, options);

        while let Some(outcome) = stream.next().await {
            match outcome {
                Ok(response) if response.status_code != 0 => {
                    return Err(BackupError::ContainerRuntime(format!(
                        "helper {} exited with status {}",
                        name, response.status_code
                    )));
                }
                Ok(_) => {}
                Err(bollard::errors::Error::DockerContainerWaitError { error, code }) => {
                    return Err(BackupError::ContainerRuntime(format!(
                        "helper {} exited with status {}: {}",
                        name, code, error
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn run(&self, helper: &HelperContainer) -> Result<()> {
        self.ensure_image(&helper.image).await?;

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}",
                helper.staging_dir.display(),
                STAGING_MOUNT_POINT
            )]),
            volumes_from: Some(vec![helper.volumes_from.clone()]),
            ..Default::default()
        };

        let config = Config {
            image: Some(helper.image.clone()),
            cmd: helper
                .command
                .as_ref()
                .map(|command| vec!["sh".to_string(), "-c".to_string(), command.clone()]),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: helper.name.as_str(),
            platform: None,
        });

        self.docker.create_container(options, config).await?;
        self.docker
            .start_container(&helper.name, None::<StartContainerOptions<String>>)
            .await?;
        debug!("Helper {} started (detach: {})", helper.name, helper.detach);

        if helper.detach {
            return Ok(());
        }

        self.wait_for_exit(&helper.name).await
    }

    async fn exec(&self, container: &str, command: &str) -> Result<()> {
        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    cmd: Some(vec!["sh", "-c", command]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut captured = String::new();
        if let StartExecResults::Attached { mut output, .. } = self.docker.start_exec(&exec.id, None).await? {
            while let Some(chunk) = output.next().await {
                captured.push_str(&chunk?.to_string());
            }
        }

        let inspected = self.docker.inspect_exec(&exec.id).await?;
        match inspected.exit_code {
            Some(0) => Ok(()),
            code => Err(BackupError::ContainerRuntime(format!(
                "exec in {} exited with {:?}: {}",
                container,
                code,
                captured.trim()
            ))),
        }
    }

    async fn stop_and_remove(&self, container: &str) -> Result<()> {
        let stopped = self
            .docker
            .stop_container(container, Some(StopContainerOptions { t: self.stop_timeout_secs }))
            .await;
        if let Err(e) = stopped {
            debug!("Stopping {} failed: {}", container, e);
        }

        self.docker
            .remove_container(
                container,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;

        Ok(())
    }

    async fn running_container_names(&self) -> Result<Vec<String>> {
        let options = Some(ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        });

        let containers = self.docker.list_containers(options).await?;

        Ok(containers
            .into_iter()
            .flat_map(|c| c.names.unwrap_or_default())
            .map(|n| n.trim_start_matches('/').to_string())
            .collect())
    }
}

/// `docker compose` driven by one manifest file.
#[derive(Debug, Clone)]
pub struct ComposeCli {
    compose_file: PathBuf,
    stop_timeout_secs: i64,
}

impl ComposeCli {
    pub fn new(compose_file: &Path) -> Result<Self> {
        let is_yaml = compose_file
            .extension()
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false);

        if !compose_file.is_file() || !is_yaml {
            return Err(BackupError::Manifest(format!(
                "docker-compose file has wrong suffix or does not exist: '{}'",
                compose_file.display()
            )));
        }

        Ok(Self {
            compose_file: compose_file.to_path_buf(),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        })
    }

    pub fn with_stop_timeout(mut self, secs: i64) -> Self {
        self.stop_timeout_secs = secs;
        self
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    /// Execute docker compose command
    async fn compose_command(&self, args: &[String]) -> Result<String> {
        let subcommand = args.first().cloned().unwrap_or_default();
        debug!("docker compose -f {} {}", self.compose_file.display(), args.join(" "));

        let output = Command::new("docker")
            .arg("compose")
            .arg("-f")
            .arg(&self.compose_file)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BackupError::ManifestCommand {
                command: subcommand.clone(),
                message: format!("failed to execute docker: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackupError::ManifestCommand {
                command: subcommand,
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ComposeControl for ComposeCli {
    async fn stop(&self) -> Result<()> {
        let args = vec![
            "stop".to_string(),
            "--timeout".to_string(),
            self.stop_timeout_secs.to_string(),
        ];
        self.compose_command(&args).await?;
        Ok(())
    }

    async fn start(&self, services: &[String]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }

        let mut args = vec!["start".to_string()];
        args.extend(services.iter().cloned());
        self.compose_command(&args).await?;
        Ok(())
    }
}
