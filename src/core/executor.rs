/// Ephemeral-container execution engine
///
/// Runs one disposable helper container per backup item, attached to the
/// volumes of a target container, and collects the file each helper writes
/// into its staging directory. Failures are isolated per item.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::error::{BackupError, Result};
use super::item::BackupItem;
use super::runtime::{ContainerRuntime, HelperContainer};
use crate::utils::{
    unique_container_name, DEFAULT_EXEC_RETRY_INTERVAL_MS, DEFAULT_EXEC_TIMEOUT_SECS, HELPER_CONTAINER_PREFIX,
};

/// Staged file per backup item, `None` when the item failed.
pub type StagingMapping = HashMap<BackupItem, Option<PathBuf>>;

#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    /// Budget for a freshly started helper to accept an exec command
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS),
            retry_interval: Duration::from_millis(DEFAULT_EXEC_RETRY_INTERVAL_MS),
        }
    }
}

pub struct ExecutionEngine<'a, R> {
    runtime: &'a R,
    options: ExecOptions,
}

impl<'a, R: ContainerRuntime> ExecutionEngine<'a, R> {
    pub fn new(runtime: &'a R, options: ExecOptions) -> Self {
        Self { runtime, options }
    }

    /// Run every item of a batch, one after the other.
    ///
    /// Each item gets its own subdirectory of `staging_dir`, mounted at
    /// `/backup` in its helper. An item whose final directory is already
    /// claimed by an earlier item of the batch is rejected as a destination
    /// collision and left out of the mapping, since both would be rotated
    /// together.
    pub async fn run(
        &self,
        image: &str,
        staging_dir: &Path,
        target_container: &str,
        items: &[BackupItem],
    ) -> Result<StagingMapping> {
        if !staging_dir.is_dir() {
            return Err(BackupError::InvalidDirectory {
                path: staging_dir.to_path_buf(),
                reason: "staging directory does not exist".to_string(),
            });
        }

        let mut mapping = StagingMapping::with_capacity(items.len());
        let mut claimed: HashSet<&Path> = HashSet::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            if !claimed.insert(item.final_directory.as_path()) {
                let collision = BackupError::DestinationCollision { path: item.final_directory.clone() };
                error!("{}", collision);
                continue;
            }

            let item_dir = staging_dir.join(format!("item-{}", index));
            fs::create_dir_all(&item_dir)?;

            match self.run_item(image, &item_dir, target_container, item).await {
                Ok(staged) => {
                    info!("Staged '{}' for {}", item.output_file_name, item.final_directory.display());
                    mapping.insert(item.clone(), Some(staged));
                }
                Err(e) if !e.is_fatal() => {
                    error!("Backup of '{}' failed: {}", item.final_path().display(), e);
                    mapping.insert(item.clone(), None);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(mapping)
    }

    async fn run_item(
        &self,
        image: &str,
        item_dir: &Path,
        target_container: &str,
        item: &BackupItem,
    ) -> Result<PathBuf> {
        let helper = HelperContainer {
            name: unique_container_name(HELPER_CONTAINER_PREFIX),
            image: image.to_string(),
            command: item.primary_command.clone(),
            staging_dir: item_dir.to_path_buf(),
            volumes_from: target_container.to_string(),
            detach: item.post_start_command.is_some(),
        };

        debug!("Starting helper {} ({}) for '{}'", helper.name, image, item.output_file_name);
        let outcome = self.produce(&helper, item).await;

        if let Err(e) = self.runtime.stop_and_remove(&helper.name).await {
            debug!("Cleanup of helper {} skipped: {}", helper.name, e);
        }

        outcome?;

        let staged = item.staged_path(item_dir);
        if !staged.is_file() {
            return Err(BackupError::ContainerRuntime(format!(
                "helper exited cleanly but produced no '{}'",
                item.output_file_name
            )));
        }

        Ok(staged)
    }

    async fn produce(&self, helper: &HelperContainer, item: &BackupItem) -> Result<()> {
        self.runtime.run(helper).await?;

        if let Some(command) = &item.post_start_command {
            exec_with_retry(self.runtime, &helper.name, command, self.options).await?;
        }

        Ok(())
    }
}

/// Retry `command` against `container` until it succeeds or the timeout passes.
///
/// The timeout bounds the whole loop, a single hanging attempt included.
pub async fn exec_with_retry<R: ContainerRuntime>(
    runtime: &R,
    container: &str,
    command: &str,
    options: ExecOptions,
) -> Result<()> {
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let remaining = options.timeout.saturating_sub(started.elapsed());
        let err = match timeout(remaining, runtime.exec(container, command)).await {
            Ok(Ok(())) => {
                debug!("Exec in {} succeeded after {} attempt(s)", container, attempt);
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => {
                warn!("Attempt {} in {} still running when the budget ran out", attempt, container);
                return Err(BackupError::Timeout {
                    container: container.to_string(),
                    elapsed: started.elapsed(),
                });
            }
        };

        let elapsed = started.elapsed();
        if elapsed >= options.timeout {
            warn!("Giving up on {} after {} attempt(s): {}", container, attempt, err);
            return Err(BackupError::Timeout {
                container: container.to_string(),
                elapsed,
            });
        }

        debug!("Exec attempt {} in {} failed: {}", attempt, container, err);
        sleep(options.retry_interval.min(options.timeout - elapsed)).await;
    }
}
