/// Backup scheme: which artifacts to back up for which service
///
/// The scheme is a JSON file mapping container names to a list of tasks:
///
/// ```json
/// {
///   "service1": [
///     { "type": "bind_mount_backup", "config": { "bind_mounts": ["all"] } },
///     { "type": "volume_backup", "config": { "volumes": ["service1_volume1"] } },
///     { "type": "mysql_backup", "config": { "database": "db", "user": "u", "password": "p" } }
///   ]
/// }
/// ```

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{error, warn};

use super::compose::ComposeService;
use super::error::{BackupError, Result};
use super::item::BackupItem;
use super::runtime::STAGING_MOUNT_POINT;
use crate::utils::{path_to_name, shell_quote, SELECT_ALL};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindMountConfig {
    pub bind_mounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeConfig {
    pub volumes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MySqlConfig {
    pub database: String,
    pub user: String,
    pub password: String,
}

/// How a task turns a service into backup items.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum BackupStrategy {
    #[serde(rename = "bind_mount_backup")]
    BindMounts(BindMountConfig),
    #[serde(rename = "volume_backup")]
    Volumes(VolumeConfig),
    #[serde(rename = "mysql_backup")]
    MySql(MySqlConfig),
}

impl BackupStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            BackupStrategy::BindMounts(_) => "bind_mount_backup",
            BackupStrategy::Volumes(_) => "volume_backup",
            BackupStrategy::MySql(_) => "mysql_backup",
        }
    }

    pub fn default_target_dir(&self) -> &'static str {
        match self {
            BackupStrategy::BindMounts(_) => "bind_mounts",
            BackupStrategy::Volumes(_) => "volumes",
            BackupStrategy::MySql(_) => "mysql_databases",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTask {
    pub strategy: BackupStrategy,
    /// Subdirectory of `<destination>/<service>` receiving this task's files
    pub target_dir_name: String,
}

impl BackupTask {
    pub fn new(strategy: BackupStrategy) -> Self {
        let target_dir_name = strategy.default_target_dir().to_string();
        Self {
            strategy,
            target_dir_name,
        }
    }

    pub fn with_target_dir(mut self, target_dir_name: impl Into<String>) -> Self {
        self.target_dir_name = target_dir_name.into();
        self
    }

    /// Image the helper containers of this task run.
    pub fn image(&self, service: &ComposeService, helper_image: &str) -> Result<String> {
        match &self.strategy {
            BackupStrategy::BindMounts(_) | BackupStrategy::Volumes(_) => Ok(helper_image.to_string()),
            BackupStrategy::MySql(_) => service.image.clone().ok_or_else(|| {
                BackupError::Scheme(format!(
                    "mysql_backup needs an image for service '{}'",
                    service.name
                ))
            }),
        }
    }

    /// Backup items for `service`, writing below `task_dir`.
    pub fn produce_items(&self, service: &ComposeService, task_dir: &Path) -> Result<Vec<BackupItem>> {
        match &self.strategy {
            BackupStrategy::BindMounts(config) => {
                let patterns = config
                    .bind_mounts
                    .iter()
                    .map(|p| glob_to_regex(p))
                    .collect::<Result<Vec<_>>>()?;

                Ok(service
                    .bind_mounts
                    .iter()
                    .filter(|mount| {
                        is_select_all(&config.bind_mounts) || patterns.iter().any(|re| re.is_match(&mount.path.to_string_lossy()))
                    })
                    .map(|mount| {
                        let name = path_to_name(&mount.path, 3);
                        archive_item(&name, &mount.mount_point, task_dir)
                    })
                    .collect())
            }
            BackupStrategy::Volumes(config) => {
                if !is_select_all(&config.volumes) {
                    for wanted in &config.volumes {
                        if !service.volumes.iter().any(|v| &v.name == wanted) {
                            warn!("Volume '{}' is not mounted by service '{}'", wanted, service.name);
                        }
                    }
                }

                Ok(service
                    .volumes
                    .iter()
                    .filter(|volume| is_select_all(&config.volumes) || config.volumes.contains(&volume.name))
                    .map(|volume| archive_item(&volume.name, &volume.mount_point, task_dir))
                    .collect())
            }
            BackupStrategy::MySql(config) => {
                let output = format!("{}.sql", config.database);
                let command = format!(
                    "mysqldump --user={} --password={} {} > {}",
                    shell_quote(&config.user),
                    shell_quote(&config.password),
                    shell_quote(&config.database),
                    shell_quote(&staging_path(&output))
                );
                Ok(vec![BackupItem::with_post_start(
                    command,
                    output,
                    task_dir.join(&config.database),
                )])
            }
        }
    }
}

fn archive_item(name: &str, mount_point: &Path, task_dir: &Path) -> BackupItem {
    let output = format!("{}.tar.gz", name);
    let command = format!(
        "tar -czf {} -C {} .",
        shell_quote(&staging_path(&output)),
        shell_quote(&mount_point.to_string_lossy())
    );
    BackupItem::with_command(command, output, task_dir.join(name))
}

/// Path of `output` inside the helper's staging mount.
fn staging_path(output: &str) -> String {
    format!("{}/{}", STAGING_MOUNT_POINT, output)
}

fn is_select_all(selection: &[String]) -> bool {
    selection.len() == 1 && selection[0] == SELECT_ALL
}

/// Right-anchored glob: `data` matches `/srv/app/data`, `*` stays within one
/// path component.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let body = regex::escape(pattern.trim_start_matches("./")).replace(r"\*", "[^/]*");
    let anchored = if pattern.starts_with('/') {
        format!("^{}$", body)
    } else {
        format!("(^|/){}$", body)
    };
    Regex::new(&anchored).map_err(|e| BackupError::Scheme(format!("invalid bind mount pattern '{}': {}", pattern, e)))
}

/// Parse the backup scheme file into tasks per container name.
///
/// Entries that fail to decode are logged and skipped.
pub fn parse_backup_scheme(file: &Path) -> Result<BTreeMap<String, Vec<BackupTask>>> {
    let is_json = file
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if !file.is_file() || !is_json {
        return Err(BackupError::Scheme(format!(
            "backup configuration file has wrong suffix or does not exist: '{}'",
            file.display()
        )));
    }

    let content = fs::read_to_string(file)?;
    let parsed: BTreeMap<String, Vec<serde_json::Value>> = serde_json::from_str(&content)
        .map_err(|e| BackupError::Scheme(format!("failed to parse '{}': {}", file.display(), e)))?;

    let mut scheme = BTreeMap::new();
    for (service_name, entries) in parsed {
        let mut tasks = Vec::with_capacity(entries.len());

        for entry in entries {
            let kind = entry.get("type").and_then(|t| t.as_str()).unwrap_or("<missing>").to_string();
            let target_dir = entry.get("target_dir").and_then(|t| t.as_str()).map(|s| s.to_string());

            match serde_json::from_value::<BackupStrategy>(entry) {
                Ok(strategy) => {
                    let task = BackupTask::new(strategy);
                    tasks.push(match target_dir {
                        Some(dir) => task.with_target_dir(dir),
                        None => task,
                    });
                }
                Err(e) => {
                    error!("Failed to parse backup task of type '{}' for '{}': {}", kind, service_name, e);
                }
            }
        }

        scheme.insert(service_name, tasks);
    }

    Ok(scheme)
}
