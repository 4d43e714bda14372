/// Backup run orchestration
///
/// Ties the compose manifest, the backup scheme, the pause coordinator, the
/// execution engine and the version rotation together into one run:
///
/// 1. Create `<destination>/<service>/<target_dir>` for every scheduled task
/// 2. Stop the compose system
/// 3. Per task: stage the items in a temporary directory, copy them to their
///    final directory and rotate that directory
/// 4. Restart the services that were running before

use colored::Colorize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use super::compose::{discover_compose_file, parse_compose_file, ComposeService};
use super::docker::{ComposeCli, DockerRuntime};
use super::error::{BackupError, Result};
use super::executor::{ExecOptions, ExecutionEngine};
use super::item::BackupItem;
use super::pause::PauseCoordinator;
use super::rotation::{update_version_numbers, VersionPattern};
use super::runtime::{ComposeControl, ContainerRuntime};
use super::scheme::{parse_backup_scheme, BackupTask};
use super::version::Axis;
use crate::utils::{format_bytes, format_duration, AppConfig};

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub helper_image: String,
    /// Parent of the per-task staging directories, system temp dir if unset
    pub staging_root: Option<PathBuf>,
    pub axis: Axis,
    pub exec: ExecOptions,
}

impl BackupOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            helper_image: config.helper_image.clone(),
            staging_root: config.staging_root.clone(),
            axis: if config.update_major { Axis::Major } else { Axis::Minor },
            exec: config.exec_options(),
        }
    }
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Per-item outcome counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub success: usize,
    pub error: usize,
}

impl RunStats {
    pub fn merge(&mut self, other: RunStats) {
        self.success += other.success;
        self.error += other.error;
    }

    pub fn summary(&self) -> String {
        format!("{} successful, {} errors", self.success, self.error)
    }

    pub fn report(&self) {
        let summary = self.summary();
        if self.error == 0 {
            info!("Backup finished: {}", summary);
            println!("{} {}", "✓".green(), summary.green());
        } else {
            warn!("Backup finished: {}", summary);
            println!("{} {}", "⚠".yellow(), summary.yellow());
        }
    }
}

/// One task of the scheme, bound to its service and destination directory.
struct PlannedTask<'a> {
    service: &'a ComposeService,
    task: &'a BackupTask,
    task_dir: PathBuf,
}

pub struct BackupBot<R, C> {
    runtime: R,
    compose: C,
    options: BackupOptions,
    pattern: VersionPattern,
}

impl<R: ContainerRuntime, C: ComposeControl> BackupBot<R, C> {
    pub fn new(runtime: R, compose: C, options: BackupOptions) -> Self {
        Self {
            runtime,
            compose,
            options,
            pattern: VersionPattern::default(),
        }
    }

    /// Back up every scheduled task with the system paused.
    ///
    /// `services` and `scheme` are keyed by container name. The pause covers
    /// all services of the manifest, not only the scheduled ones.
    pub async fn run(
        &self,
        services: &BTreeMap<String, ComposeService>,
        scheme: &BTreeMap<String, Vec<BackupTask>>,
        destination: &Path,
    ) -> Result<RunStats> {
        let started = Instant::now();
        let plan = Self::plan(services, scheme, destination)?;
        info!("Scheduled {} backup task(s) into {}", plan.len(), destination.display());

        let coordinator = PauseCoordinator::new(&self.runtime, &self.compose);
        let stats = coordinator
            .with_paused_system(services.values(), || self.backup_all(&plan))
            .await?;

        info!("Backup run took {}", format_duration(started.elapsed().as_secs()));
        stats.report();
        Ok(stats)
    }

    fn plan<'a>(
        services: &'a BTreeMap<String, ComposeService>,
        scheme: &'a BTreeMap<String, Vec<BackupTask>>,
        destination: &Path,
    ) -> Result<Vec<PlannedTask<'a>>> {
        let mut plan = Vec::new();

        for (container_name, tasks) in scheme {
            let service = match services.get(container_name) {
                Some(service) => service,
                None => {
                    warn!("Service '{}' of the backup scheme is not part of the manifest, skipping", container_name);
                    continue;
                }
            };

            for task in tasks {
                let task_dir = destination.join(container_name).join(&task.target_dir_name);
                fs::create_dir_all(&task_dir).map_err(|e| BackupError::InvalidDirectory {
                    path: task_dir.clone(),
                    reason: e.to_string(),
                })?;
                plan.push(PlannedTask { service, task, task_dir });
            }
        }

        Ok(plan)
    }

    async fn backup_all(&self, plan: &[PlannedTask<'_>]) -> Result<RunStats> {
        let engine = ExecutionEngine::new(&self.runtime, self.options.exec);
        let mut stats = RunStats::default();

        for planned in plan {
            info!(
                "Running {} for '{}'",
                planned.task.strategy.kind(),
                planned.service.container_name
            );
            stats.merge(self.backup_task(&engine, planned).await?);
        }

        Ok(stats)
    }

    async fn backup_task(&self, engine: &ExecutionEngine<'_, R>, planned: &PlannedTask<'_>) -> Result<RunStats> {
        let PlannedTask { service, task, task_dir } = planned;
        let mut stats = RunStats::default();

        let prepared = task
            .image(service, &self.options.helper_image)
            .and_then(|image| Ok((image, task.produce_items(service, task_dir)?)));
        let (image, items) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Skipping {} for '{}': {}", task.strategy.kind(), service.container_name, e);
                stats.error += 1;
                return Ok(stats);
            }
        };

        if items.is_empty() {
            warn!("{} for '{}' selected nothing", task.strategy.kind(), service.container_name);
            return Ok(stats);
        }

        let staging = self.staging_dir()?;
        let mut mapping = engine
            .run(&image, staging.path(), &service.container_name, &items)
            .await?;

        for item in &items {
            // rejected duplicates never make it into the mapping
            let staged = match mapping.remove(item) {
                Some(Some(staged)) => staged,
                _ => {
                    stats.error += 1;
                    continue;
                }
            };

            match self.deliver(item, &staged) {
                Ok(()) => stats.success += 1,
                Err(e) if !e.is_fatal() => {
                    error!("Backup of '{}' failed: {}", item.final_path().display(), e);
                    stats.error += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(stats)
    }

    fn staging_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("backupbot-");

        let staging = match &self.options.staging_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        debug!("Staging in {}", staging.path().display());
        Ok(staging)
    }

    /// Copy a staged file to its final directory and rotate the directory.
    ///
    /// An unversioned file left at the destination by an interrupted run is
    /// rotated in as an older version first.
    fn deliver(&self, item: &BackupItem, staged: &Path) -> Result<()> {
        fs::create_dir_all(&item.final_directory)?;

        let target = item.final_path();
        if target.exists() {
            warn!("Found unrotated {}, rotating it in before storing the new backup", target.display());
            self.rotate(item)?;
            if target.exists() {
                return Err(BackupError::DestinationCollision { path: target });
            }
        }
        fs::copy(staged, &target)?;

        let renames = self.rotate(item)?;
        let stored = renames
            .iter()
            .find(|(old, _)| old == &target)
            .map(|(_, new)| new.clone())
            .unwrap_or(target);

        let size = fs::metadata(&stored).map(|m| m.len()).unwrap_or(0);
        info!("Backed up {} ({})", stored.display(), format_bytes(size));
        Ok(())
    }

    fn rotate(&self, item: &BackupItem) -> Result<Vec<(PathBuf, PathBuf)>> {
        update_version_numbers(&item.final_directory, item.suffix(), &self.pattern, self.options.axis)
    }
}

/// Run a complete backup of the compose project below `root` on Docker.
pub async fn run_with_docker(
    root: &Path,
    destination: &Path,
    scheme_file: &Path,
    config: &AppConfig,
) -> Result<RunStats> {
    let compose_file = discover_compose_file(root)?;
    info!("Using compose file {}", compose_file.display());

    let services = parse_compose_file(&compose_file, root)?;
    let scheme = parse_backup_scheme(scheme_file)?;

    let runtime = DockerRuntime::connect()?.with_stop_timeout(config.stop_timeout_secs);
    let compose = ComposeCli::new(&compose_file)?.with_stop_timeout(config.stop_timeout_secs);

    fs::create_dir_all(destination).map_err(|e| BackupError::InvalidDirectory {
        path: destination.to_path_buf(),
        reason: e.to_string(),
    })?;

    BackupBot::new(runtime, compose, BackupOptions::from_config(config))
        .run(&services, &scheme, destination)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compose::Volume;
    use crate::core::executor::tests::FakeRuntime;
    use crate::core::pause::tests::FakeCompose;
    use crate::core::scheme::{BackupStrategy, MySqlConfig, VolumeConfig};
    use std::thread::sleep;
    use std::time::Duration;

    fn service(name: &str, image: Option<&str>, volumes: &[&str]) -> ComposeService {
        ComposeService {
            name: name.to_string(),
            container_name: name.to_string(),
            image: image.map(|i| i.to_string()),
            hostname: None,
            volumes: volumes
                .iter()
                .map(|v| Volume {
                    name: v.to_string(),
                    mount_point: PathBuf::from(format!("/mnt/{}", v)),
                })
                .collect(),
            bind_mounts: Vec::new(),
        }
    }

    fn services() -> BTreeMap<String, ComposeService> {
        let mut services = BTreeMap::new();
        services.insert("app".to_string(), service("app", Some("app:1"), &["data", "cache"]));
        services.insert("db".to_string(), service("db", Some("mysql:8"), &[]));
        services
    }

    fn volumes(names: &[&str]) -> BackupTask {
        BackupTask::new(BackupStrategy::Volumes(VolumeConfig {
            volumes: names.iter().map(|n| n.to_string()).collect(),
        }))
    }

    fn mysql(database: &str) -> BackupTask {
        BackupTask::new(BackupStrategy::MySql(MySqlConfig {
            database: database.to_string(),
            user: "root".to_string(),
            password: "secret".to_string(),
        }))
    }

    fn options(staging: &Path) -> BackupOptions {
        BackupOptions {
            staging_root: Some(staging.to_path_buf()),
            exec: ExecOptions {
                timeout: Duration::from_millis(200),
                retry_interval: Duration::from_millis(5),
            },
            ..Default::default()
        }
    }

    fn bot(running: &[&str], staging: &Path) -> BackupBot<FakeRuntime, FakeCompose> {
        let runtime = FakeRuntime {
            running: running.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        BackupBot::new(runtime, FakeCompose::default(), options(staging))
    }

    #[tokio::test]
    async fn test_run_stores_and_rotates_backups() {
        let dest = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let bot = bot(&["app", "db"], staging.path());

        let mut scheme = BTreeMap::new();
        scheme.insert("app".to_string(), vec![volumes(&["all"])]);
        scheme.insert("db".to_string(), vec![mysql("shop")]);

        let stats = bot.run(&services(), &scheme, dest.path()).await.unwrap();
        assert_eq!(stats, RunStats { success: 3, error: 0 });

        let data_dir = dest.path().join("app").join("volumes").join("data");
        assert!(data_dir.join("data-0-0.tar.gz").is_file());
        assert!(dest.path().join("db/mysql_databases/shop/shop-0-0.sql").is_file());

        sleep(Duration::from_millis(15));
        let stats = bot.run(&services(), &scheme, dest.path()).await.unwrap();
        assert_eq!(stats.success, 3);
        assert!(data_dir.join("data-0-0.tar.gz").is_file());
        assert!(data_dir.join("data-0-1.tar.gz").is_file());
        assert_eq!(fs::read_dir(&data_dir).unwrap().count(), 2);

        // system paused and restarted on every run, staging cleaned up
        assert_eq!(
            *bot.compose.calls.lock().unwrap(),
            vec!["stop", "start app db", "stop", "start app db"]
        );
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_major_axis() {
        let dest = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let mut opts = options(staging.path());
        opts.axis = Axis::Major;
        let bot = BackupBot::new(FakeRuntime::default(), FakeCompose::default(), opts);

        let mut scheme = BTreeMap::new();
        scheme.insert("app".to_string(), vec![volumes(&["data"])]);

        bot.run(&services(), &scheme, dest.path()).await.unwrap();
        sleep(Duration::from_millis(15));
        bot.run(&services(), &scheme, dest.path()).await.unwrap();

        let data_dir = dest.path().join("app/volumes/data");
        assert!(data_dir.join("data-0-0.tar.gz").is_file());
        assert!(data_dir.join("data-1-0.tar.gz").is_file());

        // nothing was running, so nothing is restarted
        assert_eq!(*bot.compose.calls.lock().unwrap(), vec!["stop", "stop"]);
    }

    #[tokio::test]
    async fn test_task_errors_are_counted_not_fatal() {
        let dest = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let bot = bot(&["app"], staging.path());

        let mut services = services();
        if let Some(db) = services.get_mut("db") {
            db.image = None;
        }

        let mut scheme = BTreeMap::new();
        scheme.insert("app".to_string(), vec![volumes(&["data"])]);
        scheme.insert("db".to_string(), vec![mysql("shop")]);
        scheme.insert("ghost".to_string(), vec![volumes(&["all"])]);

        let stats = bot.run(&services, &scheme, dest.path()).await.unwrap();
        assert_eq!(stats, RunStats { success: 1, error: 1 });
        assert_eq!(stats.summary(), "1 successful, 1 errors");

        // the unknown service gets no directory, the failed task does
        assert!(!dest.path().join("ghost").exists());
        assert!(dest.path().join("db/mysql_databases").is_dir());
    }

    #[tokio::test]
    async fn test_unrotated_leftover_is_rotated_in() {
        let dest = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let bot = bot(&[], staging.path());

        let data_dir = dest.path().join("app/volumes/data");
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("data-0-0.tar.gz"), "oldest").unwrap();
        sleep(Duration::from_millis(15));
        fs::write(data_dir.join("data.tar.gz"), "left over").unwrap();
        sleep(Duration::from_millis(15));

        let mut scheme = BTreeMap::new();
        scheme.insert("app".to_string(), vec![volumes(&["data", "cache"])]);

        let stats = bot.run(&services(), &scheme, dest.path()).await.unwrap();
        assert_eq!(stats, RunStats { success: 2, error: 0 });

        assert!(!data_dir.join("data.tar.gz").exists());
        assert_eq!(fs::read_to_string(data_dir.join("data-0-2.tar.gz")).unwrap(), "oldest");
        assert_eq!(fs::read_to_string(data_dir.join("data-0-1.tar.gz")).unwrap(), "left over");
        assert!(fs::read_to_string(data_dir.join("data-0-0.tar.gz")).unwrap().starts_with("tar -czf"));
        assert!(dest.path().join("app/volumes/cache/cache-0-0.tar.gz").is_file());

        // the next run keeps going without manual cleanup
        sleep(Duration::from_millis(15));
        let stats = bot.run(&services(), &scheme, dest.path()).await.unwrap();
        assert_eq!(stats, RunStats { success: 2, error: 0 });
        assert_eq!(fs::read_dir(&data_dir).unwrap().count(), 4);
    }

    #[tokio::test]
    async fn test_stop_failure_aborts_run() {
        let dest = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let compose = FakeCompose {
            fail_stop: true,
            ..Default::default()
        };
        let bot = BackupBot::new(FakeRuntime::default(), compose, options(staging.path()));

        let mut scheme = BTreeMap::new();
        scheme.insert("app".to_string(), vec![volumes(&["all"])]);

        let err = bot.run(&services(), &scheme, dest.path()).await.unwrap_err();
        assert!(matches!(err, BackupError::ManifestCommand { .. }));
        assert!(bot.runtime.state.lock().unwrap().started.is_empty());
    }

    #[test]
    fn test_run_stats() {
        let mut stats = RunStats { success: 2, error: 0 };
        stats.merge(RunStats { success: 1, error: 3 });
        assert_eq!(stats, RunStats { success: 3, error: 3 });
        assert_eq!(stats.summary(), "3 successful, 3 errors");
    }
}
