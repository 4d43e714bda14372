/// docker-compose manifest model
///
/// Locates the single compose file of a project and extracts, per service,
/// the bind mounts and named volumes that can be backed up.

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::error::{BackupError, Result};
use crate::utils::COMPOSE_FILE_NAMES;

/// Named volume mounted into a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub mount_point: PathBuf,
}

/// Host directory bind-mounted into a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDirectory {
    pub path: PathBuf,
    pub mount_point: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeService {
    pub name: String,
    pub container_name: String,
    pub image: Option<String>,
    pub hostname: Option<String>,
    pub volumes: Vec<Volume>,
    pub bind_mounts: Vec<HostDirectory>,
}

/// Find the one compose file below `root`.
pub fn discover_compose_file(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(BackupError::InvalidDirectory {
            path: root.to_path_buf(),
            reason: "project root does not exist".to_string(),
        });
    }

    let found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            COMPOSE_FILE_NAMES
                .iter()
                .any(|name| entry.file_name().to_string_lossy() == *name)
        })
        .map(|entry| entry.into_path())
        .collect();

    match found.len() {
        1 => Ok(found.into_iter().next().unwrap_or_default()),
        n => Err(BackupError::Manifest(format!(
            "there must be exactly one docker-compose file below '{}', found {}",
            root.display(),
            n
        ))),
    }
}

/// Parse a compose file into services keyed by container name.
///
/// Relative bind mount paths are resolved against `root`.
pub fn parse_compose_file(file: &Path, root: &Path) -> Result<BTreeMap<String, ComposeService>> {
    let content = fs::read_to_string(file)
        .map_err(|e| BackupError::Manifest(format!("failed to read '{}': {}", file.display(), e)))?;

    let yaml: Value = serde_yaml::from_str(&content)
        .map_err(|e| BackupError::Manifest(format!("failed to parse '{}': {}", file.display(), e)))?;

    let services_map = yaml
        .get("services")
        .and_then(|s| s.as_mapping())
        .ok_or_else(|| BackupError::Manifest(format!("'{}' has no 'services' key", file.display())))?;

    let mut services = BTreeMap::new();

    for (service_name, service_config) in services_map {
        let name = match service_name.as_str() {
            Some(name) => name.to_string(),
            None => continue,
        };

        let container_name = service_config
            .get("container_name")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| name.clone());

        let image = service_config.get("image").and_then(|i| i.as_str()).map(|s| s.to_string());
        let hostname = service_config.get("hostname").and_then(|h| h.as_str()).map(|s| s.to_string());

        let mut service = ComposeService {
            name: name.clone(),
            container_name: container_name.clone(),
            image,
            hostname,
            volumes: Vec::new(),
            bind_mounts: Vec::new(),
        };

        let entries = service_config
            .get("volumes")
            .and_then(|v| v.as_sequence())
            .cloned()
            .unwrap_or_default();

        for entry in &entries {
            let parsed = match entry {
                Value::String(s) => parse_volume(s),
                Value::Mapping(_) => parse_long_volume(entry),
                _ => Err(BackupError::Manifest(format!("unsupported volume entry: {:?}", entry))),
            };

            let (source, mount_point) = match parsed {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Skipping volume of service '{}' in '{}': {}", name, file.display(), e);
                    continue;
                }
            };

            if is_host_path(&source) {
                let path = match resolve_host_path(&source, root) {
                    Some(path) => path,
                    None => {
                        warn!("Skipping bind mount '{}' of service '{}': no home directory", source, name);
                        continue;
                    }
                };
                service.bind_mounts.push(HostDirectory {
                    path,
                    mount_point: PathBuf::from(mount_point),
                });
            } else {
                service.volumes.push(Volume {
                    name: source,
                    mount_point: PathBuf::from(mount_point),
                });
            }
        }

        debug!(
            "Service '{}' ({}): {} volume(s), {} bind mount(s)",
            name,
            container_name,
            service.volumes.len(),
            service.bind_mounts.len()
        );
        services.insert(container_name, service);
    }

    Ok(services)
}

/// Split a short-form volume (`source:target[:mode]`).
pub fn parse_volume(volume: &str) -> Result<(String, String)> {
    let mut parts = volume.splitn(3, ':');
    match (parts.next(), parts.next()) {
        (Some(source), Some(target)) if !source.is_empty() && !target.is_empty() => {
            Ok((source.to_string(), target.to_string()))
        }
        _ => Err(BackupError::Manifest(format!(
            "unable to parse volume: delimiter ':' missing in '{}'",
            volume
        ))),
    }
}

fn parse_long_volume(entry: &Value) -> Result<(String, String)> {
    let source = entry.get("source").and_then(|s| s.as_str());
    let target = entry.get("target").and_then(|t| t.as_str());
    match (source, target) {
        (Some(source), Some(target)) => Ok((source.to_string(), target.to_string())),
        _ => Err(BackupError::Manifest(
            "long-form volume needs 'source' and 'target'".to_string(),
        )),
    }
}

fn is_host_path(source: &str) -> bool {
    source.starts_with('.') || source.starts_with('/') || source.starts_with('~')
}

/// Host path of a bind mount source: `~` expands to the home directory,
/// relative paths resolve against `root`.
fn resolve_host_path(source: &str, root: &Path) -> Option<PathBuf> {
    if source == "~" {
        return dirs::home_dir();
    }
    if let Some(rest) = source.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    Some(root.join(source.trim_start_matches("./")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMPOSE: &str = r#"
services:
  first_service:
    container_name: service1
    image: image1
    hostname: hostname1
    volumes:
      - ./service1_bind_mount1:/service1/bind_mount1/path
      - service1_volume1:/service1/volume1/path
      - service1_volume2:/service1/volume2/path:ro
  second_service:
    image: source/image
    volumes:
      - type: volume
        source: service2_volume1
        target: /service2/volume1/path
      - invalid_volume_string
  no_volumes:
    image: busybox
"#;

    #[test]
    fn test_parse_compose_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("docker-compose.yaml");
        fs::write(&file, COMPOSE).unwrap();

        let services = parse_compose_file(&file, tmp.path()).unwrap();
        assert_eq!(services.len(), 3);

        let first = &services["service1"];
        assert_eq!(first.name, "first_service");
        assert_eq!(first.image.as_deref(), Some("image1"));
        assert_eq!(first.hostname.as_deref(), Some("hostname1"));
        assert_eq!(
            first.bind_mounts,
            vec![HostDirectory {
                path: tmp.path().join("service1_bind_mount1"),
                mount_point: PathBuf::from("/service1/bind_mount1/path"),
            }]
        );
        assert_eq!(
            first.volumes,
            vec![
                Volume {
                    name: "service1_volume1".to_string(),
                    mount_point: PathBuf::from("/service1/volume1/path"),
                },
                Volume {
                    name: "service1_volume2".to_string(),
                    mount_point: PathBuf::from("/service1/volume2/path"),
                },
            ]
        );

        // container name falls back to the service name, bad entries are skipped
        let second = &services["second_service"];
        assert_eq!(second.volumes.len(), 1);
        assert_eq!(second.volumes[0].name, "service2_volume1");
        assert!(second.bind_mounts.is_empty());
    }

    #[test]
    fn test_missing_services_key() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("docker-compose.yaml");
        fs::write(&file, "version: '3'\n").unwrap();

        assert!(matches!(
            parse_compose_file(&file, tmp.path()),
            Err(BackupError::Manifest(_))
        ));
    }

    #[test]
    fn test_resolve_host_path() {
        let root = Path::new("/srv/project");
        assert_eq!(resolve_host_path("./data", root), Some(root.join("data")));
        assert_eq!(resolve_host_path("/var/data", root), Some(PathBuf::from("/var/data")));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_host_path("~/backups/data", root), Some(home.join("backups/data")));
            assert_eq!(resolve_host_path("~", root), Some(home));
        }
    }

    #[test]
    fn test_parse_volume() {
        assert_eq!(
            parse_volume("volume:/container/mount/point").unwrap(),
            ("volume".to_string(), "/container/mount/point".to_string())
        );
        assert_eq!(
            parse_volume("./bind_mount:/container/mount/point:rw").unwrap(),
            ("./bind_mount".to_string(), "/container/mount/point".to_string())
        );
        assert!(parse_volume("invalid_volume_string").is_err());
    }

    #[test]
    fn test_discover_compose_file() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("services").join("other_data").join("more_data");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(tmp.path().join("services").join("data")).unwrap();
        fs::write(nested.join("docker-compose.yaml"), "services: {}\n").unwrap();

        assert_eq!(discover_compose_file(tmp.path()).unwrap(), nested.join("docker-compose.yaml"));
    }

    #[test]
    fn test_discover_requires_exactly_one_file() {
        let tmp = TempDir::new().unwrap();
        let zero = tmp.path().join("zero_files");
        let two = tmp.path().join("two_files").join("data");
        fs::create_dir_all(&zero).unwrap();
        fs::create_dir_all(two.join("more_data")).unwrap();
        fs::write(two.join("docker-compose.yaml"), "").unwrap();
        fs::write(two.join("more_data").join("docker-compose.yml"), "").unwrap();

        assert!(discover_compose_file(&zero).is_err());
        assert!(discover_compose_file(&tmp.path().join("two_files")).is_err());
    }
}
