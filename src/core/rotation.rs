/// Version rotation for backup artifacts
///
/// Keeps the files of one directory densely numbered by age: the newest file
/// gets version 0 on the rotating axis, the oldest gets `count - 1`. Running a
/// rotation again on an unchanged directory produces the same names.

use regex::Regex;
use std::cmp::Reverse;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use super::error::{BackupError, Result};
use super::version::{Axis, Version};

/// Default pattern: `name-<major>-<minor>.<suffix>`
pub const DEFAULT_VERSION_PATTERN: &str = r"-(\d+)-(\d+)\.";

/// Matcher for versions embedded in file names.
///
/// The regex must have exactly two capture groups, major and minor.
#[derive(Debug, Clone)]
pub struct VersionPattern {
    regex: Regex,
}

struct EmbeddedVersion {
    version: Version,
    major: Range<usize>,
    minor: Range<usize>,
}

impl VersionPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| BackupError::Config(format!("invalid version pattern '{}': {}", pattern, e)))?;

        // captures_len counts the implicit whole-match group
        if regex.captures_len() != 3 {
            return Err(BackupError::Config(format!(
                "version pattern '{}' must have exactly two capture groups",
                pattern
            )));
        }

        Ok(Self { regex })
    }

    /// Version embedded in `file_name`, taken from the rightmost match.
    pub fn version_of(&self, file_name: &str) -> Option<Version> {
        self.find(file_name).map(|embedded| embedded.version)
    }

    fn find(&self, file_name: &str) -> Option<EmbeddedVersion> {
        let caps = self.regex.captures_iter(file_name).last()?;
        let major = caps.get(1)?;
        let minor = caps.get(2)?;

        Some(EmbeddedVersion {
            version: Version::new(major.as_str().parse().ok()?, minor.as_str().parse().ok()?),
            major: major.range(),
            minor: minor.range(),
        })
    }

    /// File name carrying `version`: substituted in place when the name is
    /// already versioned, appended before `.<suffix>` otherwise.
    pub fn stamp(&self, file_name: &str, suffix: &str, version: Version) -> String {
        match self.find(file_name) {
            Some(embedded) => format!(
                "{}{}{}{}{}",
                &file_name[..embedded.major.start],
                version.major,
                &file_name[embedded.major.end..embedded.minor.start],
                version.minor,
                &file_name[embedded.minor.end..],
            ),
            None => {
                let ending = format!(".{}", suffix);
                match file_name.strip_suffix(&ending) {
                    Some(base) => format!("{}-{}{}", base, version, ending),
                    None => format!("{}-{}", file_name, version),
                }
            }
        }
    }
}

impl Default for VersionPattern {
    fn default() -> Self {
        Self {
            regex: Regex::new(DEFAULT_VERSION_PATTERN).expect("default version pattern is valid"),
        }
    }
}

/// A file taking part in a rotation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedFile {
    pub path: PathBuf,
    /// `None` for files created since the last rotation
    pub version: Option<Version>,
    pub created: SystemTime,
}

impl VersionedFile {
    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Rotate all `*.<suffix>` files in `directory` and rename them on disk.
///
/// Returns the applied `(old, new)` pairs, oldest file first. Renames are not
/// transactional: on failure the already applied renames stay in place (files
/// parked as `.<name>.rotating` included) and are not rolled back.
pub fn update_version_numbers(
    directory: &Path,
    suffix: &str,
    pattern: &VersionPattern,
    axis: Axis,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    let files = list_versioned_files(directory, suffix, pattern)?;
    let plan = create_target_names(&files, suffix, pattern, axis)?;

    let moves: Vec<&(PathBuf, PathBuf)> = plan.iter().filter(|(old, new)| old != new).collect();

    // A target may only be occupied by a file that moves away in this pass.
    for (old, new) in &moves {
        if new.exists() && !moves.iter().any(|(src, _)| src == new) {
            return Err(BackupError::RenameConflict {
                from: old.clone(),
                to: new.clone(),
            });
        }
    }

    // Two phases so that gaps and out-of-order numbers never overwrite a file.
    let mut parked = Vec::with_capacity(moves.len());
    for (old, new) in &moves {
        let temp = parking_name(old);
        fs::rename(old, &temp)?;
        parked.push((temp, new));
    }
    for ((temp, new), (old, _)) in parked.iter().zip(&moves) {
        debug!("Renaming {} -> {}", old.display(), new.display());
        fs::rename(temp, new)?;
    }

    info!(
        "Rotated {} file(s) in {} ({} renamed)",
        plan.len(),
        directory.display(),
        plan.iter().filter(|(old, new)| old != new).count()
    );

    Ok(plan)
}

fn parking_name(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.rotating", name))
}

/// Files in `directory` ending in `.<suffix>`, sorted oldest first.
///
/// Ties in creation time are broken by embedded version (higher is older),
/// unversioned files count as newest.
pub fn list_versioned_files(
    directory: &Path,
    suffix: &str,
    pattern: &VersionPattern,
) -> Result<Vec<VersionedFile>> {
    if !directory.is_dir() {
        return Err(BackupError::InvalidDirectory {
            path: directory.to_path_buf(),
            reason: "folder does not exist".to_string(),
        });
    }

    let ending = format!(".{}", suffix);
    let mut files = Vec::new();

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(&ending) {
            continue;
        }

        // not every filesystem records a birth time
        let created = metadata.created().or_else(|_| metadata.modified())?;

        files.push(VersionedFile {
            version: pattern.version_of(&name),
            path: entry.path(),
            created,
        });
    }

    files.sort_by(|a, b| {
        (a.created, Reverse(a.version), a.file_name()).cmp(&(b.created, Reverse(b.version), b.file_name()))
    });

    Ok(files)
}

/// Highest embedded version among `files`.
pub fn max_version(files: &[VersionedFile]) -> Option<Version> {
    files.iter().filter_map(|f| f.version).max()
}

/// Plan the renames for `files` (sorted oldest first) without touching disk.
pub fn create_target_names(
    files: &[VersionedFile],
    suffix: &str,
    pattern: &VersionPattern,
    axis: Axis,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let mut version = max_version(files).unwrap_or_default();
    version.set(axis, (files.len() - 1) as u32);

    let mut plan = Vec::with_capacity(files.len());
    for (i, file) in files.iter().enumerate() {
        let target = pattern.stamp(&file.file_name(), suffix, version);
        let parent = file.path.parent().unwrap_or_else(|| Path::new(""));
        plan.push((file.path.clone(), parent.join(target)));

        if i + 1 < files.len() {
            version.decrease(axis)?;
        }
    }

    Ok(plan)
}
