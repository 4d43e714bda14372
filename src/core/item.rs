/// One unit of work for the execution engine

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::utils::file_suffix;

/// A single artifact to produce inside a helper container.
///
/// Identity is the destination `(output_file_name, final_directory)`; the
/// commands do not take part in equality.
#[derive(Debug, Clone)]
pub struct BackupItem {
    /// Replaces the helper's default command; the container runs to completion
    pub primary_command: Option<String>,
    /// Executed against the detached helper once it accepts commands
    pub post_start_command: Option<String>,
    pub output_file_name: String,
    pub final_directory: PathBuf,
}

impl BackupItem {
    pub fn with_command(
        command: impl Into<String>,
        output_file_name: impl Into<String>,
        final_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            primary_command: Some(command.into()),
            post_start_command: None,
            output_file_name: output_file_name.into(),
            final_directory: final_directory.into(),
        }
    }

    pub fn with_post_start(
        command: impl Into<String>,
        output_file_name: impl Into<String>,
        final_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            primary_command: None,
            post_start_command: Some(command.into()),
            output_file_name: output_file_name.into(),
            final_directory: final_directory.into(),
        }
    }

    pub fn final_path(&self) -> PathBuf {
        self.final_directory.join(&self.output_file_name)
    }

    pub fn staged_path(&self, staging_dir: &Path) -> PathBuf {
        staging_dir.join(&self.output_file_name)
    }

    /// Suffix used to rotate the final directory, e.g. `tar.gz`
    pub fn suffix(&self) -> &str {
        file_suffix(&self.output_file_name)
    }
}

impl PartialEq for BackupItem {
    fn eq(&self, other: &Self) -> bool {
        self.output_file_name == other.output_file_name && self.final_directory == other.final_directory
    }
}

impl Eq for BackupItem {}

impl Hash for BackupItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.output_file_name.hash(state);
        self.final_directory.hash(state);
    }
}
