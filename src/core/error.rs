/// Error kinds raised by the backup core
///
/// Per-item kinds (runtime, timeout, collision) are recovered by the caller and
/// counted; everything else aborts the run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid directory '{}': {reason}", path.display())]
    InvalidDirectory { path: PathBuf, reason: String },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Container runtime error: {0}")]
    ContainerRuntime(String),

    #[error("Timed out after {:?} waiting for '{container}' to accept exec commands", elapsed)]
    Timeout { container: String, elapsed: Duration },

    #[error("Destination collision at '{}'", path.display())]
    DestinationCollision { path: PathBuf },

    #[error("docker compose {command} failed: {message}")]
    ManifestCommand { command: String, message: String },

    #[error("Refusing to rename '{}' onto existing file '{}'", from.display(), to.display())]
    RenameConflict { from: PathBuf, to: PathBuf },

    #[error("Compose manifest error: {0}")]
    Manifest(String),

    #[error("Backup scheme error: {0}")]
    Scheme(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Whether the error must abort the whole run instead of a single item.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BackupError::ContainerRuntime(_)
                | BackupError::Timeout { .. }
                | BackupError::DestinationCollision { .. }
        )
    }
}

impl From<bollard::errors::Error> for BackupError {
    fn from(err: bollard::errors::Error) -> Self {
        BackupError::ContainerRuntime(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!BackupError::ContainerRuntime("boom".into()).is_fatal());
        assert!(!BackupError::DestinationCollision { path: PathBuf::from("/a") }.is_fatal());
        assert!(!BackupError::Timeout {
            container: "c".into(),
            elapsed: Duration::from_secs(1),
        }
        .is_fatal());

        assert!(BackupError::InvalidVersion("0-0".into()).is_fatal());
        assert!(BackupError::ManifestCommand {
            command: "stop".into(),
            message: "exit 1".into(),
        }
        .is_fatal());
    }
}
