/// Capabilities the backup core needs from the container platform
///
/// Implemented on Docker by [`crate::core::docker`]; tests use in-memory fakes.

use std::path::PathBuf;

use super::error::Result;

/// Mount point of the staging directory inside every helper container
pub const STAGING_MOUNT_POINT: &str = "/backup";

/// Description of one disposable helper container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperContainer {
    pub name: String,
    pub image: String,
    /// Shell command replacing the image's default command
    pub command: Option<String>,
    /// Host directory bound to [`STAGING_MOUNT_POINT`]
    pub staging_dir: PathBuf,
    /// Container whose volumes and mounts are reused
    pub volumes_from: String,
    /// Keep running in the background instead of waiting for exit
    pub detach: bool,
}

#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// Create and start the helper. Foreground helpers are awaited and a
    /// non-zero exit is an error.
    async fn run(&self, helper: &HelperContainer) -> Result<()>;

    /// Single attempt at running `command` inside a running container.
    async fn exec(&self, container: &str, command: &str) -> Result<()>;

    /// Stop and remove a container; errors for unknown containers included.
    async fn stop_and_remove(&self, container: &str) -> Result<()>;

    async fn running_container_names(&self) -> Result<Vec<String>>;
}

/// System control keyed by one compose manifest.
#[allow(async_fn_in_trait)]
pub trait ComposeControl {
    /// Stop every service of the manifest; a no-op for stopped services.
    async fn stop(&self) -> Result<()>;

    /// Start the named compose services.
    async fn start(&self, services: &[String]) -> Result<()>;
}
