pub mod error;
pub mod version;
pub mod rotation;
pub mod item;
pub mod runtime;
pub mod executor;
pub mod pause;
pub mod compose;
pub mod scheme;
pub mod docker;
pub mod backup;

pub use backup::{run_with_docker, BackupBot, BackupOptions, RunStats};
pub use docker::{ComposeCli, DockerRuntime};
pub use error::{BackupError, Result};
pub use executor::{ExecOptions, ExecutionEngine, StagingMapping};
pub use item::BackupItem;
pub use pause::{PauseCoordinator, PriorState};
pub use rotation::{update_version_numbers, VersionPattern};
pub use runtime::{ComposeControl, ContainerRuntime, HelperContainer};
pub use version::{Axis, Version};
