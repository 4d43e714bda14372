//! backupbot: versioned backups of docker-compose systems
//!
//! Every backup artifact is produced by a disposable helper container attached
//! to the volumes of the service being backed up, while the compose system is
//! paused. Stored artifacts are renamed `name-<major>-<minor>.<suffix>` so that
//! the newest file of a directory always carries version 0.

pub mod core;
pub mod utils;
