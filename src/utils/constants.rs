/// Names and defaults shared across the backup pipeline

/// Compose manifests recognised below the project root
pub const COMPOSE_FILE_NAMES: &[&str] = &["docker-compose.yaml", "docker-compose.yml"];

/// Name prefix of every helper container, e.g. `backupbot-20261017061500123456789-0`
pub const HELPER_CONTAINER_PREFIX: &str = "backupbot";

/// Scheme selection meaning "every bind mount / volume of the service"
pub const SELECT_ALL: &str = "all";

/// Image for tar-based helpers
pub const DEFAULT_HELPER_IMAGE: &str = "alpine:3";

/// Seconds docker waits before killing a container on stop
pub const DEFAULT_STOP_TIMEOUT_SECS: i64 = 10;

pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_EXEC_RETRY_INTERVAL_MS: u64 = 1000;
