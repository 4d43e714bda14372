/// CLI argument parsing

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use backupbot::utils::AppConfig;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

/// Container platform adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Adapter {
    DockerCompose,
}

#[derive(Parser, Debug)]
#[command(name = "backupbot")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Adapter for the container platform
    #[arg(value_enum)]
    pub adapter: Adapter,

    /// Directory receiving the versioned backups
    pub destination: PathBuf,

    /// Backup scheme (JSON) describing what to back up per service
    pub backup_config: PathBuf,

    /// Project root searched for the docker-compose file
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Config file (default: ~/.config/backupbot/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Rotate the major version instead of the minor one
    #[arg(long)]
    pub major: bool,

    /// How long a started helper may take to accept commands, in whole seconds (e.g. "90s", "2m")
    #[arg(long, value_parser = parse_exec_timeout)]
    pub exec_timeout: Option<Duration>,

    /// Image for tar-based helper containers
    #[arg(long)]
    pub helper_image: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

/// Exec timeouts are stored in whole seconds; anything finer is rejected
/// instead of being truncated.
fn parse_exec_timeout(value: &str) -> Result<Duration, String> {
    let timeout = humantime::parse_duration(value).map_err(|e| e.to_string())?;

    if timeout.as_secs() == 0 || timeout.subsec_nanos() != 0 {
        return Err(format!("'{}' is not a whole number of seconds (at least 1s)", value));
    }

    Ok(timeout)
}

impl Cli {
    /// Overlay the command line options onto `config`.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if self.major {
            config.update_major = true;
        }
        if let Some(timeout) = self.exec_timeout {
            config.exec_timeout_secs = timeout.as_secs();
        }
        if let Some(image) = &self.helper_image {
            config.helper_image = image.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}
