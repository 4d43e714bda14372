mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};

use backupbot::core::run_with_docker;
use backupbot::utils::{logger, AppConfig};
use cli::{Adapter, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    cli.apply_to(&mut config);

    logger::init(&config.log_level)?;
    debug!("backupbot {} with {:?}", cli::VERSION_WITH_BUILD, config);

    match cli.adapter {
        Adapter::DockerCompose => {
            let root = cli
                .root
                .canonicalize()
                .with_context(|| format!("Project root {} not found", cli.root.display()))?;

            let stats = run_with_docker(&root, &cli.destination, &cli.backup_config, &config)
                .await
                .map_err(|e| {
                    error!("Backup aborted: {}", e);
                    e
                })?;

            debug!("Run finished with {:?}", stats);
        }
    }

    Ok(())
}
