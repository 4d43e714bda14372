/// System pause coordinator
///
/// Stops a compose system for the duration of a backup block and restarts
/// afterwards exactly the services that were running before.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{error, info};

use super::compose::ComposeService;
use super::error::Result;
use super::runtime::{ComposeControl, ContainerRuntime};

/// Observed state of the system before a pause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorState {
    /// Compose service names whose containers were running
    Running(Vec<String>),
    Stopped,
}

pub struct PauseCoordinator<'a, R, C> {
    runtime: &'a R,
    compose: &'a C,
}

impl<'a, R: ContainerRuntime, C: ComposeControl> PauseCoordinator<'a, R, C> {
    pub fn new(runtime: &'a R, compose: &'a C) -> Self {
        Self { runtime, compose }
    }

    pub async fn observe<'s, I>(&self, services: I) -> Result<PriorState>
    where
        I: IntoIterator<Item = &'s ComposeService>,
    {
        let running = self.runtime.running_container_names().await?;
        let was_running: Vec<String> = services
            .into_iter()
            .filter(|service| running.contains(&service.container_name))
            .map(|service| service.name.clone())
            .collect();

        Ok(if was_running.is_empty() {
            PriorState::Stopped
        } else {
            PriorState::Running(was_running)
        })
    }

    /// Run `block` with the system stopped.
    ///
    /// The restart happens on every exit path of `block`, errors and panics
    /// included. Stop and start failures are fatal and never retried.
    pub async fn with_paused_system<'s, I, F, Fut, T>(&self, services: I, block: F) -> Result<T>
    where
        I: IntoIterator<Item = &'s ComposeService>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let prior = self.observe(services).await?;
        info!("System state before backup: {:?}", prior);

        self.compose.stop().await?;
        info!("System stopped for backup");

        let outcome = AssertUnwindSafe(block()).catch_unwind().await;

        let restarted = match &prior {
            PriorState::Running(services) => {
                info!("Restarting {} service(s): {}", services.len(), services.join(", "));
                self.compose.start(services).await
            }
            PriorState::Stopped => {
                info!("System was stopped before backup, leaving it stopped");
                Ok(())
            }
        };

        match outcome {
            Ok(result) => {
                if let (Err(block_err), Err(_)) = (&result, &restarted) {
                    error!("Backup block failed before restart failure: {}", block_err);
                }
                restarted?;
                result
            }
            Err(panic) => {
                if let Err(e) = restarted {
                    error!("Restart after panic failed: {}", e);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
