// Gateway teardown

//! Gateway teardown (destroy)
//!
//! Removes the gateway container and its data volume. The container is the
//! idempotency key: if it does not exist, nothing is touched and the run
//! fails with [`GatewayError::NothingToDestroy`].

use crate::error::GatewayError;
use crate::executor::{ensure_success, CommandExecutor};
use crate::runtime::DockerRuntime;
use crate::types::Config;
use anyhow::Result;

/// Sequences the destroy workflow against one runtime and configuration
pub struct Teardown<'a, E> {
    docker: &'a DockerRuntime<E>,
    config: &'a Config,
}

impl<'a, E: CommandExecutor> Teardown<'a, E> {
    /// Bind a teardown to a runtime and configuration
    pub fn new(docker: &'a DockerRuntime<E>, config: &'a Config) -> Self {
        Self { docker, config }
    }

    /// Remove the gateway container and volume
    pub async fn destroy(&self) -> Result<()> {
        let gateway = &self.config.gateway;

        if !self.docker.container_exists(&gateway.container_name).await? {
            return Err(GatewayError::NothingToDestroy {
                name: gateway.container_name.clone(),
            }
            .into());
        }

        log::info!(
            "Removing container {} and volume {} ...",
            gateway.container_name,
            gateway.volume_name
        );

        // Fails while the container still holds the volume; retried below
        let removed = self.docker.remove_volume(&gateway.volume_name).await?;
        if !removed.success() {
            log::debug!(
                "Volume {} not removed yet: {}",
                gateway.volume_name,
                removed.stderr.trim()
            );
        }

        ensure_success(
            format!("Removing container {}", gateway.container_name),
            self.docker.remove_container(&gateway.container_name).await?,
        )?;

        if self.docker.volume_exists(&gateway.volume_name).await? {
            ensure_success(
                format!("Removing volume {}", gateway.volume_name),
                self.docker.remove_volume(&gateway.volume_name).await?,
            )?;
        }

        log::info!("Gateway {} destroyed", gateway.container_name);
        Ok(())
    }
}
