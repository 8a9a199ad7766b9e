// Docker client verbs

//! Docker client verbs
//!
//! Thin typed wrappers over the docker CLI. Each method builds one argument
//! vector and hands it to the [`CommandExecutor`]; none of them decide
//! whether a failure is fatal. That policy belongs to the orchestrators.

use crate::error::GatewayError;
use crate::executor::CommandExecutor;
use crate::types::{ExecutionResult, GatewayConfig};
use anyhow::Result;

/// Mount point of the OpenVPN data volume inside the image
pub const OPENVPN_DIR: &str = "/etc/openvpn";

/// UDP port the OpenVPN server listens on inside the container
pub const OPENVPN_PORT: u16 = 1194;

/// Go template selecting the first IPAM subnet of a network
pub const FIRST_SUBNET_FORMAT: &str = "{{(index .IPAM.Config 0).Subnet}}";

/// One-shot `docker run --rm` against the data volume
pub struct OneShot<'a> {
    /// Volume mounted at the OpenVPN config directory
    pub volume: &'a str,
    /// Image to run
    pub image: &'a str,
    /// Environment variables passed with `-e`
    pub env: &'a [(&'a str, &'a str)],
    /// Command and arguments inside the container
    pub command: &'a [&'a str],
}

/// Docker client bound to an executor
pub struct DockerRuntime<E> {
    executor: E,
    binary: String,
}

impl<E: CommandExecutor> DockerRuntime<E> {
    /// Create a runtime that invokes `binary` (normally `docker`)
    pub fn new(executor: E, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<ExecutionResult> {
        self.executor.execute(&self.binary, args).await
    }

    /// Check that the client binary exists and runs
    pub async fn ensure_available(&self) -> Result<()> {
        let result = self.run(&["--version"]).await.map_err(|e| {
            GatewayError::RuntimeUnavailable {
                binary: self.binary.clone(),
                reason: format!("{:#}", e),
            }
        })?;

        if !result.success() {
            return Err(GatewayError::RuntimeUnavailable {
                binary: self.binary.clone(),
                reason: format!("exit status {}", result.status),
            }
            .into());
        }

        log::debug!("runtime: {}", result.stdout.trim());
        Ok(())
    }

    /// True when a container with this name exists, running or not
    pub async fn container_exists(&self, name: &str) -> Result<bool> {
        Ok(self.run(&["container", "inspect", name]).await?.success())
    }

    /// True when a volume with this name exists
    pub async fn volume_exists(&self, name: &str) -> Result<bool> {
        Ok(self.run(&["volume", "inspect", name]).await?.success())
    }

    /// Force-remove a container
    pub async fn remove_container(&self, name: &str) -> Result<ExecutionResult> {
        self.run(&["container", "rm", "-f", name]).await
    }

    /// Force-remove a volume
    pub async fn remove_volume(&self, name: &str) -> Result<ExecutionResult> {
        self.run(&["volume", "rm", "-f", name]).await
    }

    /// Create a named volume
    pub async fn create_volume(&self, name: &str) -> Result<ExecutionResult> {
        self.run(&["volume", "create", "--name", name]).await
    }

    /// Run a throwaway container with the data volume mounted
    pub async fn run_in_volume(&self, job: &OneShot<'_>) -> Result<ExecutionResult> {
        let mount = format!("{}:{}", job.volume, OPENVPN_DIR);
        let env: Vec<String> = job.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mut args = vec!["run", "-v", mount.as_str(), "--rm"];
        for pair in &env {
            args.extend(["-e", pair.as_str()]);
        }
        args.push(job.image);
        args.extend_from_slice(job.command);

        self.run(&args).await
    }

    /// Create (without starting) the long-running gateway container
    pub async fn create_gateway_container(
        &self,
        gateway: &GatewayConfig,
        network_id: &str,
    ) -> Result<ExecutionResult> {
        let mount = format!("{}:{}", gateway.volume_name, OPENVPN_DIR);
        let publish = format!("{}:{}/udp", gateway.port, OPENVPN_PORT);

        self.run(&[
            "create",
            "--dns",
            gateway.dns.as_str(),
            "--restart=always",
            "-v",
            mount.as_str(),
            "--name",
            gateway.container_name.as_str(),
            "-p",
            publish.as_str(),
            "--network",
            network_id,
            "--cap-add=NET_ADMIN",
            gateway.image.as_str(),
        ])
        .await
    }

    /// Start a created container
    pub async fn start_container(&self, name: &str) -> Result<ExecutionResult> {
        self.run(&["start", name]).await
    }

    /// `docker network ls` narrowed by the runtime's own name filter
    pub async fn list_networks(&self, name_filter: &str) -> Result<ExecutionResult> {
        let filter = format!("name={}", name_filter);
        self.run(&["network", "ls", "--no-trunc", "--filter", filter.as_str()])
            .await
    }

    /// First IPAM subnet of a network, as printed by the inspect template
    pub async fn inspect_first_subnet(&self, network: &str) -> Result<ExecutionResult> {
        self.run(&["network", "inspect", "--format", FIRST_SUBNET_FORMAT, network])
            .await
    }
}
