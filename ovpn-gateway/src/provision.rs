// Gateway provisioning

//! Gateway provisioning (create)
//!
//! Runs the create sequence one step at a time. Best-effort steps only exist
//! to reach a known-absent state and ignore their failures; every other step
//! aborts the run on a nonzero status. Nothing is rolled back: whatever was
//! created before a failure stays in place so a forced retry can replace it.

use crate::cidr::Subnet;
use crate::error::GatewayError;
use crate::executor::{ensure_success, CommandExecutor};
use crate::network::NetworkResolver;
use crate::profile;
use crate::runtime::{DockerRuntime, OneShot};
use crate::types::{Config, ExecutionResult};
use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

/// Steps of the create sequence, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    /// Guard on the reserved container name
    CheckExisting,
    /// Abort early if the target network is missing
    CheckNetwork,
    /// Drop any stale volume and create a fresh one
    ResetVolume,
    /// `ovpn_genconfig`
    GenerateServerConfig,
    /// `ovpn_initpki`
    GenerateCa,
    /// `easyrsa build-client-full`
    GenerateClientCert,
    /// Network id and first IPv4 subnet
    ResolveNetwork,
    /// Create the gateway container on the resolved network
    CreateContainer,
    /// Start the gateway container
    StartContainer,
    /// `ovpn_getclient`
    ExportProfile,
    /// Replace full-tunnel directives with a subnet route
    RewriteProfile,
    /// Persist the profile to the output directory
    WriteProfile,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProvisionStep::CheckExisting => "Checking for an existing gateway",
            ProvisionStep::CheckNetwork => "Checking target network",
            ProvisionStep::ResetVolume => "Creating docker volume",
            ProvisionStep::GenerateServerConfig => "Initializing vpn config",
            ProvisionStep::GenerateCa => "Creating CA (may take some time)",
            ProvisionStep::GenerateClientCert => "Creating client certificate",
            ProvisionStep::ResolveNetwork => "Resolving network and subnet",
            ProvisionStep::CreateContainer => "Creating OpenVPN server container",
            ProvisionStep::StartContainer => "Starting OpenVPN server container",
            ProvisionStep::ExportProfile => "Exporting client profile",
            ProvisionStep::RewriteProfile => "Scoping client routes to the gateway subnet",
            ProvisionStep::WriteProfile => "Writing client profile",
        };
        f.write_str(label)
    }
}

/// What a successful create produced
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    /// Absolute path of the written client profile
    pub profile_path: PathBuf,
    /// Id of the network the gateway joined
    pub network_id: String,
    /// Subnet routed through the gateway
    pub subnet: Subnet,
}

/// Sequences the create workflow against one runtime and configuration
pub struct Provisioner<'a, E> {
    docker: &'a DockerRuntime<E>,
    config: &'a Config,
}

impl<'a, E: CommandExecutor> Provisioner<'a, E> {
    /// Bind a provisioner to a runtime and configuration
    pub fn new(docker: &'a DockerRuntime<E>, config: &'a Config) -> Self {
        Self { docker, config }
    }

    fn begin(&self, step: ProvisionStep) -> ProvisionStep {
        log::info!("{} ...", step);
        step
    }

    /// Stand up the gateway and export its client profile
    ///
    /// With `force`, an existing gateway container is removed first;
    /// without it, an existing container aborts the run untouched.
    pub async fn create(&self, force: bool) -> Result<ProvisionReport> {
        let gateway = &self.config.gateway;
        let resolver = NetworkResolver::new(self.docker, gateway.network_match);

        // Idempotency guard
        self.begin(ProvisionStep::CheckExisting);
        if self.docker.container_exists(&gateway.container_name).await? {
            if !force {
                return Err(GatewayError::ContainerExists {
                    name: gateway.container_name.clone(),
                }
                .into());
            }
            log::info!("Removing existing container {} ...", gateway.container_name);
            let removed = self.docker.remove_container(&gateway.container_name).await?;
            if !removed.success() {
                log::debug!(
                    "Ignoring failed removal of {}: {}",
                    gateway.container_name,
                    removed.stderr.trim()
                );
            }
        }

        // Must pass before anything touches the volume
        self.begin(ProvisionStep::CheckNetwork);
        if resolver.resolve_network_id(&gateway.network).await?.is_none() {
            return Err(GatewayError::NetworkNotFound {
                name: gateway.network.clone(),
            }
            .into());
        }

        let step = self.begin(ProvisionStep::ResetVolume);
        let removed = self.docker.remove_volume(&gateway.volume_name).await?;
        if !removed.success() {
            log::debug!(
                "Ignoring failed removal of volume {}: {}",
                gateway.volume_name,
                removed.stderr.trim()
            );
        }
        ensure_success(step, self.docker.create_volume(&gateway.volume_name).await?)?;

        let step = self.begin(ProvisionStep::GenerateServerConfig);
        self.run_in_volume(
            step,
            &[],
            &["ovpn_genconfig", "-b", "-u", gateway.server_url.as_str()],
        )
        .await?;

        let step = self.begin(ProvisionStep::GenerateCa);
        self.run_in_volume(
            step,
            &[
                ("EASYRSA_BATCH", "1"),
                ("EASYRSA_REQ_CN", gateway.ca_common_name.as_str()),
            ],
            &["ovpn_initpki", "nopass"],
        )
        .await?;

        let step = self.begin(ProvisionStep::GenerateClientCert);
        self.run_in_volume(
            step,
            &[("EASYRSA_BATCH", "1")],
            &[
                "easyrsa",
                "build-client-full",
                gateway.container_name.as_str(),
                "nopass",
            ],
        )
        .await?;

        self.begin(ProvisionStep::ResolveNetwork);
        let network_id = resolver
            .resolve_network_id(&gateway.network)
            .await?
            .ok_or_else(|| GatewayError::NetworkNotFound {
                name: gateway.network.clone(),
            })?;
        let subnet = resolver
            .resolve_subnet(&network_id)
            .await?
            .ok_or_else(|| GatewayError::SubnetNotFound {
                network: gateway.network.clone(),
            })?;
        log::info!("Gateway subnet is {} ({})", subnet, subnet.netmask());

        let step = self.begin(ProvisionStep::CreateContainer);
        ensure_success(
            step,
            self.docker
                .create_gateway_container(gateway, &network_id)
                .await?,
        )?;

        let step = self.begin(ProvisionStep::StartContainer);
        ensure_success(
            step,
            self.docker.start_container(&gateway.container_name).await?,
        )?;

        let step = self.begin(ProvisionStep::ExportProfile);
        let exported = self
            .run_in_volume(
                step,
                &[],
                &["ovpn_getclient", gateway.container_name.as_str()],
            )
            .await?;

        self.begin(ProvisionStep::RewriteProfile);
        let scoped = profile::rewrite_redirect_gateway(&exported.stdout, &subnet);

        self.begin(ProvisionStep::WriteProfile);
        let profile_path = profile::write_profile(
            &self.config.general.output_dir,
            &gateway.container_name,
            &scoped,
        )?;

        Ok(ProvisionReport {
            profile_path,
            network_id,
            subnet,
        })
    }

    async fn run_in_volume(
        &self,
        step: ProvisionStep,
        env: &[(&str, &str)],
        command: &[&str],
    ) -> Result<ExecutionResult> {
        let gateway = &self.config.gateway;
        let result = self
            .docker
            .run_in_volume(&OneShot {
                volume: &gateway.volume_name,
                image: &gateway.image,
                env,
                command,
            })
            .await?;
        ensure_success(step, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    const NETWORKS: &str = "\
NETWORK ID   NAME        DRIVER    SCOPE
net0001      bridge      bridge    local
net0002      yuuki.net   bridge    local
";

    /// Answers by matching argument prefixes, later rules overriding earlier
    /// ones; unmatched calls succeed with empty output
    #[derive(Clone, Default)]
    struct Scripted {
        calls: Arc<Mutex<Vec<String>>>,
        rules: Vec<(&'static str, i32, &'static str)>,
    }

    impl Scripted {
        fn on(mut self, prefix: &'static str, status: i32, stdout: &'static str) -> Self {
            self.rules.push((prefix, status, stdout));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for Scripted {
        async fn execute(&self, _program: &str, args: &[&str]) -> Result<ExecutionResult> {
            let line = args.join(" ");
            self.calls.lock().unwrap().push(line.clone());
            let (status, stdout) = self
                .rules
                .iter()
                .rev()
                .find(|(prefix, _, _)| line.starts_with(prefix))
                .map(|(_, status, stdout)| (*status, stdout.to_string()))
                .unwrap_or((0, String::new()));
            Ok(ExecutionResult {
                status,
                stdout,
                stderr: if status == 0 { String::new() } else { "boom".to_string() },
            })
        }
    }

    fn healthy() -> Scripted {
        Scripted::default()
            .on("container inspect", 1, "")
            .on("network ls", 0, NETWORKS)
            .on("network inspect", 0, "172.20.0.0/16\n")
            .on(
                "run -v ovpn-data:/etc/openvpn --rm kylemanna/openvpn ovpn_getclient",
                0,
                "client\nredirect-gateway def1\nremote localhost 1194 udp\n",
            )
    }

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.general.output_dir = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_create_clean_runs_full_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let exec = healthy();
        let docker = DockerRuntime::new(exec.clone(), "docker");

        let report = Provisioner::new(&docker, &config).create(false).await.unwrap();

        assert_eq!(report.network_id, "net0002");
        assert_eq!(report.subnet.to_string(), "172.20.0.0/16");
        assert!(report.profile_path.ends_with("haru_urara.ovpn"));
        assert_eq!(
            std::fs::read_to_string(&report.profile_path).unwrap(),
            "client\nroute 172.20.0.0 255.255.0.0\nremote localhost 1194 udp\n"
        );

        let calls = exec.calls();
        let order: Vec<&str> = [
            "container inspect haru_urara",
            "network ls",
            "volume rm -f ovpn-data",
            "volume create --name ovpn-data",
            "ovpn_genconfig -b -u udp://localhost",
            "ovpn_initpki nopass",
            "easyrsa build-client-full haru_urara nopass",
            "network inspect",
            "create --dns 8.8.8.8",
            "start haru_urara",
            "ovpn_getclient haru_urara",
        ]
        .to_vec();
        let mut cursor = 0;
        for needle in order {
            let pos = calls[cursor..]
                .iter()
                .position(|c| c.contains(needle))
                .unwrap_or_else(|| panic!("{} missing or out of order in {:?}", needle, calls));
            cursor += pos + 1;
        }
        assert!(!calls.iter().any(|c| c.starts_with("container rm")));
    }

    #[tokio::test]
    async fn test_create_existing_without_force_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let exec = healthy().on("container inspect", 0, "[{}]");
        let docker = DockerRuntime::new(exec.clone(), "docker");

        let err = Provisioner::new(&docker, &config)
            .create(false)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<GatewayError>(),
            Some(GatewayError::ContainerExists { .. })
        ));
        assert_eq!(exec.calls(), vec!["container inspect haru_urara"]);
    }

    #[tokio::test]
    async fn test_create_force_ignores_failed_removal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let exec = Scripted::default()
            .on("container inspect", 0, "[{}]")
            .on("container rm", 1, "")
            .on("volume rm", 1, "")
            .on("network ls", 0, NETWORKS)
            .on("network inspect", 0, "172.20.0.0/16\n");
        let docker = DockerRuntime::new(exec.clone(), "docker");

        Provisioner::new(&docker, &config).create(true).await.unwrap();

        let calls = exec.calls();
        assert_eq!(calls[1], "container rm -f haru_urara");
        assert!(calls.iter().any(|c| c.starts_with("start haru_urara")));
    }

    #[tokio::test]
    async fn test_create_missing_network_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.gateway.network = "nope".to_string();
        let exec = healthy();
        let docker = DockerRuntime::new(exec.clone(), "docker");

        let err = Provisioner::new(&docker, &config)
            .create(false)
            .await
            .unwrap_err();

        match err.downcast_ref::<GatewayError>() {
            Some(GatewayError::NetworkNotFound { name }) => assert_eq!(name, "nope"),
            other => panic!("unexpected error: {:?}", other),
        }
        let calls = exec.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| !c.contains("volume") && !c.starts_with("run")));
    }

    #[tokio::test]
    async fn test_create_aborts_on_first_fatal_step() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let exec = Scripted::default()
            .on("run -v ovpn-data:/etc/openvpn --rm -e EASYRSA_BATCH=1 -e EASYRSA_REQ_CN", 2, "")
            .on("container inspect", 1, "")
            .on("network ls", 0, NETWORKS);
        let docker = DockerRuntime::new(exec.clone(), "docker");

        let err = Provisioner::new(&docker, &config)
            .create(false)
            .await
            .unwrap_err();

        match err.downcast_ref::<GatewayError>() {
            Some(GatewayError::StepFailed { step, status, .. }) => {
                assert_eq!(step, &ProvisionStep::GenerateCa.to_string());
                assert_eq!(*status, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let calls = exec.calls();
        assert!(calls.last().unwrap().contains("ovpn_initpki"));
        assert!(!calls.iter().any(|c| c.contains("build-client-full")));
        assert!(!dir.path().join("haru_urara.ovpn").exists());
    }

    #[tokio::test]
    async fn test_create_volume_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let exec = Scripted::default()
            .on("container inspect", 1, "")
            .on("network ls", 0, NETWORKS)
            .on("volume create", 1, "");
        let docker = DockerRuntime::new(exec.clone(), "docker");

        let err = Provisioner::new(&docker, &config)
            .create(false)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<GatewayError>(),
            Some(GatewayError::StepFailed { .. })
        ));
        assert_eq!(exec.calls().last().unwrap(), "volume create --name ovpn-data");
    }

    #[tokio::test]
    async fn test_create_without_subnet_fails_before_container() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let exec = Scripted::default()
            .on("container inspect", 1, "")
            .on("network ls", 0, NETWORKS)
            .on("network inspect", 1, "");
        let docker = DockerRuntime::new(exec.clone(), "docker");

        let err = Provisioner::new(&docker, &config)
            .create(false)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<GatewayError>(),
            Some(GatewayError::SubnetNotFound { .. })
        ));
        assert!(!exec.calls().iter().any(|c| c.starts_with("create")));
    }

    #[test]
    fn test_step_labels() {
        assert_eq!(ProvisionStep::ResetVolume.to_string(), "Creating docker volume");
        assert_eq!(
            ProvisionStep::GenerateCa.to_string(),
            "Creating CA (may take some time)"
        );
    }
}
