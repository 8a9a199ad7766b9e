// Shared types between the orchestrators and the runtime layer

//! Shared data structures
//!
//! This module defines the records passed between components: the result of
//! an external command, a parsed network row, and the configuration
//! structures deserialized from TOML.

use serde::Deserialize;
use std::path::PathBuf;

/// Outcome of one external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Process exit code, -1 when the process was killed by a signal
    pub status: i32,
    /// Captured standard output, lossily decoded
    pub stdout: String,
    /// Captured standard error, lossily decoded
    pub stderr: String,
}

impl ExecutionResult {
    /// Build a result from raw process output
    pub fn from_output(output: &std::process::Output) -> Self {
        Self {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// True when the command exited with status 0
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// One row of the runtime's network listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    /// Full network id (first column)
    pub id: String,
    /// Network name (second column)
    pub name: String,
}

/// How a configured network name is matched against listed networks
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMatch {
    /// Name column must equal the configured name
    #[default]
    Exact,
    /// Any row whose text contains the configured name (legacy behavior,
    /// can pick the wrong network when names overlap)
    Substring,
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// `[general]` table
    #[serde(default)]
    pub general: GeneralConfig,
    /// `[gateway]` table
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process-level options
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Default env_logger filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound for any single external command, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    /// Directory the client profile is written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Container runtime client to invoke
    #[serde(default = "default_runtime_binary")]
    pub runtime_binary: String,
}

/// Gateway identity and OpenVPN server parameters
///
/// `container_name` and `volume_name` are the idempotency keys checked by
/// every guard in create and destroy.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// OpenVPN server image, used for the gateway and every one-shot job
    #[serde(default = "default_image")]
    pub image: String,
    /// Name of the long-running gateway container
    #[serde(default = "default_container_name")]
    pub container_name: String,
    /// Data volume holding the server config and PKI
    #[serde(default = "default_volume_name")]
    pub volume_name: String,
    /// Pre-existing network the gateway joins; the host reaches containers
    /// on it by IP
    #[serde(default = "default_network")]
    pub network: String,
    /// How `network` is matched against listed networks
    #[serde(default)]
    pub network_match: NetworkMatch,
    /// Public server URL baked into the generated config
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Host port published to the container's 1194/udp
    #[serde(default = "default_port")]
    pub port: u16,
    /// DNS server for the gateway container
    #[serde(default = "default_dns")]
    pub dns: String,
    /// Common name of the generated CA
    #[serde(default = "default_ca_common_name")]
    pub ca_common_name: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            command_timeout: default_command_timeout(),
            output_dir: default_output_dir(),
            runtime_binary: default_runtime_binary(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            container_name: default_container_name(),
            volume_name: default_volume_name(),
            network: default_network(),
            network_match: NetworkMatch::default(),
            server_url: default_server_url(),
            port: default_port(),
            dns: default_dns(),
            ca_common_name: default_ca_common_name(),
        }
    }
}

// Default values for configuration
fn default_log_level() -> String {
    "info".to_string()
}

fn default_command_timeout() -> u64 {
    600 // CA generation can take several minutes
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_runtime_binary() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "kylemanna/openvpn".to_string()
}

fn default_container_name() -> String {
    "haru_urara".to_string()
}

fn default_volume_name() -> String {
    "ovpn-data".to_string()
}

fn default_network() -> String {
    "yuuki.net".to_string()
}

fn default_server_url() -> String {
    "udp://localhost".to_string()
}

fn default_port() -> u16 {
    1194
}

fn default_dns() -> String {
    "8.8.8.8".to_string()
}

fn default_ca_common_name() -> String {
    "Default CA".to_string()
}
