// Configuration file parser

//! Configuration file parsing and validation
//!
//! This module loads the optional TOML configuration file and validates the
//! names and parameters that end up on the docker command line.

use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::net::IpAddr;
use std::path::Path;

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

    let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

    validate_config(&config)?;
    Ok(config)
}

/// Load `path` when given, otherwise fall back to the built-in defaults
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = Config::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}

/// Validates a docker object name (container, volume, network).
/// Must start with an alphanumeric character and contain only alphanumerics,
/// underscores, periods and hyphens.
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        anyhow::bail!("{} cannot be empty", field_name);
    };

    if !first.is_ascii_alphanumeric() {
        anyhow::bail!(
            "{} must start with a letter or digit: '{}'",
            field_name,
            name
        );
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        anyhow::bail!(
            "{} contains invalid characters: '{}'. Only alphanumeric, underscores, periods and hyphens are allowed",
            field_name,
            name
        );
    }

    Ok(())
}

/// Validate configuration values
fn validate_config(config: &Config) -> Result<()> {
    let gateway = &config.gateway;

    validate_name(&gateway.container_name, "container_name")?;
    validate_name(&gateway.volume_name, "volume_name")?;
    validate_name(&gateway.network, "network")?;

    if gateway.image.is_empty() || gateway.image.chars().any(char::is_whitespace) {
        anyhow::bail!("image must be a non-empty reference without whitespace");
    }

    if gateway.server_url.is_empty() {
        anyhow::bail!("server_url cannot be empty");
    }

    if gateway.port == 0 {
        anyhow::bail!("port must be > 0");
    }

    gateway
        .dns
        .parse::<IpAddr>()
        .with_context(|| format!("Invalid dns address: {}", gateway.dns))?;

    if gateway.ca_common_name.trim().is_empty() {
        anyhow::bail!("ca_common_name cannot be empty");
    }

    if config.general.command_timeout == 0 {
        anyhow::bail!("command_timeout must be > 0");
    }

    if config.general.runtime_binary.is_empty() {
        anyhow::bail!("runtime_binary cannot be empty");
    }

    Ok(())
}
