// Network name and subnet resolution

//! Network resolution
//!
//! Turns the configured network name into a runtime network id and looks up
//! the network's first IPAM subnet. The runtime's listing and inspect output
//! are treated as an unstable text format; all parsing of it lives in this
//! module.

use crate::cidr::Subnet;
use crate::executor::CommandExecutor;
use crate::runtime::DockerRuntime;
use crate::types::{NetworkDescriptor, NetworkMatch};
use anyhow::Result;

/// Parse `docker network ls` output
///
/// The first non-empty line is the column header and is skipped. Each
/// remaining row yields its first column as the id and its second as the
/// name. Rows with fewer than two columns are ignored.
pub fn parse_network_table(output: &str) -> Vec<NetworkDescriptor> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip(1)
        .filter_map(|row| {
            let mut cols = row.split_whitespace();
            let id = cols.next()?;
            let name = cols.next()?;
            Some(NetworkDescriptor {
                id: id.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Pick the first listed network matching `name` under the given policy
///
/// In substring mode the id is the first token of the first row containing
/// `name`, even when that row has no name column.
pub fn select_network(
    output: &str,
    rows: &[NetworkDescriptor],
    name: &str,
    mode: NetworkMatch,
) -> Option<NetworkDescriptor> {
    match mode {
        NetworkMatch::Exact => rows.iter().find(|net| net.name == name).cloned(),
        NetworkMatch::Substring => {
            // Legacy behavior: match on the whole row text, not the name column
            let matching_row = output
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .skip(1)
                .find(|row| row.contains(name))?;
            let mut cols = matching_row.split_whitespace();
            let id = cols.next()?;
            Some(NetworkDescriptor {
                id: id.to_string(),
                name: cols.next().unwrap_or(id).to_string(),
            })
        }
    }
}

/// Resolves network names and subnets through the runtime
pub struct NetworkResolver<'a, E> {
    docker: &'a DockerRuntime<E>,
    mode: NetworkMatch,
}

impl<'a, E: CommandExecutor> NetworkResolver<'a, E> {
    /// Create a resolver using `mode` for name matching
    pub fn new(docker: &'a DockerRuntime<E>, mode: NetworkMatch) -> Self {
        Self { docker, mode }
    }

    /// Id of the network called `name`, or `None` if no listed network matches
    pub async fn resolve_network_id(&self, name: &str) -> Result<Option<String>> {
        let result = self.docker.list_networks(name).await?;
        if !result.success() {
            log::warn!(
                "Listing networks failed ({}): {}",
                result.status,
                result.stderr.trim()
            );
            return Ok(None);
        }

        let rows = parse_network_table(&result.stdout);
        let found = select_network(&result.stdout, &rows, name, self.mode);

        match found {
            Some(net) => {
                if net.name != name {
                    log::warn!(
                        "Network {} matched {} by substring; set network_match = \"exact\" to avoid this",
                        net.name,
                        name
                    );
                }
                log::debug!("Resolved network {} to {}", name, net.id);
                Ok(Some(net.id))
            }
            None => Ok(None),
        }
    }

    /// First IPv4 IPAM subnet of network `id`
    ///
    /// Returns `None` when the network has no IPAM config, the id is invalid,
    /// or the subnet is not IPv4.
    pub async fn resolve_subnet(&self, id: &str) -> Result<Option<Subnet>> {
        let result = self.docker.inspect_first_subnet(id).await?;
        if !result.success() {
            log::debug!(
                "No IPAM subnet for {} ({}): {}",
                id,
                result.status,
                result.stderr.trim()
            );
            return Ok(None);
        }

        let line = result.stdout.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(None);
        }

        match line.parse::<Subnet>() {
            Ok(subnet) => Ok(Some(subnet)),
            Err(e) => {
                log::warn!("Ignoring unusable subnet {:?} of {}: {:#}", line, id, e);
                Ok(None)
            }
        }
    }
}
