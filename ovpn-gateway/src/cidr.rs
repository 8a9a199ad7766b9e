// CIDR helpers

//! Subnet parsing and prefix-length to netmask conversion
//!
//! The runtime reports a network's subnet as `<address>/<prefix>`. OpenVPN's
//! `route` directive wants the dotted netmask instead, so both directions
//! live here.

use crate::error::GatewayError;
use anyhow::{Context, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Convert a prefix length into a dotted-decimal netmask
///
/// Each octet takes up to 8 of the remaining bits and becomes
/// `256 - 2^(8 - n)`.
pub fn prefix_to_netmask(prefix_len: u8) -> Result<Ipv4Addr> {
    if prefix_len > 32 {
        return Err(GatewayError::InvalidPrefix(prefix_len).into());
    }

    let mut remaining = prefix_len as u32;
    let mut octets = [0u8; 4];
    for octet in octets.iter_mut() {
        let n = remaining.min(8);
        *octet = (256 - (1u32 << (8 - n))) as u8;
        remaining -= n;
    }

    Ok(Ipv4Addr::from(octets))
}

/// An IPv4 subnet in CIDR form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    /// Network address
    pub address: Ipv4Addr,
    /// Prefix length, 0..=32
    pub prefix_len: u8,
}

impl Subnet {
    /// Dotted netmask for this subnet's prefix
    pub fn netmask(&self) -> Ipv4Addr {
        // prefix_len is bounded at construction
        prefix_to_netmask(self.prefix_len).unwrap_or(Ipv4Addr::BROADCAST)
    }

    /// OpenVPN directive that routes only this subnet through the tunnel
    pub fn route_directive(&self) -> String {
        format!("route {} {}", self.address, self.netmask())
    }
}

impl FromStr for Subnet {
    type Err = anyhow::Error;

    /// Parse `X.X.X.X/N`, surrounding whitespace allowed
    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .context("Invalid CIDR format (expected X.X.X.X/N)")?;

        let address: Ipv4Addr = addr.parse().context("Invalid IP address")?;
        let prefix_len: u8 = prefix.parse().context("Invalid prefix length")?;

        if prefix_len > 32 {
            return Err(GatewayError::InvalidPrefix(prefix_len).into());
        }

        Ok(Self {
            address,
            prefix_len,
        })
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}
