// Client profile rewrite and persistence

//! Client profile post-processing
//!
//! The exported profile tells the client to send all traffic through the
//! gateway. We only want the gateway's own subnet routed, so each
//! `redirect-gateway` line is swapped for a `route` line before the profile
//! is written to disk.

use crate::cidr::Subnet;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Directive that sends every client route through the tunnel
pub const FULL_TUNNEL_DIRECTIVE: &str = "redirect-gateway";

/// Extension of the written profile
pub const PROFILE_EXTENSION: &str = "ovpn";

fn is_full_tunnel_directive(line: &str) -> bool {
    line.split_whitespace().next() == Some(FULL_TUNNEL_DIRECTIVE)
}

/// Replace every full-tunnel directive with a route to `subnet`
///
/// Each replaced line keeps its own terminator (`\n`, `\r\n` or none at end
/// of input). All other bytes are passed through untouched.
pub fn rewrite_redirect_gateway(profile: &str, subnet: &Subnet) -> String {
    let route = subnet.route_directive();
    let mut out = String::with_capacity(profile.len());

    for line in profile.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        if is_full_tunnel_directive(body) {
            out.push_str(&route);
            out.push_str(&line[body.len()..]);
        } else {
            out.push_str(line);
        }
    }

    out
}

/// Write the profile as `<dir>/<name>.ovpn` and return its absolute path
pub fn write_profile(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let path = dir.join(format!("{}.{}", name, PROFILE_EXTENSION));
    fs::write(&path, contents)
        .with_context(|| format!("Failed to write client profile {}", path.display()))?;

    std::path::absolute(&path)
        .with_context(|| format!("Failed to resolve absolute path of {}", path.display()))
}

/// Operator instructions for importing the profile on this platform
pub fn import_instructions(path: &Path) -> Vec<String> {
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if cfg!(target_os = "windows") {
        vec![format!(
            "Import {} with \"OpenVPN GUI for Windows\" (Import file...)",
            file
        )]
    } else if cfg!(target_os = "macos") {
        vec![format!(
            "Run 'open ./{}' in its directory and Tunnelblick will import it",
            file
        )]
    } else {
        vec![
            format!("Connect with 'sudo openvpn --config {}'", path.display()),
            format!(
                "or import it with 'nmcli connection import type openvpn file {}'",
                path.display()
            ),
        ]
    }
}
