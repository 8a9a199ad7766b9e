//! Classified fatal errors
//!
//! Everything else travels as a plain `anyhow::Error` with context; these
//! variants exist so callers can tell the operator-relevant cases apart with
//! `downcast_ref`.

use std::time::Duration;
use thiserror::Error;

/// Fatal outcomes the operator needs to tell apart
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The runtime client is missing or fails `--version`
    #[error("{binary} client not found or not working ({reason}). Please check $PATH or install it")]
    RuntimeUnavailable {
        /// Client binary that was invoked
        binary: String,
        /// Spawn error or exit status
        reason: String,
    },

    /// Create without `--force` found the reserved container
    #[error("container {name} already exists, refusing to overwrite it (use --force)")]
    ContainerExists {
        /// Container name
        name: String,
    },

    /// No listed network matches the configured name
    #[error("no such network: {name}")]
    NetworkNotFound {
        /// Configured network name
        name: String,
    },

    /// The network has no usable IPv4 subnet
    #[error("network {network} has no IPv4 IPAM subnet")]
    SubnetNotFound {
        /// Network id
        network: String,
    },

    /// A mutating runtime command exited nonzero
    #[error("{step} failed with status {status}: {stderr}")]
    StepFailed {
        /// Operator-facing step label
        step: String,
        /// Exit status
        status: i32,
        /// Trimmed standard error
        stderr: String,
    },

    /// Destroy found no gateway container
    #[error("no container named {name} exists, nothing to destroy")]
    NothingToDestroy {
        /// Container name
        name: String,
    },

    /// A command outlived the configured timeout and was killed
    #[error("`{command}` did not finish within {}s", .limit.as_secs())]
    Timeout {
        /// Command line that timed out
        command: String,
        /// Configured limit
        limit: Duration,
    },

    /// CIDR prefix length above 32
    #[error("prefix length {0} is outside 0..=32")]
    InvalidPrefix(u8),
}
