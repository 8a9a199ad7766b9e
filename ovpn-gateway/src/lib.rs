// OpenVPN Gateway Provisioning Library
// Shared modules for the CLI and tests

#![warn(missing_docs)]

//! OpenVPN Gateway Provisioning Library
//!
//! This library stands up a single OpenVPN server container on an existing
//! Docker network, exports a client profile routed to that network only, and
//! tears the gateway down again.
//!
//! # Main Components
//!
//! - [`cidr`]: Subnet parsing and prefix-to-netmask conversion
//! - [`config`]: Configuration file parsing and validation
//! - [`executor`]: External command execution with timeouts
//! - [`network`]: Network id and subnet resolution
//! - [`profile`]: Client profile rewrite and persistence
//! - [`provision`]: The create workflow
//! - [`runtime`]: Typed docker client verbs
//! - [`teardown`]: The destroy workflow
//! - [`types`]: Shared data structures

pub mod cidr;
pub mod config;
pub mod error;
pub mod executor;
pub mod network;
pub mod profile;
pub mod provision;
pub mod runtime;
pub mod teardown;
pub mod types;

pub use error::GatewayError;
