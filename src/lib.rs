//! k3strap: bootstrap a k3s cluster over SSH with a pluggable CNI
//!
//! The binary is a thin wrapper over [`commands::bootstrap`]; the pieces it
//! wires together are usable on their own:
//!
//! - [`config`]: load and validate the cluster YAML
//! - [`services::k3s`]: install or remove k3s on a single node
//! - [`services::cni`]: apply the network fabric
//! - [`services::cluster`]: sequence a full run
//! - [`utils::exec`] / [`utils::ssh`]: command execution seams

pub mod commands;
pub mod config;
pub mod error;
pub mod services;
pub mod utils;

pub use commands::Cli;
pub use error::{Error, Result};
