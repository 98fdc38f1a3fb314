//! K3s node bootstrap
//!
//! Installs and uninstalls k3s on a single node. Every remote call goes
//! through a [`RemoteExecutor`], one command per session.

mod cleanup;
mod init;
mod join;
mod kubeconfig;

pub use cleanup::{AGENT_UNINSTALL_SCRIPT, SERVER_UNINSTALL_SCRIPT};
pub(crate) use init::CILIUM_POD_CIDR;
pub use init::{InstallOptions, K3S_INSTALL_URL};
pub use join::API_SERVER_PORT;
pub use kubeconfig::{
    JoinMaterial, JoinToken, KUBECONFIG_REMOTE_PATH, KubeCredentials, NODE_TOKEN_REMOTE_PATH,
    rewrite_loopback,
};

use crate::utils::exec::{CommandSpec, RemoteExecutor};

/// Shell snippet run on every node to install k3s.
///
/// The installer is captured before it is piped to `sh` so a failed download
/// surfaces as a non-zero exit instead of an empty, successful script.
const INSTALL_SCRIPT: &str = "installer=$(curl -sfL \"$0\") && printf '%s\\n' \"$installer\" | sh -s -";

/// Installs and removes k3s on individual nodes.
pub struct NodeBootstrapper<'a, R: ?Sized> {
    remote: &'a R,
}

impl<'a, R: RemoteExecutor + ?Sized> NodeBootstrapper<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self { remote }
    }
}

/// Installer invocation with the given environment bindings.
fn install_command(env: &[(&str, String)]) -> CommandSpec {
    env.iter().fold(
        CommandSpec::new("sh").args(["-c", INSTALL_SCRIPT, K3S_INSTALL_URL]),
        |cmd, (key, value)| cmd.env(*key, value.clone()),
    )
}

/// Echo remote installer output beneath the current step.
fn print_remote_output(stdout: &str) {
    let trimmed = stdout.trim_end();
    if !trimmed.is_empty() {
        println!("{}", crate::utils::string::indent(trimmed, "    "));
    }
}
