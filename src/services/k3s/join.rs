//! K3s agent (worker) join

use super::{JoinToken, NodeBootstrapper, install_command, print_remote_output};
use crate::error::Result;
use crate::utils::exec::{CommandSpec, RemoteExecutor, execute_checked};
use std::net::{IpAddr, SocketAddr};

pub const API_SERVER_PORT: u16 = 6443;

/// Agent-mode install pointed at `master`.
pub(crate) fn agent_install_command(master: IpAddr, token: &JoinToken) -> CommandSpec {
    let server_url = format!("https://{}", SocketAddr::new(master, API_SERVER_PORT));
    install_command(&[
        ("K3S_URL", server_url),
        ("K3S_TOKEN", token.as_str().to_string()),
    ])
}

impl<R: RemoteExecutor + ?Sized> NodeBootstrapper<'_, R> {
    /// Install k3s on `node` as an agent of `master`.
    pub fn install_worker(&self, node: IpAddr, master: IpAddr, token: &JoinToken) -> Result<()> {
        println!("Bootstrap worker @{}", node);
        let output = execute_checked(
            self.remote,
            node,
            "k3s agent install",
            &agent_install_command(master, token),
        )?;
        print_remote_output(&output.stdout);
        println!("✓ Worker {} joined {}", node, master);
        Ok(())
    }
}
