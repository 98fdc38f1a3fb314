//! K3s uninstall
//!
//! The install script drops these uninstallers on the node. Both report
//! failure normally; callers decide whether a failure matters.

use super::NodeBootstrapper;
use crate::error::Result;
use crate::utils::exec::{CommandSpec, RemoteExecutor, execute_checked};
use std::net::IpAddr;

pub const AGENT_UNINSTALL_SCRIPT: &str = "/usr/local/bin/k3s-agent-uninstall.sh";
pub const SERVER_UNINSTALL_SCRIPT: &str = "/usr/local/bin/k3s-uninstall.sh";

impl<R: RemoteExecutor + ?Sized> NodeBootstrapper<'_, R> {
    pub fn uninstall_worker(&self, node: IpAddr) -> Result<()> {
        println!("Uninstalling worker @{}", node);
        self.run_uninstaller(node, "k3s agent uninstall", AGENT_UNINSTALL_SCRIPT)
    }

    pub fn uninstall_master(&self, node: IpAddr) -> Result<()> {
        println!("Uninstalling master @{}", node);
        self.run_uninstaller(node, "k3s server uninstall", SERVER_UNINSTALL_SCRIPT)
    }

    fn run_uninstaller(&self, node: IpAddr, step: &str, script: &str) -> Result<()> {
        let output = execute_checked(self.remote, node, step, &CommandSpec::new(script))?;
        super::print_remote_output(&output.stdout);
        Ok(())
    }
}
