//! K3s server (master) installation

use super::{JoinMaterial, NodeBootstrapper, install_command, print_remote_output};
use crate::config::CniVariant;
use crate::error::Result;
use crate::utils::exec::{CommandSpec, RemoteExecutor, execute_checked};
use std::net::IpAddr;

pub const K3S_INSTALL_URL: &str = "https://get.k3s.io";

/// Pod CIDR shared by the default, calico and canal variants. Matches the
/// pool in the calico custom resources manifest.
const POD_CIDR: &str = "192.168.0.0/16";

/// Pod CIDR for cilium. Deliberately distinct from [`POD_CIDR`]; the same
/// block is handed to cilium's cluster-pool IPAM.
pub(crate) const CILIUM_POD_CIDR: &str = "10.42.0.0/16";

/// Flags for the k3s server install, derived from the CNI variant.
///
/// Built fresh for every install; nothing is shared between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    disable_flannel: bool,
    disable_network_policy: bool,
    disabled_components: Vec<&'static str>,
    cluster_cidr: &'static str,
}

impl InstallOptions {
    pub fn for_variant(variant: CniVariant) -> Self {
        match variant {
            CniVariant::Default => Self {
                disable_flannel: true,
                disable_network_policy: true,
                disabled_components: vec!["traefik"],
                cluster_cidr: POD_CIDR,
            },
            CniVariant::Calico | CniVariant::Canal => Self {
                disable_flannel: false,
                disable_network_policy: false,
                disabled_components: Vec::new(),
                cluster_cidr: POD_CIDR,
            },
            CniVariant::Cilium => Self {
                disable_flannel: true,
                disable_network_policy: true,
                disabled_components: Vec::new(),
                cluster_cidr: CILIUM_POD_CIDR,
            },
        }
    }

    pub fn cluster_cidr(&self) -> &'static str {
        self.cluster_cidr
    }

    /// Value for `INSTALL_K3S_EXEC`.
    pub fn exec_flags(&self) -> String {
        let mut flags = Vec::new();
        if self.disable_flannel {
            flags.push("--flannel-backend=none".to_string());
        }
        if self.disable_network_policy {
            flags.push("--disable-network-policy".to_string());
        }
        for component in &self.disabled_components {
            flags.push(format!("--disable={}", component));
        }
        flags.push(format!("--cluster-cidr={}", self.cluster_cidr));
        flags.join(" ")
    }

    pub fn server_install_command(&self) -> CommandSpec {
        install_command(&[("INSTALL_K3S_EXEC", self.exec_flags())])
    }
}

impl<R: RemoteExecutor + ?Sized> NodeBootstrapper<'_, R> {
    /// Install the k3s server on `node` and collect what workers need to
    /// join it.
    pub fn install_master(&self, node: IpAddr, options: &InstallOptions) -> Result<JoinMaterial> {
        println!("Installing K3s on master node {}", node);
        let output = execute_checked(
            self.remote,
            node,
            "k3s server install",
            &options.server_install_command(),
        )?;
        print_remote_output(&output.stdout);
        println!("✓ K3s server installed on {}", node);

        self.fetch_join_material(node)
    }

    /// Master install path used by the cilium variant.
    pub fn install_cilium_master(&self, node: IpAddr) -> Result<JoinMaterial> {
        println!("Preparing master {} for cilium (flannel and network policy disabled)", node);
        self.install_master(node, &InstallOptions::for_variant(CniVariant::Cilium))
    }
}
