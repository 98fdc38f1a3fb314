//! Cluster bootstrap orchestration
//!
//! One run tears every node down, installs the master, joins the workers
//! and finally applies the CNI. Nodes are handled one at a time in config
//! order.

use crate::config::{ClusterConfig, CniVariant};
use crate::error::Result;
use crate::services::cni::CniInstaller;
use crate::services::k3s::{InstallOptions, JoinMaterial, NodeBootstrapper};
use crate::utils::exec::{LocalRunner, RemoteExecutor};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const BANNER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// How teardown went on one node. Never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    Removed,
    /// The uninstall script was not there: the node was already clean.
    NotInstalled,
    /// No SSH session could be opened.
    Unreachable,
    Failed,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub cni: CniVariant,
    pub master: IpAddr,
    pub workers: Vec<IpAddr>,
    pub kubeconfig: PathBuf,
    pub teardown: Vec<(IpAddr, TeardownOutcome)>,
}

impl BootstrapReport {
    /// Nodes that could not be reached or cleaned during teardown.
    pub fn teardown_warnings(&self) -> usize {
        self.teardown
            .iter()
            .filter(|(_, outcome)| {
                matches!(outcome, TeardownOutcome::Unreachable | TeardownOutcome::Failed)
            })
            .count()
    }
}

/// Run a teardown step, logging instead of propagating any failure.
///
/// Only teardown goes through here; install errors always propagate.
fn best_effort<F>(step: &str, node: IpAddr, op: F) -> TeardownOutcome
where
    F: FnOnce() -> Result<()>,
{
    match op() {
        Ok(()) => TeardownOutcome::Removed,
        Err(e) if e.is_command_not_found() => {
            tracing::debug!(%node, step, "nothing to uninstall");
            println!("  {} not installed, skipping", node);
            TeardownOutcome::NotInstalled
        }
        Err(e) if e.is_session_failure() => {
            tracing::warn!(%node, step, error = %e, "node unreachable during teardown");
            println!("  ⚠ {} unreachable, continuing", node);
            TeardownOutcome::Unreachable
        }
        Err(e) => {
            tracing::warn!(%node, step, error = %e, "teardown step failed");
            println!("  ⚠ {} failed on {}, continuing", step, node);
            TeardownOutcome::Failed
        }
    }
}

/// Drives a full bootstrap run for one [`ClusterConfig`].
pub struct ClusterOrchestrator<'a, R: ?Sized, L: ?Sized> {
    config: &'a ClusterConfig,
    nodes: NodeBootstrapper<'a, R>,
    cni: CniInstaller<'a, L>,
    kubeconfig: &'a Path,
}

impl<'a, R, L> ClusterOrchestrator<'a, R, L>
where
    R: RemoteExecutor + ?Sized,
    L: LocalRunner + ?Sized,
{
    pub fn new(
        config: &'a ClusterConfig,
        nodes: NodeBootstrapper<'a, R>,
        cni: CniInstaller<'a, L>,
        kubeconfig: &'a Path,
    ) -> Self {
        Self {
            config,
            nodes,
            cni,
            kubeconfig,
        }
    }

    pub fn run(&self) -> Result<BootstrapReport> {
        self.config.validate()?;

        println!("{}", BANNER);
        println!(
            "Bootstrap K3s cluster ({} CNI): master {}, {} worker(s)",
            self.config.cni,
            self.config.master,
            self.config.workers.len()
        );
        println!("{}", BANNER);
        println!();

        let teardown = self.teardown();
        println!();

        let master = self.config.master;
        let cni = self.config.cni;
        match cni {
            CniVariant::Default => {
                println!("Install with default K3s configuration");
                let material = self
                    .nodes
                    .install_master(master, &InstallOptions::for_variant(cni))?;
                self.store_credentials(&material)?;
                self.join_workers(&material)?;
            }
            CniVariant::Calico | CniVariant::Canal => {
                let material = self
                    .nodes
                    .install_master(master, &InstallOptions::for_variant(cni))?;
                self.store_credentials(&material)?;
                self.join_workers(&material)?;
                self.cni.apply(cni, self.kubeconfig)?;
            }
            CniVariant::Cilium => {
                let material = self.nodes.install_cilium_master(master)?;
                self.store_credentials(&material)?;
                self.join_workers(&material)?;
                println!("Installing cilium: requires cilium-cli to be available");
                tracing::warn!("kube-proxy replacement is not supported; cilium runs alongside kube-proxy");
                self.cni.apply(cni, self.kubeconfig)?;
            }
        }

        println!();
        println!(
            "✓ Cluster ready: master {} with {} worker(s)",
            master,
            self.config.workers.len()
        );
        Ok(BootstrapReport {
            cni,
            master,
            workers: self.config.workers.clone(),
            kubeconfig: self.kubeconfig.to_path_buf(),
            teardown,
        })
    }

    /// Uninstall k3s from every node, workers first. Never fails.
    pub fn teardown(&self) -> Vec<(IpAddr, TeardownOutcome)> {
        println!("Removing any previous K3s installation...");
        let mut outcomes = Vec::with_capacity(self.config.workers.len() + 1);
        for worker in &self.config.workers {
            let outcome = best_effort("k3s agent uninstall", *worker, || {
                self.nodes.uninstall_worker(*worker)
            });
            outcomes.push((*worker, outcome));
        }
        let master = self.config.master;
        let outcome = best_effort("k3s server uninstall", master, || {
            self.nodes.uninstall_master(master)
        });
        outcomes.push((master, outcome));
        outcomes
    }

    fn store_credentials(&self, material: &JoinMaterial) -> Result<()> {
        material.credentials.write_to(self.kubeconfig)?;
        println!("✓ Kubeconfig written to {}", self.kubeconfig.display());
        Ok(())
    }

    fn join_workers(&self, material: &JoinMaterial) -> Result<()> {
        for worker in &self.config.workers {
            self.nodes
                .install_worker(*worker, self.config.master, &material.token)?;
        }
        Ok(())
    }
}
