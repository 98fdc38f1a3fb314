//! `k3strap <config>`: validate, preflight, then run the orchestrator

use super::Cli;
use crate::config::{ClusterConfig, load_cluster_config};
use crate::error::{Error, Result};
use crate::services::cluster::{BootstrapReport, ClusterOrchestrator};
use crate::services::cni::{self, CniInstaller, CniManifests};
use crate::services::k3s::NodeBootstrapper;
use crate::utils::exec::local::{self, SystemRunner};
use crate::utils::ssh::{SshAuth, SshExecutor};
use anyhow::Context;
use std::path::{Path, PathBuf};

pub fn handle_bootstrap(cli: &Cli) -> anyhow::Result<()> {
    let config = load_cluster_config(&cli.config)
        .with_context(|| format!("Config {} rejected", cli.config.display()))?;
    println!(
        "✓ Config valid: {} CNI, master {}, workers {}",
        config.cni,
        config.master,
        config
            .workers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let home = home_dir().context("Cannot resolve SSH key")?;
    let key = config.ssh_key_path(&home);
    let manifests = CniManifests::in_dir(&cli.manifests_dir);
    preflight(&config, &key, &manifests, local::check_command_exists)
        .context("Preflight checks failed")?;

    let remote = SshExecutor::new(SshAuth::new(config.username.clone(), key));
    let runner = SystemRunner;
    let report = ClusterOrchestrator::new(
        &config,
        NodeBootstrapper::new(&remote),
        CniInstaller::new(&runner, &manifests),
        &cli.kubeconfig_out,
    )
    .run()
    .context("Cluster bootstrap failed")?;

    print_summary(&report);
    Ok(())
}

fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| Error::validation("HOME is not set"))
}

/// Local checks that must pass before any node is touched.
pub fn preflight<F>(
    config: &ClusterConfig,
    ssh_key: &Path,
    manifests: &CniManifests,
    tool_exists: F,
) -> Result<()>
where
    F: Fn(&str) -> bool,
{
    let tools = std::iter::once("ssh").chain(cni::required_tool(config.cni));
    for tool in tools {
        if !tool_exists(tool) {
            return Err(Error::ToolNotFound {
                tool: tool.to_string(),
            });
        }
    }

    if !ssh_key.is_file() {
        return Err(Error::validation(format!(
            "ssh_key: {} does not exist",
            ssh_key.display()
        )));
    }

    for manifest in manifests.local_files(config.cni) {
        if !manifest.is_file() {
            return Err(Error::validation(format!(
                "{} manifest {} does not exist",
                config.cni,
                manifest.display()
            )));
        }
    }
    Ok(())
}

fn print_summary(report: &BootstrapReport) {
    println!();
    println!("Nodes:");
    println!("  master  {}", report.master);
    for worker in &report.workers {
        println!("  worker  {}", worker);
    }
    if report.teardown_warnings() > 0 {
        println!(
            "⚠ {} node(s) could not be cleaned before install; see warnings above",
            report.teardown_warnings()
        );
    }
    println!();
    println!("Use the cluster with:");
    println!("  export KUBECONFIG={}", report.kubeconfig.display());
}
