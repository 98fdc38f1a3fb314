//! CNI installation
//!
//! Applies the network fabric once every node has joined. Each variant is a
//! fixed list of local commands run with `KUBECONFIG` bound to the
//! credentials written by the orchestrator.

use crate::config::CniVariant;
use crate::error::{Error, Result, describe_exit};
use crate::services::k3s::CILIUM_POD_CIDR;
use crate::utils::exec::{CommandSpec, LocalRunner};
use std::path::{Path, PathBuf};

pub const CALICO_OPERATOR_MANIFEST: &str =
    "https://raw.githubusercontent.com/projectcalico/calico/v3.27.2/manifests/tigera-operator.yaml";
pub const CALICO_CUSTOM_RESOURCES_FILE: &str = "calico_config.yml";
pub const CANAL_MANIFEST_FILE: &str = "canal.yml";
pub const CILIUM_VERSION: &str = "1.15.4";

/// Where the manifests for each variant live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CniManifests {
    pub calico_operator: String,
    pub calico_custom_resources: PathBuf,
    pub canal: PathBuf,
}

impl CniManifests {
    /// Local manifests under `dir`, calico operator from upstream.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            calico_operator: CALICO_OPERATOR_MANIFEST.to_string(),
            calico_custom_resources: dir.join(CALICO_CUSTOM_RESOURCES_FILE),
            canal: dir.join(CANAL_MANIFEST_FILE),
        }
    }

    /// Local files `variant` needs on disk.
    pub fn local_files(&self, variant: CniVariant) -> Vec<&Path> {
        match variant {
            CniVariant::Calico => vec![self.calico_custom_resources.as_path()],
            CniVariant::Canal => vec![self.canal.as_path()],
            CniVariant::Default | CniVariant::Cilium => Vec::new(),
        }
    }
}

/// Local binary `variant` shells out to, if any.
pub fn required_tool(variant: CniVariant) -> Option<&'static str> {
    match variant {
        CniVariant::Calico | CniVariant::Canal => Some("kubectl"),
        CniVariant::Cilium => Some("cilium"),
        CniVariant::Default => None,
    }
}

/// One command in a variant's install sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CniStep {
    pub name: String,
    pub command: CommandSpec,
}

pub struct CniInstaller<'a, L: ?Sized> {
    runner: &'a L,
    manifests: &'a CniManifests,
}

impl<'a, L: LocalRunner + ?Sized> CniInstaller<'a, L> {
    pub fn new(runner: &'a L, manifests: &'a CniManifests) -> Self {
        Self { runner, manifests }
    }

    /// Ordered commands for `variant`. Calico's second step needs the CRDs
    /// created by the first.
    pub fn steps(&self, variant: CniVariant, kubeconfig: &Path) -> Vec<CniStep> {
        let kubectl_create = |name: &str, manifest: String| CniStep {
            name: name.to_string(),
            command: CommandSpec::new("kubectl")
                .args(["create", "-f"])
                .arg(manifest)
                .env("KUBECONFIG", kubeconfig.display().to_string()),
        };

        match variant {
            CniVariant::Default => Vec::new(),
            CniVariant::Calico => vec![
                kubectl_create("calico operator", self.manifests.calico_operator.clone()),
                kubectl_create(
                    "calico custom resources",
                    self.manifests.calico_custom_resources.display().to_string(),
                ),
            ],
            CniVariant::Canal => vec![kubectl_create(
                "canal manifest",
                self.manifests.canal.display().to_string(),
            )],
            CniVariant::Cilium => vec![CniStep {
                name: "cilium install".to_string(),
                command: CommandSpec::new("cilium")
                    .args(["install", "--version", CILIUM_VERSION])
                    .arg(format!(
                        "--set=ipam.operator.clusterPoolIPv4PodCIDRList={}",
                        CILIUM_POD_CIDR
                    ))
                    .env("KUBECONFIG", kubeconfig.display().to_string()),
            }],
        }
    }

    /// Run every step for `variant`, stopping at the first failure.
    pub fn apply(&self, variant: CniVariant, kubeconfig: &Path) -> Result<()> {
        let steps = self.steps(variant, kubeconfig);
        if steps.is_empty() {
            return Ok(());
        }

        println!("Installing {}", variant);
        for step in steps {
            println!("  {}...", step.name);
            let output = self.runner.run(&step.command).map_err(|e| Error::CniApply {
                step: step.name.clone(),
                message: format!("could not start {}: {}", step.command.program, e),
            })?;

            let stdout = output.stdout.trim_end();
            if !stdout.is_empty() {
                println!("{}", crate::utils::string::indent(stdout, "    "));
            }

            if !output.success() {
                return Err(Error::CniApply {
                    step: step.name,
                    message: format!(
                        "{} ({})",
                        output.stderr.trim(),
                        describe_exit(&output.code)
                    ),
                });
            }
            println!("  ✓ {}", step.name);
        }
        Ok(())
    }
}
