// Command line surface
//
// The tool does one thing, so there are no subcommands: the config path is
// the only positional argument and everything else is an optional flag.

pub mod bootstrap;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "k3strap", version)]
#[command(about = "Bootstrap a k3s cluster over SSH and install a CNI", long_about = None)]
pub struct Cli {
    /// Cluster config file (YAML)
    pub config: PathBuf,

    /// Where to write the cluster kubeconfig
    #[arg(long, env = "K3STRAP_KUBECONFIG", default_value = "./k3s.yaml")]
    pub kubeconfig_out: PathBuf,

    /// Directory holding calico_config.yml and canal.yml
    #[arg(long, env = "K3STRAP_MANIFESTS_DIR", default_value = ".")]
    pub manifests_dir: PathBuf,
}
