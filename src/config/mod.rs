//! Cluster configuration loading and validation
//!
//! The config file is YAML:
//!
//! ```yaml
//! ssh_key: /.ssh/id_ed25519
//! username: ubuntu
//! master_ip: 10.0.0.1
//! workers:
//!   - 10.0.0.2
//!   - 10.0.0.3
//! cni: calico
//! ```
//!
//! Every problem found is reported in a single validation error so the whole
//! file can be fixed in one pass.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use yaml_rust::{Yaml, YamlLoader};

const KNOWN_KEYS: &[&str] = &["ssh_key", "username", "master_ip", "workers", "cni"];

/// Network fabric installed on top of k3s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CniVariant {
    /// k3s with its bundled networking reconfigured, no extra manifests.
    Default,
    Calico,
    Canal,
    Cilium,
}

impl CniVariant {
    pub const ALL: [CniVariant; 4] = [
        CniVariant::Default,
        CniVariant::Calico,
        CniVariant::Canal,
        CniVariant::Cilium,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CniVariant::Default => "default",
            CniVariant::Calico => "calico",
            CniVariant::Canal => "canal",
            CniVariant::Cilium => "cilium",
        }
    }
}

impl fmt::Display for CniVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CniVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CniVariant::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                Error::validation(format!(
                    "unknown cni '{}' (expected one of: default, calico, canal, cilium)",
                    s
                ))
            })
    }
}

/// Validated description of the cluster to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub ssh_key: String,
    pub username: String,
    pub master: IpAddr,
    pub workers: Vec<IpAddr>,
    pub cni: CniVariant,
}

impl ClusterConfig {
    /// Resolve the private key under the invoking user's home directory.
    ///
    /// `ssh_key` is a suffix of the home directory: `/.ssh/id_rsa`,
    /// `.ssh/id_rsa` and `~/.ssh/id_rsa` all name the same file.
    pub fn ssh_key_path(&self, home: &Path) -> PathBuf {
        let relative = self
            .ssh_key
            .strip_prefix("~/")
            .unwrap_or(&self.ssh_key)
            .trim_start_matches('/');
        home.join(relative)
    }

    /// Re-run the checks [`parse_cluster_config`] applies, for configs
    /// built or modified in code.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        problems.extend(ssh_key_problem(&self.ssh_key));
        if let Err(reason) = validate_username(&self.username) {
            problems.push(format!("username: {}", reason));
        }
        problems.extend(address_problem("master_ip", self.master));

        if self.workers.is_empty() {
            problems.push("workers: at least one worker is required".to_string());
        }
        let mut seen = HashSet::new();
        for (index, worker) in self.workers.iter().enumerate() {
            let field = format!("workers[{}]", index);
            problems.extend(address_problem(&field, *worker));
            if !seen.insert(*worker) {
                problems.push(format!("{}: duplicate worker {}", field, worker));
            }
        }
        if self.workers.contains(&self.master) {
            problems.push(format!(
                "workers: master address {} must not also be listed as a worker",
                self.master
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(problems.join("; ")))
        }
    }
}

/// Read and validate the config file at `path`.
pub fn load_cluster_config(path: &Path) -> Result<ClusterConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_cluster_config(&content)
}

/// Parse and validate config YAML.
pub fn parse_cluster_config(content: &str) -> Result<ClusterConfig> {
    let docs = YamlLoader::load_from_str(content)
        .map_err(|e| Error::validation(format!("malformed YAML: {}", e)))?;
    let doc = match docs.into_iter().next() {
        Some(doc) => doc,
        None => return Err(Error::validation("config file is empty")),
    };
    let hash = doc
        .as_hash()
        .ok_or_else(|| Error::validation("config must be a YAML mapping"))?;

    for key in hash.keys() {
        match key.as_str() {
            Some(name) if KNOWN_KEYS.contains(&name) => {}
            Some(name) => tracing::warn!(key = name, "ignoring unknown config key"),
            None => tracing::warn!(key = ?key, "ignoring non-string config key"),
        }
    }

    let mut problems = Vec::new();

    let ssh_key = required_string(&doc, "ssh_key", &mut problems);
    if let Some(ref key) = ssh_key {
        problems.extend(ssh_key_problem(key));
    }

    let username = required_string(&doc, "username", &mut problems);
    if let Some(ref name) = username {
        if let Err(reason) = validate_username(name) {
            problems.push(format!("username: {}", reason));
        }
    }

    let master = required_string(&doc, "master_ip", &mut problems)
        .and_then(|raw| parse_node_address("master_ip", &raw, &mut problems));

    let workers = parse_workers(&doc, &mut problems);

    let cni = required_string(&doc, "cni", &mut problems).and_then(|raw| {
        match raw.parse::<CniVariant>() {
            Ok(v) => Some(v),
            Err(Error::ConfigValidation { message }) => {
                problems.push(format!("cni: {}", message));
                None
            }
            Err(other) => {
                problems.push(format!("cni: {}", other));
                None
            }
        }
    });

    if let (Some(master), Some(workers)) = (master, workers.as_ref()) {
        if workers.contains(&master) {
            problems.push(format!(
                "workers: master address {} must not also be listed as a worker",
                master
            ));
        }
    }

    if !problems.is_empty() {
        return Err(Error::validation(problems.join("; ")));
    }

    match (ssh_key, username, master, workers, cni) {
        (Some(ssh_key), Some(username), Some(master), Some(workers), Some(cni)) => {
            Ok(ClusterConfig {
                ssh_key,
                username,
                master,
                workers,
                cni,
            })
        }
        _ => Err(Error::validation("incomplete configuration")),
    }
}

fn required_string(doc: &Yaml, key: &str, problems: &mut Vec<String>) -> Option<String> {
    match &doc[key] {
        Yaml::String(s) => Some(s.clone()),
        Yaml::BadValue | Yaml::Null => {
            problems.push(format!("{}: field is required", key));
            None
        }
        other => {
            problems.push(format!("{}: expected a string, found {}", key, yaml_kind(other)));
            None
        }
    }
}

fn parse_workers(doc: &Yaml, problems: &mut Vec<String>) -> Option<Vec<IpAddr>> {
    let entries = match &doc["workers"] {
        Yaml::Array(entries) => entries,
        Yaml::BadValue | Yaml::Null => {
            problems.push("workers: field is required".to_string());
            return None;
        }
        other => {
            problems.push(format!("workers: expected a list, found {}", yaml_kind(other)));
            return None;
        }
    };

    if entries.is_empty() {
        problems.push("workers: at least one worker is required".to_string());
        return None;
    }

    let before = problems.len();
    let mut seen = HashSet::new();
    let mut workers = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let field = format!("workers[{}]", index);
        let Some(raw) = entry.as_str() else {
            problems.push(format!("{}: expected an IP address string", field));
            continue;
        };
        if let Some(addr) = parse_node_address(&field, raw, problems) {
            if !seen.insert(addr) {
                problems.push(format!("{}: duplicate worker {}", field, addr));
                continue;
            }
            workers.push(addr);
        }
    }

    (problems.len() == before).then_some(workers)
}

fn parse_node_address(field: &str, raw: &str, problems: &mut Vec<String>) -> Option<IpAddr> {
    let addr: IpAddr = match raw.trim().parse() {
        Ok(addr) => addr,
        Err(_) => {
            problems.push(format!("{}: '{}' is not a valid IP address", field, raw));
            return None;
        }
    };
    if let Some(problem) = address_problem(field, addr) {
        problems.push(problem);
        return None;
    }
    Some(addr)
}

fn ssh_key_problem(key: &str) -> Option<String> {
    if key.trim().is_empty() {
        Some("ssh_key: must not be empty".to_string())
    } else if key.contains('\0') {
        Some("ssh_key: must not contain NUL bytes".to_string())
    } else {
        None
    }
}

fn address_problem(field: &str, addr: IpAddr) -> Option<String> {
    (addr.is_unspecified() || addr.is_loopback() || addr.is_multicast())
        .then(|| format!("{}: {} is not a reachable node address", field, addr))
}

/// POSIX-style login name: starts with a letter or underscore, then
/// letters, digits, `_`, `-` or `.`, at most 32 characters.
fn validate_username(name: &str) -> std::result::Result<(), &'static str> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err("must not be empty"),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some(_) => return Err("must start with a letter or underscore"),
    }
    if name.len() > 32 {
        return Err("must be at most 32 characters");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return Err("may only contain letters, digits, '_', '-' and '.'");
    }
    Ok(())
}

fn yaml_kind(value: &Yaml) -> &'static str {
    match value {
        Yaml::Real(_) => "a float",
        Yaml::Integer(_) => "an integer",
        Yaml::String(_) => "a string",
        Yaml::Boolean(_) => "a boolean",
        Yaml::Array(_) => "a list",
        Yaml::Hash(_) => "a mapping",
        Yaml::Alias(_) => "an alias",
        Yaml::Null => "null",
        Yaml::BadValue => "nothing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "\
ssh_key: /.ssh/id_ed25519
username: ubuntu
master_ip: 10.0.0.1
workers:
  - 10.0.0.2
  - 10.0.0.3
cni: calico
";

    fn message(err: Error) -> String {
        match err {
            Error::ConfigValidation { message } => message,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_parse_valid_config() {
        let config = parse_cluster_config(VALID).unwrap();
        assert_eq!(config.ssh_key, "/.ssh/id_ed25519");
        assert_eq!(config.username, "ubuntu");
        assert_eq!(config.master, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(
            config.workers,
            vec![
                "10.0.0.2".parse::<IpAddr>().unwrap(),
                "10.0.0.3".parse::<IpAddr>().unwrap()
            ]
        );
        assert_eq!(config.cni, CniVariant::Calico);
    }

    #[test]
    fn test_unknown_cni_is_rejected() {
        let yaml = VALID.replace("cni: calico", "cni: unknown");
        let msg = message(parse_cluster_config(&yaml).unwrap_err());
        assert!(msg.contains("unknown cni 'unknown'"), "{msg}");
    }

    #[test]
    fn test_every_variant_parses() {
        for variant in CniVariant::ALL {
            assert_eq!(variant.as_str().parse::<CniVariant>().unwrap(), variant);
        }
        assert!("Calico".parse::<CniVariant>().is_err());
    }

    #[test]
    fn test_master_listed_as_worker_is_rejected() {
        let yaml = VALID.replace("  - 10.0.0.3", "  - 10.0.0.1");
        let msg = message(parse_cluster_config(&yaml).unwrap_err());
        assert!(msg.contains("must not also be listed as a worker"), "{msg}");
    }

    #[test]
    fn test_empty_and_duplicate_workers() {
        let yaml = VALID.replace("  - 10.0.0.2\n  - 10.0.0.3\n", "").replace("workers:", "workers: []");
        let msg = message(parse_cluster_config(&yaml).unwrap_err());
        assert!(msg.contains("at least one worker"), "{msg}");

        let yaml = VALID.replace("  - 10.0.0.3", "  - 10.0.0.2");
        let msg = message(parse_cluster_config(&yaml).unwrap_err());
        assert!(msg.contains("duplicate worker 10.0.0.2"), "{msg}");
    }

    #[test]
    fn test_all_problems_reported_together() {
        let yaml = "\
username: '-root'
master_ip: not-an-ip
workers:
  - 10.0.0.2
  - 0.0.0.0
cni: flannel
";
        let msg = message(parse_cluster_config(yaml).unwrap_err());
        assert!(msg.contains("ssh_key: field is required"), "{msg}");
        assert!(msg.contains("username: must start with a letter"), "{msg}");
        assert!(msg.contains("master_ip: 'not-an-ip' is not a valid IP address"), "{msg}");
        assert!(msg.contains("workers[1]: 0.0.0.0 is not a reachable node address"), "{msg}");
        assert!(msg.contains("unknown cni 'flannel'"), "{msg}");
    }

    #[test]
    fn test_wrong_types_and_shapes() {
        let msg = message(parse_cluster_config("- a\n- b\n").unwrap_err());
        assert_eq!(msg, "config must be a YAML mapping");

        let msg = message(parse_cluster_config("").unwrap_err());
        assert_eq!(msg, "config file is empty");

        let yaml = VALID.replace("username: ubuntu", "username: 42");
        let msg = message(parse_cluster_config(&yaml).unwrap_err());
        assert!(msg.contains("username: expected a string, found an integer"), "{msg}");

        let msg = message(parse_cluster_config("ssh_key: [unclosed\n").unwrap_err());
        assert!(msg.starts_with("malformed YAML"), "{msg}");
    }

    #[test]
    fn test_ipv6_addresses_accepted() {
        let yaml = VALID
            .replace("master_ip: 10.0.0.1", "master_ip: 'fd00::1'")
            .replace("  - 10.0.0.3", "  - 'fd00::3'");
        let config = parse_cluster_config(&yaml).unwrap();
        assert_eq!(config.master, "fd00::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let yaml = format!("{}extra: true\n", VALID);
        assert!(parse_cluster_config(&yaml).is_ok());
    }

    #[test]
    fn test_ssh_key_path_resolution() {
        let config = parse_cluster_config(VALID).unwrap();
        let home = Path::new("/home/me");
        assert_eq!(config.ssh_key_path(home), PathBuf::from("/home/me/.ssh/id_ed25519"));

        for variant in [".ssh/id_ed25519", "~/.ssh/id_ed25519"] {
            let mut other = config.clone();
            other.ssh_key = variant.to_string();
            assert_eq!(other.ssh_key_path(home), PathBuf::from("/home/me/.ssh/id_ed25519"));
        }
    }

    #[test]
    fn test_validate_accepts_parsed_config() {
        parse_cluster_config(VALID).unwrap().validate().unwrap();
    }

    #[test]
    fn test_validate_catches_hand_edited_config() {
        let mut config = parse_cluster_config(VALID).unwrap();
        config.workers.push(config.workers[0]);
        config.workers.push("127.0.0.1".parse().unwrap());
        config.master = "0.0.0.0".parse().unwrap();
        config.username = "9lives".to_string();

        let msg = message(config.validate().unwrap_err());
        assert!(msg.contains("workers[2]: duplicate worker 10.0.0.2"), "{msg}");
        assert!(msg.contains("workers[3]: 127.0.0.1 is not a reachable node address"), "{msg}");
        assert!(msg.contains("master_ip: 0.0.0.0 is not a reachable node address"), "{msg}");
        assert!(msg.contains("username: must start with a letter"), "{msg}");
    }

    #[test]
    fn test_validate_requires_workers() {
        let mut config = parse_cluster_config(VALID).unwrap();
        config.workers.clear();
        let msg = message(config.validate().unwrap_err());
        assert!(msg.contains("at least one worker"), "{msg}");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cluster_config(&dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yml");
        std::fs::write(&path, VALID).unwrap();
        assert_eq!(load_cluster_config(&path).unwrap().cni, CniVariant::Calico);
    }
}
