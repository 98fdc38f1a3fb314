//! K3s kubeconfig and node token retrieval

use super::NodeBootstrapper;
use crate::error::{Error, Result};
use crate::utils::exec::{CommandSpec, RemoteExecutor};
use std::fmt;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;

pub const KUBECONFIG_REMOTE_PATH: &str = "/etc/rancher/k3s/k3s.yaml";
pub const NODE_TOKEN_REMOTE_PATH: &str = "/var/lib/rancher/k3s/server/node-token";

const LOOPBACK: &str = "127.0.0.1";

/// Cluster admin kubeconfig pointing at the master's real address.
#[derive(Clone, PartialEq, Eq)]
pub struct KubeCredentials {
    content: String,
}

impl KubeCredentials {
    /// Build from the kubeconfig as k3s wrote it on `master`.
    pub fn from_remote(raw: &str, master: IpAddr) -> Self {
        Self {
            content: rewrite_loopback(raw, master),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Write to `path`, readable by the owner only on Unix.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let write_err = |source| Error::CredentialWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path).map_err(write_err)?;
        file.write_all(self.content.as_bytes()).map_err(write_err)?;
        Ok(())
    }
}

impl fmt::Debug for KubeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeCredentials")
            .field("len", &self.content.len())
            .finish_non_exhaustive()
    }
}

/// Replace every standalone `127.0.0.1` in `kubeconfig` with `master`.
///
/// Longer addresses that merely contain it (`127.0.0.100`, `10.127.0.0.1`)
/// are left alone. IPv6 masters are bracketed so `https://127.0.0.1:6443`
/// stays a valid URL.
pub fn rewrite_loopback(kubeconfig: &str, master: IpAddr) -> String {
    let replacement = match master {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    };

    let bytes = kubeconfig.as_bytes();
    let mut rewritten = String::with_capacity(kubeconfig.len());
    let mut copied = 0;
    for (start, _) in kubeconfig.match_indices(LOOPBACK) {
        let end = start + LOOPBACK.len();
        let joined_before = start > 0 && matches!(bytes[start - 1], b'0'..=b'9' | b'.');
        let joined_after = bytes.get(end).is_some_and(u8::is_ascii_digit);
        if joined_before || joined_after {
            continue;
        }
        rewritten.push_str(&kubeconfig[copied..start]);
        rewritten.push_str(&replacement);
        copied = end;
    }
    rewritten.push_str(&kubeconfig[copied..]);
    rewritten
}

/// Secret a worker presents to join the cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct JoinToken(String);

impl JoinToken {
    /// `None` when the token file was empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim_end();
        (!token.is_empty()).then(|| Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JoinToken(<redacted>)")
    }
}

/// Everything produced by a master install.
#[derive(Debug, Clone)]
pub struct JoinMaterial {
    pub credentials: KubeCredentials,
    pub token: JoinToken,
}

impl<R: RemoteExecutor + ?Sized> NodeBootstrapper<'_, R> {
    pub(super) fn fetch_join_material(&self, node: IpAddr) -> Result<JoinMaterial> {
        println!("Copy Kubernetes configuration");
        let raw = self.read_root_file(node, "kubeconfig", KUBECONFIG_REMOTE_PATH)?;
        let credentials = KubeCredentials::from_remote(&raw, node);

        println!("Get node token");
        let raw = self.read_root_file(node, "node token", NODE_TOKEN_REMOTE_PATH)?;
        let token = JoinToken::parse(&raw).ok_or(Error::CredentialRetrieval {
            host: node,
            what: "node token",
            path: NODE_TOKEN_REMOTE_PATH,
        })?;

        println!("✓ Credentials and join token retrieved from {}", node);
        Ok(JoinMaterial { credentials, token })
    }

    /// `sudo cat` a root-owned file. A failed read or blank content is a
    /// retrieval error; a session failure is passed through unchanged.
    fn read_root_file(&self, node: IpAddr, what: &'static str, path: &'static str) -> Result<String> {
        let command = CommandSpec::new("sudo").args(["cat", path]);
        tracing::debug!(%node, command = %command.redacted(), "reading {}", what);
        let output = self.remote.execute(node, &command)?;
        if !output.success() || output.stdout.trim().is_empty() {
            if !output.stderr.trim().is_empty() {
                tracing::debug!(%node, stderr = %output.stderr.trim(), "{} read failed", what);
            }
            return Err(Error::CredentialRetrieval {
                host: node,
                what,
                path,
            });
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::exec::testing::*;

    #[test]
    fn test_rewrite_loopback_round_trip() {
        let raw = "server: https://127.0.0.1:6443\nother: 127.0.0.1\n";
        let rewritten = rewrite_loopback(raw, "10.0.0.5".parse().unwrap());
        assert!(rewritten.contains("https://10.0.0.5:6443"));
        assert!(!rewritten.contains("127.0.0.1"));
        assert_eq!(rewritten.matches("10.0.0.5").count(), 2);
    }

    #[test]
    fn test_rewrite_loopback_leaves_longer_addresses() {
        let raw = "server: https://127.0.0.1:6443\nextra: 127.0.0.100\npeer: 10.127.0.0.1\n";
        let rewritten = rewrite_loopback(raw, "10.0.0.5".parse().unwrap());
        assert_eq!(
            rewritten,
            "server: https://10.0.0.5:6443\nextra: 127.0.0.100\npeer: 10.127.0.0.1\n"
        );
    }

    #[test]
    fn test_rewrite_loopback_ipv6_is_bracketed() {
        let rewritten = rewrite_loopback("server: https://127.0.0.1:6443", "fd00::1".parse().unwrap());
        assert_eq!(rewritten, "server: https://[fd00::1]:6443");
    }

    #[test]
    fn test_join_token_parse() {
        assert_eq!(JoinToken::parse("K10abc::server:x\n").unwrap().as_str(), "K10abc::server:x");
        assert!(JoinToken::parse("\n").is_none());
        assert!(JoinToken::parse("").is_none());
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let token = JoinToken::parse("topsecret").unwrap();
        assert!(!format!("{:?}", token).contains("topsecret"));
        let creds = KubeCredentials::from_remote("client-key-data: topsecret", "10.0.0.5".parse().unwrap());
        assert!(!format!("{:?}", creds).contains("topsecret"));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k3s.yaml");
        let creds = KubeCredentials::from_remote(SAMPLE_KUBECONFIG, "10.0.0.5".parse().unwrap());
        creds.write_to(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, creds.as_str());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let creds = KubeCredentials::from_remote(SAMPLE_KUBECONFIG, "10.0.0.5".parse().unwrap());
        let err = creds.write_to(&dir.path().join("nope/k3s.yaml")).unwrap_err();
        assert!(matches!(err, Error::CredentialWrite { .. }));
    }

    #[test]
    fn test_missing_token_file_is_retrieval_error() {
        let log = CallLog::default();
        let remote = RecordingRemote::with_responder(log, |node, cmd| {
            if cmd.args.iter().any(|a| a == NODE_TOKEN_REMOTE_PATH) {
                return Ok(exit(1, "cat: /var/lib/rancher/k3s/server/node-token: No such file or directory"));
            }
            healthy_node(node, cmd)
        });
        let err = NodeBootstrapper::new(&remote)
            .fetch_join_material("10.0.0.5".parse().unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CredentialRetrieval { what: "node token", .. }
        ));
    }

    #[test]
    fn test_empty_kubeconfig_is_retrieval_error() {
        let log = CallLog::default();
        let remote = RecordingRemote::with_responder(log.clone(), |_, _| Ok(ok("  \n")));
        let err = NodeBootstrapper::new(&remote)
            .fetch_join_material("10.0.0.5".parse().unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CredentialRetrieval { what: "kubeconfig", .. }
        ));
        assert_eq!(log.borrow().len(), 1);
    }
}
