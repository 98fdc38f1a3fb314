use crate::error::{Error, Result};
use crate::utils::exec::{CommandOutput, CommandSpec, RemoteExecutor};
use crate::utils::string::bytes_to_string;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Exit status the OpenSSH client reserves for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Credentials used for every node in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshAuth {
    pub user: String,
    pub key: PathBuf,
}

impl SshAuth {
    pub fn new(user: impl Into<String>, key: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            key: key.into(),
        }
    }
}

/// SSH connection for remote command execution
///
/// Each call to [`SshConnection::execute`] spawns its own `ssh` process, so a
/// session lives exactly as long as one command.
pub struct SshConnection<'a> {
    host: IpAddr,
    auth: &'a SshAuth,
    client: &'a CommandSpec,
}

impl<'a> SshConnection<'a> {
    /// `client` is the local program (plus leading arguments) that speaks
    /// SSH, normally plain `ssh`.
    pub fn new(host: IpAddr, auth: &'a SshAuth, client: &'a CommandSpec) -> Self {
        Self { host, auth, client }
    }

    fn build_ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.auth.key.display().to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            // Unknown host keys are accepted and never recorded. There is no
            // protection against a man-in-the-middle on the node network.
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
        ];
        // No ConnectTimeout: a node that never answers blocks the run.

        args.push("-l".to_string());
        args.push(self.auth.user.clone());
        args.push(self.host.to_string());
        args
    }

    /// Full argument vector handed to the local `ssh` binary.
    pub fn command_line(&self, command: &CommandSpec) -> Vec<String> {
        let mut ssh_args = self.build_ssh_args();
        ssh_args.push(command.render_shell());
        ssh_args
    }

    pub fn execute(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let output = Command::new(&self.client.program)
            .args(&self.client.args)
            .args(self.command_line(command))
            .envs(self.client.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::RemoteSession {
                host: self.host,
                message: format!("failed to spawn {}: {}", self.client.program, e),
            })?;

        if output.status.code() == Some(SSH_CLIENT_FAILURE) {
            let stderr = bytes_to_string(&output.stderr);
            return Err(Error::RemoteSession {
                host: self.host,
                message: if stderr.is_empty() {
                    "ssh exited with status 255".to_string()
                } else {
                    stderr
                },
            });
        }

        Ok(output.into())
    }
}

/// Production [`RemoteExecutor`] backed by the system OpenSSH client.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    auth: SshAuth,
    client: CommandSpec,
}

impl SshExecutor {
    pub fn new(auth: SshAuth) -> Self {
        Self::with_client(auth, CommandSpec::new("ssh"))
    }

    pub fn with_client(auth: SshAuth, client: CommandSpec) -> Self {
        Self { auth, client }
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute(&self, node: IpAddr, command: &CommandSpec) -> Result<CommandOutput> {
        SshConnection::new(node, &self.auth, &self.client).execute(command)
    }
}
