use crate::error::{Error, Result};
use crate::utils::string::shell_escape;
use std::fmt;
use std::net::IpAddr;
use std::process::Output;

/// A command as an argument vector plus environment bindings.
///
/// Values are never spliced into a shell string on the local side. When a
/// command has to cross an SSH connection it is rendered with every word
/// quoted (see [`CommandSpec::render_shell`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render as a single string for a remote POSIX shell.
    ///
    /// Environment bindings go through `env(1)` so they stay plain words.
    pub fn render_shell(&self) -> String {
        let mut words = Vec::with_capacity(self.env.len() + self.args.len() + 2);
        if !self.env.is_empty() {
            words.push("env".to_string());
            for (key, value) in &self.env {
                words.push(shell_escape(&format!("{}={}", key, value)));
            }
        }
        words.push(shell_escape(&self.program));
        words.extend(self.args.iter().map(|a| shell_escape(a)));
        words.join(" ")
    }

    /// Form safe for logs: secret environment values are masked.
    pub fn redacted(&self) -> Redacted<'_> {
        Redacted(self)
    }
}

pub struct Redacted<'a>(&'a CommandSpec);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.0.env {
            if key.contains("TOKEN") {
                write!(f, "{}=<redacted> ", key)?;
            } else {
                write!(f, "{}={} ", key, value)?;
            }
        }
        write!(f, "{}", self.0.program)?;
        for arg in &self.0.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Completed command: exit code and captured streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs one command on a remote node per call.
///
/// Implementations return `Err(Error::RemoteSession)` only when no session
/// could be established. Whatever the remote command itself does, including
/// a non-zero exit, comes back as `Ok(CommandOutput)`.
pub trait RemoteExecutor {
    fn execute(&self, node: IpAddr, command: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs a program on the local machine.
pub trait LocalRunner {
    fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Local command execution helpers
pub mod local {
    use super::*;
    use std::process::{Command, Stdio};

    /// Production [`LocalRunner`]: spawns the program directly, no shell.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemRunner;

    impl LocalRunner for SystemRunner {
        fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput> {
            tracing::debug!(command = %command.redacted(), "running local command");
            let output = Command::new(&command.program)
                .args(&command.args)
                .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .stdin(Stdio::null())
                .output()?;
            Ok(output.into())
        }
    }

    pub fn check_command_exists(command: &str) -> bool {
        which::which(command).is_ok()
    }
}

/// Run `command` on `node` and fail with [`Error::RemoteCommand`] on a
/// non-zero exit.
pub fn execute_checked<R: RemoteExecutor + ?Sized>(
    remote: &R,
    node: IpAddr,
    step: &str,
    command: &CommandSpec,
) -> Result<CommandOutput> {
    tracing::debug!(%node, step, command = %command.redacted(), "executing remote command");
    let output = remote.execute(node, command)?;
    if !output.success() {
        return Err(Error::RemoteCommand {
            host: node,
            step: step.to_string(),
            code: output.code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_render_shell_quotes_every_word() {
        let cmd = CommandSpec::new("sh")
            .args(["-c", "echo $HOME"])
            .env("K3S_TOKEN", "abc;rm -rf /");
        assert_eq!(
            cmd.render_shell(),
            "env 'K3S_TOKEN=abc;rm -rf /' sh -c 'echo $HOME'"
        );
    }

    #[test]
    fn test_render_shell_without_env() {
        let cmd = CommandSpec::new("/usr/local/bin/k3s-uninstall.sh");
        assert_eq!(cmd.render_shell(), "/usr/local/bin/k3s-uninstall.sh");
    }

    #[test]
    fn test_redacted_masks_tokens() {
        let cmd = CommandSpec::new("sh")
            .arg("-c")
            .env("K3S_URL", "https://10.0.0.1:6443")
            .env("K3S_TOKEN", "supersecret");
        let shown = cmd.redacted().to_string();
        assert!(shown.contains("K3S_URL=https://10.0.0.1:6443"));
        assert!(shown.contains("K3S_TOKEN=<redacted>"));
        assert!(!shown.contains("supersecret"));
    }

    #[test]
    fn test_execute_checked_maps_non_zero_exit() {
        let log = CallLog::default();
        let remote = RecordingRemote::with_responder(log, |_, _| Ok(exit(3, "boom")));
        let node: IpAddr = "10.0.0.9".parse().unwrap();
        let err = execute_checked(&remote, node, "probe", &CommandSpec::new("true")).unwrap_err();
        match err {
            Error::RemoteCommand {
                host, step, code, ..
            } => {
                assert_eq!(host, node);
                assert_eq!(step, "probe");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_value_lookup() {
        let cmd = CommandSpec::new("sh").env("A", "1").env("B", "2");
        assert_eq!(cmd.env_value("B"), Some("2"));
        assert_eq!(cmd.env_value("C"), None);
    }
}
