//! Error types for cluster bootstrap

use std::net::IpAddr;
use std::path::PathBuf;

/// Bootstrap Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Bootstrap errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    ConfigValidation { message: String },

    #[error("required tool '{tool}' not found in PATH")]
    ToolNotFound { tool: String },

    #[error("cannot open SSH session to {host}: {message}")]
    RemoteSession { host: IpAddr, message: String },

    #[error("{step} on {host} failed ({}): {}", describe_exit(.code), summarize(.stderr))]
    RemoteCommand {
        host: IpAddr,
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{what} missing or empty on {host} ({path})")]
    CredentialRetrieval {
        host: IpAddr,
        what: &'static str,
        path: &'static str,
    },

    #[error("failed to write credentials to {path}: {source}")]
    CredentialWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CNI step '{step}' failed: {message}")]
    CniApply { step: String, message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
        }
    }

    /// Remote command could not be found on the node (shell exit 127).
    pub fn is_command_not_found(&self) -> bool {
        matches!(self, Error::RemoteCommand { code: Some(127), .. })
    }

    pub fn is_session_failure(&self) -> bool {
        matches!(self, Error::RemoteSession { .. })
    }
}

pub(crate) fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn summarize(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "no error output".to_string();
    }
    // Installers are chatty; the last line is usually the one that matters.
    trimmed.lines().last().unwrap_or(trimmed).to_string()
}
