use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// How ssh treats host keys of the servers it connects to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept any host key without recording it
    #[default]
    AcceptAny,
    /// Only connect to hosts already present in known_hosts
    Strict,
}

impl HostKeyPolicy {
    fn ssh_options(&self) -> &'static str {
        match self {
            HostKeyPolicy::AcceptAny => "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
            HostKeyPolicy::Strict => "-o StrictHostKeyChecking=yes",
        }
    }
}

/// Credentials for an SSH clone attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshAuth {
    /// Private key passed to ssh; the agent and default keys are used when unset
    pub key: Option<PathBuf>,
    pub host_keys: HostKeyPolicy,
}

/// One `git clone` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Set for SSH attempts only
    pub ssh: Option<SshAuth>,
}

#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git clone exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("cannot read ssh key {path}: {source}")]
    Key {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const AUTH_FAILURE_PATTERN: &str =
    r"(?i)handshake failed|unable to authenticate|no supported methods remain|permission denied";

fn auth_failure_regex() -> Option<&'static Regex> {
    static AUTH_FAILURE: OnceLock<Option<Regex>> = OnceLock::new();
    AUTH_FAILURE
        .get_or_init(|| Regex::new(AUTH_FAILURE_PATTERN).ok())
        .as_ref()
}

impl CloneError {
    /// Whether the failure looks like rejected credentials rather than a
    /// network or repository problem
    pub fn is_auth_failure(&self) -> bool {
        match self {
            CloneError::Key { .. } => true,
            CloneError::Exit { stderr, .. } => {
                auth_failure_regex().is_some_and(|re| re.is_match(stderr))
            }
            CloneError::Spawn(_) => false,
        }
    }
}

/// Anything able to clone a repository into a directory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Cloner: Send + Sync {
    async fn clone_repo(&self, request: &CloneRequest) -> Result<(), CloneError>;
}

/// Cloner shelling out to the `git` executable
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    fn ssh_command(auth: &SshAuth) -> String {
        let mut command = String::from("ssh -o BatchMode=yes");
        if let Some(key) = &auth.key {
            command.push_str(&format!(" -i {} -o IdentitiesOnly=yes", shell_quote(key)));
        }
        command.push(' ');
        command.push_str(auth.host_keys.ssh_options());
        command
    }
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

#[async_trait]
impl Cloner for GitCli {
    async fn clone_repo(&self, request: &CloneRequest) -> Result<(), CloneError> {
        let mut command = AsyncCommand::new("git");
        command
            .arg("clone")
            .arg(&request.url)
            .arg(&request.destination)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null());

        if let Some(auth) = &request.ssh {
            // Key is checked on every attempt so a rotated key is picked up
            if let Some(key) = &auth.key {
                tokio::fs::File::open(key)
                    .await
                    .map(drop)
                    .map_err(|source| CloneError::Key {
                        path: key.clone(),
                        source,
                    })?;
            }
            command.env("GIT_SSH_COMMAND", Self::ssh_command(auth));
        }

        debug!("git clone {} {}", request.url, request.destination.display());

        let output = command.output().await.map_err(CloneError::Spawn)?;

        if !output.status.success() {
            return Err(CloneError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
