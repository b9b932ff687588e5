use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::git::HostKeyPolicy;
use crate::provider::{ProviderKind, ProviderOptions, RetryPolicy, DEFAULT_PAGE_SIZE};
use crate::shutdown::Shutdown;
use crate::sink::{OutputKind, SinkOptions};

/// Main configuration structure for repo-vacuum
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Hosting platform and API access
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Where discovered repositories go
    #[serde(default)]
    pub output: OutputConfig,

    /// Organizations and users to vacuum
    #[serde(default)]
    pub targets: Targets,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider selection and API settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    /// github or gitlab; required, either here or on the command line
    pub kind: Option<ProviderKind>,

    /// API base URL for GitHub Enterprise or self-hosted GitLab
    pub endpoint: Option<String>,

    /// Personal access token
    pub access_token: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u8,

    /// Attempts per page before giving up on it
    #[serde(default = "default_max_page_attempts")]
    pub max_page_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Output strategy settings
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub kind: OutputKind,

    /// Root of the cloned tree; empty clones into the current directory
    #[serde(default)]
    pub folder: String,

    /// Private key used for SSH clones
    pub ssh_key: Option<String>,

    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
}

/// Which organizations and users to process
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    /// Organization (or group) names; empty with no users means every visible one
    #[serde(default)]
    pub organizations: Vec<String>,

    #[serde(default)]
    pub users: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Values given on the command line; set fields replace the file's values
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<ProviderKind>,
    pub endpoint: Option<String>,
    pub access_token: Option<String>,
    pub output: Option<OutputKind>,
    pub folder: Option<String>,
    pub ssh_key: Option<String>,
    pub host_key_policy: Option<HostKeyPolicy>,
    pub organizations: Vec<String>,
    pub users: Vec<String>,
}

fn default_page_size() -> u8 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

fn default_retry_delay_ms() -> u64 {
    RetryPolicy::default().delay.as_millis() as u64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: None,
            endpoint: None,
            access_token: None,
            page_size: default_page_size(),
            max_page_attempts: default_max_page_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load `path` when given (it must exist), otherwise the default file if
    /// present, otherwise built-in defaults. Nothing is written to disk.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_config_path() {
            Some(default_path) if default_path.exists() => Self::load(&default_path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;
        tracing::debug!("Loaded configuration from {:?}", path);

        Ok(config)
    }

    /// Default configuration file path (XDG compliant)
    pub fn default_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("repo-vacuum").join("config.yml"))
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.output.folder = shellexpand::full(&self.output.folder)
            .context("Failed to expand output folder path")?
            .into_owned();

        if let Some(ssh_key) = &self.output.ssh_key {
            self.output.ssh_key = Some(
                shellexpand::full(ssh_key)
                    .context("Failed to expand ssh_key path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Apply command-line values on top of the file
    pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
        if overrides.provider.is_some() {
            self.provider.kind = overrides.provider;
        }
        if overrides.endpoint.is_some() {
            self.provider.endpoint = overrides.endpoint;
        }
        if overrides.access_token.is_some() {
            self.provider.access_token = overrides.access_token;
        }
        if let Some(output) = overrides.output {
            self.output.kind = output;
        }
        if let Some(folder) = overrides.folder {
            self.output.folder = folder;
        }
        if overrides.ssh_key.is_some() {
            self.output.ssh_key = overrides.ssh_key;
        }
        if let Some(policy) = overrides.host_key_policy {
            self.output.host_key_policy = policy;
        }
        if !overrides.organizations.is_empty() {
            self.targets.organizations = overrides.organizations;
        }
        if !overrides.users.is_empty() {
            self.targets.users = overrides.users;
        }

        self.expand_paths()
    }

    /// Report settings that make a run impossible
    pub fn validate(&self) -> Result<ProviderKind> {
        let kind = self
            .provider
            .kind
            .ok_or_else(|| anyhow!("No provider configured; pass --provider github|gitlab"))?;

        if self.provider.page_size == 0 {
            return Err(anyhow!("provider.page_size must be at least 1"));
        }

        Ok(kind)
    }

    pub fn provider_options(&self, shutdown: Shutdown) -> ProviderOptions {
        ProviderOptions {
            endpoint: self.provider.endpoint.clone(),
            access_token: self.provider.access_token.clone(),
            page_size: self.provider.page_size,
            retry: RetryPolicy {
                max_attempts: self.provider.max_page_attempts,
                delay: Duration::from_millis(self.provider.retry_delay_ms),
            },
            shutdown,
        }
    }

    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            folder: PathBuf::from(&self.output.folder),
            ssh_key: self.output.ssh_key.as_ref().map(PathBuf::from),
            host_key_policy: self.output.host_key_policy,
        }
    }
}
