use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use path_clean::PathClean;
use tracing::{debug, info, warn};

use super::{Sink, SinkOptions};
use crate::git::{CloneRequest, Cloner, SshAuth};
use crate::repository::Repository;

/// Clones every repository to `<folder>/<owner>/<name>`, preferring SSH
pub struct FilesystemSink<C> {
    cloner: C,
    options: SinkOptions,
}

impl<C: Cloner> FilesystemSink<C> {
    pub fn new(cloner: C, options: SinkOptions) -> Self {
        Self { cloner, options }
    }

    /// Target directory of a repository
    pub fn destination(&self, repo: &Repository) -> PathBuf {
        self.options
            .folder
            .join(&repo.owner)
            .join(&repo.name)
            .clean()
    }

    async fn clone_https(&self, repo: &Repository, destination: PathBuf) -> Result<()> {
        if repo.clone_url.is_empty() {
            return Err(anyhow!("{} has no HTTPS clone URL", repo.full_name()));
        }

        let request = CloneRequest {
            url: repo.clone_url.clone(),
            destination,
            ssh: None,
        };

        self.cloner
            .clone_repo(&request)
            .await
            .with_context(|| format!("Failed to clone {} over HTTPS", repo.full_name()))
    }
}

#[async_trait]
impl<C: Cloner> Sink for FilesystemSink<C> {
    async fn handle(&mut self, repo: Repository) -> Result<()> {
        let destination = self.destination(&repo);
        info!("Cloning {} -> {}", repo.full_name(), destination.display());

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        if repo.ssh_url.is_empty() {
            debug!("No SSH URL for {}, using HTTPS", repo.full_name());
            return self.clone_https(&repo, destination).await;
        }

        let request = CloneRequest {
            url: repo.ssh_url.clone(),
            destination: destination.clone(),
            ssh: Some(SshAuth {
                key: self.options.ssh_key.clone(),
                host_keys: self.options.host_key_policy,
            }),
        };

        match self.cloner.clone_repo(&request).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_auth_failure() => {
                warn!("SSH authentication failed for {}, retrying over HTTPS: {}", repo.full_name(), err);
                self.clone_https(&repo, destination).await
            }
            Err(err) => Err(err).with_context(|| format!("Failed to clone {} over SSH", repo.full_name())),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
