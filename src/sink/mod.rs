//! Destinations for discovered repositories
//!
//! The orchestrator hands every repository to a [`Sink`] one at a time and
//! calls [`Sink::flush`] once at the end of the run.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::git::{GitCli, HostKeyPolicy};
use crate::repository::Repository;

mod filesystem;
mod manifest;
mod null;

pub use filesystem::FilesystemSink;
pub use manifest::{ManifestSink, Project, Remote};
pub use null::NullSink;

/// Output strategy selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Clone every repository below the output folder
    #[default]
    Filesystem,
    /// Discard repositories (discovery only)
    Nil,
    /// Print a repo-tool XML manifest on stdout
    Repo,
}

/// Settings used by the sinks that need them
#[derive(Debug, Clone, Default)]
pub struct SinkOptions {
    /// Root of the cloned tree; empty means the current directory
    pub folder: PathBuf,

    /// Private key for SSH clones
    pub ssh_key: Option<PathBuf>,

    pub host_key_policy: HostKeyPolicy,
}

#[async_trait]
pub trait Sink: Send {
    /// Deliver one repository
    async fn handle(&mut self, repo: Repository) -> Result<()>;

    /// Finish the run; called exactly once
    async fn flush(&mut self) -> Result<()>;
}

/// Build the sink selected by `kind`
pub fn build_sink(kind: OutputKind, options: SinkOptions) -> Box<dyn Sink> {
    match kind {
        OutputKind::Filesystem => Box::new(FilesystemSink::new(GitCli::new(), options)),
        OutputKind::Nil => Box::new(NullSink),
        OutputKind::Repo => Box::new(ManifestSink::stdout()),
    }
}
