use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use tracing::debug;

use super::Sink;
use crate::repository::Repository;

/// `<remote>` entry shared by every project under one root namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub fetch: String,
}

/// `<project>` entry, one per repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub remote: String,
    pub path: String,
    pub revision: String,
}

/// Accumulates repositories and writes them as a repo-tool manifest on flush
pub struct ManifestSink<W> {
    writer: W,
    remote_by_root: HashMap<String, usize>,
    remotes: Vec<Remote>,
    projects: Vec<Project>,
}

impl ManifestSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ManifestSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            remote_by_root: HashMap::new(),
            remotes: Vec::new(),
            projects: Vec::new(),
        }
    }

    pub fn remotes(&self) -> &[Remote] {
        &self.remotes
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn add(&mut self, repo: &Repository) {
        let root = repo.remote_root().to_string();
        // remote names are lowercase, so roots differing only in case share one
        let key = format!("{}/{}", repo.provider, root).to_lowercase();

        let idx = match self.remote_by_root.get(&key) {
            Some(idx) => *idx,
            None => {
                let remote = Remote {
                    name: format!("{}-{}", repo.provider, root).to_lowercase(),
                    fetch: fetch_url(repo, &root),
                };
                debug!("New manifest remote {} -> {}", remote.name, remote.fetch);

                self.remotes.push(remote);
                self.remote_by_root.insert(key, self.remotes.len() - 1);
                self.remotes.len() - 1
            }
        };

        self.projects.push(Project {
            name: repo.name.clone(),
            remote: self.remotes[idx].name.clone(),
            path: repo.relative_path(),
            revision: repo.default_branch.clone(),
        });
    }

    /// Serialize the current state without changing it
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("manifest")))?;

        for remote in &self.remotes {
            let element = BytesStart::new("remote").with_attributes([
                ("name", remote.name.as_str()),
                ("fetch", remote.fetch.as_str()),
            ]);
            writer.write_event(Event::Empty(element))?;
        }

        for project in &self.projects {
            let element = BytesStart::new("project").with_attributes([
                ("name", project.name.as_str()),
                ("remote", project.remote.as_str()),
                ("path", project.path.as_str()),
                ("revision", project.revision.as_str()),
            ]);
            writer.write_event(Event::Empty(element))?;
        }

        writer.write_event(Event::End(BytesEnd::new("manifest")))?;

        let mut document = writer.into_inner();
        document.push(b'\n');
        Ok(document)
    }
}

/// Fetch base of a remote: the owner's web URL, or the clone URL cut after
/// the root namespace
fn fetch_url(repo: &Repository, root: &str) -> String {
    if !repo.owner_url.is_empty() {
        return repo.owner_url.clone();
    }

    let url = if repo.clone_url.is_empty() {
        &repo.ssh_url
    } else {
        &repo.clone_url
    };

    truncate_after_root(url, root)
}

fn truncate_after_root(url: &str, root: &str) -> String {
    for separator in ['/', ':'] {
        let needle = format!("{}{}", separator, root);
        let mut search_from = 0;

        while let Some(found) = url[search_from..].find(&needle) {
            let end = search_from + found + needle.len();
            if url[end..].is_empty() || url[end..].starts_with('/') {
                return url[..end].to_string();
            }
            search_from = end;
        }
    }

    url.to_string()
}

#[async_trait]
impl<W: Write + Send> Sink for ManifestSink<W> {
    async fn handle(&mut self, repo: Repository) -> Result<()> {
        self.add(&repo);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let document = self.render()?;
        self.writer
            .write_all(&document)
            .and_then(|_| self.writer.flush())
            .context("Failed to write manifest")
    }
}
