//! Common test utilities and helpers for repo-vacuum tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use repo_vacuum::provider::RetryPolicy;
use repo_vacuum::{ErrorList, Listing, Provider, ProviderError, ProviderOptions, Repository, Shutdown};

/// Build a repository the way a provider would after normalization
pub fn repository(owner: &str, name: &str) -> Repository {
    Repository {
        owner: owner.to_string(),
        path: format!("{}/{}", owner, name),
        name: name.to_string(),
        clone_url: format!("https://x/{}/{}", owner, name),
        ssh_url: String::new(),
        default_branch: "main".to_string(),
        provider: "github",
        owner_url: String::new(),
    }
}

/// Provider options pointing at a mock server, without retry pauses
pub fn options_for(endpoint: &str, token: Option<&str>) -> ProviderOptions {
    ProviderOptions {
        endpoint: Some(endpoint.to_string()),
        access_token: token.map(String::from),
        page_size: 2,
        retry: RetryPolicy::immediate(3),
        shutdown: Shutdown::never(),
    }
}

/// Canned answers per organization; an entry with a status fails with a
/// client error
#[derive(Default)]
pub struct StubProvider {
    pub organizations: Vec<String>,
    pub repositories: HashMap<String, Result<Vec<Repository>, u16>>,
    pub requested: Arc<Mutex<Vec<String>>>,
}

impl StubProvider {
    pub fn with_org(mut self, org: &str, repos: Result<Vec<Repository>, u16>) -> Self {
        self.organizations.push(org.to_string());
        self.repositories.insert(org.to_string(), repos);
        self
    }

    fn listing(&self, target: &str) -> Listing<Repository> {
        self.requested.lock().unwrap().push(target.to_string());

        let mut errors = ErrorList::new();
        let items = match self.repositories.get(target) {
            Some(Ok(repos)) => repos.clone(),
            Some(Err(status)) => {
                errors.push(ProviderError::Client {
                    context: format!("organization {}", target),
                    status: *status,
                    message: "Forbidden".to_string(),
                });
                Vec::new()
            }
            None => Vec::new(),
        };

        Listing { items, errors }
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn organizations(&self, filter: &[String]) -> Listing<String> {
        let items = if filter.is_empty() {
            self.organizations.clone()
        } else {
            filter.to_vec()
        };

        Listing {
            items,
            errors: ErrorList::new(),
        }
    }

    async fn organization_repositories(&self, org: &str) -> Listing<Repository> {
        self.listing(org)
    }

    async fn user_repositories(&self, username: &str) -> Listing<Repository> {
        self.listing(username)
    }
}

/// Writer whose contents stay readable after it was moved into a sink
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
