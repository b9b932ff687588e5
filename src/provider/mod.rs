//! Repository discovery across hosting platforms
//!
//! Each platform implements [`Provider`]. Listings return whatever could be
//! fetched together with the failures met on the way, so one broken
//! organization or page never hides the rest of the results.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ErrorList;
use crate::repository::Repository;
use crate::shutdown::Shutdown;

mod github;
mod gitlab;
pub mod pagination;

pub use github::GitHub;
pub use gitlab::GitLab;
pub use pagination::{collect_pages, Page, RetryPolicy};

/// Default number of items requested per page (platform maximum)
pub const DEFAULT_PAGE_SIZE: u8 = 100;

/// Supported hosting platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Gitlab,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Github => github::NAME,
            ProviderKind::Gitlab => gitlab::NAME,
        }
    }
}

/// Settings shared by every provider implementation
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Base API URL override (GitHub Enterprise, self-hosted GitLab)
    pub endpoint: Option<String>,

    /// Personal access token
    pub access_token: Option<String>,

    /// Items per page
    pub page_size: u8,

    /// Retry policy applied to each page
    pub retry: RetryPolicy,

    /// Cancellation handle observed by every API call
    pub shutdown: Shutdown,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            shutdown: Shutdown::never(),
        }
    }
}

impl ProviderOptions {
    pub(crate) fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub(crate) fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// Failure of a single provider API call or page
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The platform rejected the request (HTTP 4xx); retrying will not help
    #[error("{context}: request rejected with status {status}: {message}")]
    Client {
        context: String,
        status: u16,
        message: String,
    },

    /// The platform failed to answer (HTTP 5xx)
    #[error("{context}: server error {status}: {message}")]
    Server {
        context: String,
        status: u16,
        message: String,
    },

    /// Network or client-side transport failure
    #[error("{context}: {message}")]
    Transport { context: String, message: String },

    /// The response could not be decoded
    #[error("{context}: invalid response: {message}")]
    Decode { context: String, message: String },

    /// A page item could not be turned into a usable repository
    #[error("skipping repository {repository}: {reason}")]
    Normalize { repository: String, reason: String },

    /// Every allowed attempt for one page failed
    #[error("{context}: giving up after {attempts} failed attempt(s)")]
    RetriesExhausted { context: String, attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// HTTP 4xx-equivalent failures
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProviderError::Client { .. })
    }

    /// Whether the same request may succeed when sent again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Server { .. } | ProviderError::Transport { .. }
        )
    }
}

/// Partial results of an enumeration plus everything that went wrong
#[derive(Debug)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub errors: ErrorList,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: ErrorList::new(),
        }
    }
}

impl<T> Listing<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Convert every item, moving conversion failures into the error list
    pub fn try_map<U, E, F>(self, mut convert: F) -> Listing<U>
    where
        F: FnMut(T) -> Result<U, E>,
        E: Into<anyhow::Error>,
    {
        let mut mapped = Listing {
            items: Vec::with_capacity(self.items.len()),
            errors: self.errors,
        };

        for item in self.items {
            match convert(item) {
                Ok(value) => mapped.items.push(value),
                Err(err) => {
                    let err = err.into();
                    tracing::warn!("{:#}", err);
                    mapped.errors.push(err);
                }
            }
        }

        mapped
    }
}

/// A hosting platform able to enumerate organizations and repositories
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static platform identifier ("github", "gitlab")
    fn name(&self) -> &'static str;

    /// Resolve organizations: all visible ones when `filter` is empty,
    /// otherwise each named entry in order.
    async fn organizations(&self, filter: &[String]) -> Listing<String>;

    /// Every repository of an organization, including subgroups where supported
    async fn organization_repositories(&self, org: &str) -> Listing<Repository>;

    /// Every repository of a user; private and collaborator repositories are
    /// included when the credentials belong to that user
    async fn user_repositories(&self, username: &str) -> Listing<Repository>;
}

/// Build the provider selected by `kind`
pub fn build_provider(kind: ProviderKind, options: ProviderOptions) -> Result<Box<dyn Provider>> {
    let provider: Box<dyn Provider> = match kind {
        ProviderKind::Github => Box::new(GitHub::new(options)?),
        ProviderKind::Gitlab => Box::new(GitLab::new(options)?),
    };
    Ok(provider)
}

/// Shared filter-resolution loop: one lookup per name, in order, stopping at
/// the first client error.
pub(crate) async fn resolve_each<F, Fut>(filter: &[String], mut lookup: F) -> Listing<String>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = std::result::Result<String, ProviderError>>,
{
    let mut listing = Listing::default();

    for (idx, name) in filter.iter().enumerate() {
        match lookup(name.clone()).await {
            Ok(resolved) => listing.items.push(resolved),
            Err(err) => {
                let stop = err.is_client_error() || matches!(err, ProviderError::Cancelled);
                tracing::warn!("Failed to resolve {}: {}", name, err);
                listing.errors.push(err);

                if stop {
                    let skipped = filter.len() - idx - 1;
                    if skipped > 0 {
                        tracing::warn!("Abandoning {} remaining name(s) after non-retryable error", skipped);
                    }
                    break;
                }
            }
        }
    }

    listing
}

/// Map a non-success HTTP status onto the provider error classes
pub(crate) fn status_error(context: &str, status: u16, body: &str) -> ProviderError {
    let context = context.to_string();
    let message = error_message(body);

    match status {
        400..=499 => ProviderError::Client {
            context,
            status,
            message,
        },
        500..=599 => ProviderError::Server {
            context,
            status,
            message,
        },
        _ => ProviderError::Transport {
            context,
            message: format!("unexpected status {}", status),
        },
    }
}

/// Pull the human readable part out of an API error body
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["message", "error"].iter().find_map(|key| {
                json.get(*key)
                    .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
            })
        })
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

/// Fail early on obviously broken settings
pub(crate) fn check_page_size(page_size: u8) -> Result<u8> {
    if page_size == 0 {
        return Err(anyhow!("page size must be at least 1"));
    }
    Ok(page_size)
}
