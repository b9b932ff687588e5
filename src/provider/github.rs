use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::{FromResponse, Octocrab};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    check_page_size, collect_pages, resolve_each, status_error, Listing, Page, Provider, ProviderError,
    ProviderOptions, RetryPolicy,
};
use crate::error::ErrorList;
use crate::repository::{RawRepository, Repository};
use crate::shutdown::Shutdown;

pub(super) const NAME: &str = "github";

/// GitHub (and GitHub Enterprise) provider backed by octocrab
pub struct GitHub {
    client: Octocrab,
    authenticated: bool,
    page_size: u8,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

#[derive(Debug, Deserialize)]
struct GitHubOwner {
    login: String,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    owner: Option<GitHubOwner>,
    #[serde(default)]
    clone_url: Option<String>,
    #[serde(default)]
    ssh_url: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubOrganization {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

impl From<GitHubRepository> for RawRepository {
    fn from(repo: GitHubRepository) -> Self {
        let (owner, owner_url) = match repo.owner {
            Some(owner) => (Some(owner.login), owner.html_url),
            None => (None, None),
        };

        RawRepository {
            owner,
            path: repo.full_name,
            name: repo.name,
            clone_url: repo.clone_url,
            ssh_url: repo.ssh_url,
            default_branch: repo.default_branch,
            owner_url,
        }
    }
}

impl GitHub {
    /// Create a GitHub provider, pointing at `options.endpoint` when set
    pub fn new(options: ProviderOptions) -> Result<Self> {
        let page_size = check_page_size(options.page_size)?;
        // pages are retried by collect_pages
        let mut builder = Octocrab::builder().add_retry_config(RetryConfig::None);

        if let Some(endpoint) = options.endpoint() {
            debug!("Using GitHub endpoint {}", endpoint);
            builder = builder
                .base_uri(endpoint.to_string())
                .with_context(|| format!("Invalid GitHub endpoint: {}", endpoint))?;
        }

        let authenticated = match options.token() {
            Some(token) => {
                builder = builder.personal_token(token.to_string());
                true
            }
            None => false,
        };

        let client = builder.build().context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            authenticated,
            page_size,
            retry: options.retry,
            shutdown: options.shutdown,
        })
    }

    /// GET `route` and decode the body. The status is classified before
    /// decoding, so a plain-text 4xx is still a client error.
    async fn get_checked<R: FromResponse>(&self, context: &str, route: &str) -> Result<R, ProviderError> {
        let response = self
            .client
            ._get(route)
            .await
            .map_err(|e| ProviderError::Transport {
                context: context.to_string(),
                message: first_line(&e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = self.client.body_to_string(response).await.unwrap_or_default();
            return Err(status_error(context, status.as_u16(), &body));
        }

        R::from_response(response).await.map_err(|e| ProviderError::Decode {
            context: context.to_string(),
            message: first_line(&e),
        })
    }

    /// Fetch one page; `route` is either a relative route or the absolute
    /// URL taken from the previous page's `Link: rel="next"` header.
    async fn fetch_page<T: DeserializeOwned>(
        &self,
        context: &str,
        route: String,
    ) -> Result<Page<T, String>, ProviderError> {
        let page: octocrab::Page<T> = self.get_checked(context, &route).await?;

        Ok(Page {
            next: page.next.map(|uri| uri.to_string()),
            items: page.items,
        })
    }

    async fn fetch_one<T: DeserializeOwned>(&self, context: &str, route: String) -> Result<T, ProviderError> {
        self.shutdown
            .guard(self.get_checked::<T>(context, &route))
            .await
    }

    async fn list_repositories(&self, context: &str, first_route: String) -> Listing<Repository> {
        let raw: Listing<GitHubRepository> = collect_pages(
            context,
            first_route,
            &self.retry,
            &self.shutdown,
            |route| self.fetch_page(context, route),
        )
        .await;

        let repositories = raw.try_map(|repo| RawRepository::from(repo).normalize(NAME));
        info!("Found {} repositories for {}", repositories.len(), context);
        repositories
    }

    /// Whether the token belongs to `username`
    async fn is_authenticated_as(&self, username: &str) -> Result<bool, ProviderError> {
        if !self.authenticated {
            return Ok(false);
        }

        let user: GitHubUser = self
            .fetch_one("authenticated user", "/user".to_string())
            .await?;
        debug!("Authenticated as GitHub user: {}", user.login);

        Ok(user.login.eq_ignore_ascii_case(username))
    }
}

#[async_trait]
impl Provider for GitHub {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn organizations(&self, filter: &[String]) -> Listing<String> {
        if !filter.is_empty() {
            return resolve_each(filter, |org| async move {
                let context = format!("organization {}", org);
                let found: GitHubOrganization = self.fetch_one(&context, format!("/orgs/{}", org)).await?;
                Ok(found.login)
            })
            .await;
        }

        debug!("Listing every visible GitHub organization");
        let orgs: Listing<GitHubOrganization> = collect_pages(
            "organizations",
            format!("/organizations?per_page={}", self.page_size),
            &self.retry,
            &self.shutdown,
            |route| self.fetch_page("organizations", route),
        )
        .await;

        orgs.try_map(|org| Ok::<_, ProviderError>(org.login))
    }

    async fn organization_repositories(&self, org: &str) -> Listing<Repository> {
        let context = format!("organization {}", org);
        let route = format!("/orgs/{}/repos?type=all&per_page={}", org, self.page_size);
        self.list_repositories(&context, route).await
    }

    async fn user_repositories(&self, username: &str) -> Listing<Repository> {
        let context = format!("user {}", username);
        let mut identity_errors = ErrorList::new();

        let own_account = match self.is_authenticated_as(username).await {
            Ok(own) => own,
            Err(err) => {
                warn!("Could not determine authenticated GitHub user: {}", err);
                identity_errors.push(err);
                false
            }
        };

        let route = if own_account {
            debug!("{} is the authenticated user, including private and collaborator repositories", username);
            format!(
                "/user/repos?visibility=all&affiliation=owner,collaborator&per_page={}",
                self.page_size
            )
        } else {
            format!("/users/{}/repos?type=owner&per_page={}", username, self.page_size)
        };

        let mut listing = self.list_repositories(&context, route).await;
        identity_errors.merge(listing.errors);
        listing.errors = identity_errors;
        listing
    }
}

/// octocrab errors render their backtrace after the message
fn first_line(err: &octocrab::Error) -> String {
    err.to_string().lines().next().unwrap_or_default().trim().to_string()
}
