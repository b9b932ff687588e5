use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Url};
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

pub(super) const NAME: &str = "gitlab";

const DEFAULT_ENDPOINT: &str = "https://gitlab.com";
const API_PREFIX: &str = "/api/v4";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// GitLab provider talking to the v4 REST API
pub struct GitLab {
    http: Client,
    base: Url,
    token: Option<String>,
    page_size: u8,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

#[derive(Debug, Deserialize)]
struct GitLabGroup {
    full_path: String,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path_with_namespace: Option<String>,
    #[serde(default)]
    http_url_to_repo: Option<String>,
    #[serde(default)]
    ssh_url_to_repo: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    web_url: Option<String>,
}

impl GitLabProject {
    /// Convert, attributing the project to the group or user it was listed under
    fn into_raw(self, owner: &str) -> RawRepository {
        let owner_url = match (&self.web_url, &self.path_with_namespace) {
            (Some(web_url), Some(path)) => root_web_url(web_url, path),
            _ => None,
        };

        RawRepository {
            owner: Some(owner.to_string()),
            path: self.path_with_namespace,
            name: self.name,
            clone_url: self.http_url_to_repo,
            ssh_url: self.ssh_url_to_repo,
            default_branch: self.default_branch,
            owner_url,
        }
    }
}

/// Web URL of the top-level namespace of a project.
///
/// `https://gitlab.com/platform/backend/api` with path `platform/backend/api`
/// gives `https://gitlab.com/platform`.
fn root_web_url(web_url: &str, path_with_namespace: &str) -> Option<String> {
    let host = web_url
        .trim_end_matches('/')
        .strip_suffix(path_with_namespace)?;
    let root = path_with_namespace.split('/').next()?;
    Some(format!("{}{}", host, root))
}

/// Normalize a user supplied endpoint to the v4 API root (always ending in '/')
fn api_base(endpoint: Option<&str>) -> Result<Url> {
    let raw = endpoint.unwrap_or(DEFAULT_ENDPOINT).trim_end_matches('/');
    let with_api = if raw.ends_with(API_PREFIX) {
        format!("{}/", raw)
    } else {
        format!("{}{}/", raw, API_PREFIX)
    };

    let url = Url::parse(&with_api).with_context(|| format!("Invalid GitLab endpoint: {}", raw))?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("GitLab endpoint is not a base URL: {}", raw));
    }
    Ok(url)
}

fn next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(NEXT_PAGE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

impl GitLab {
    /// Create a GitLab provider for gitlab.com or `options.endpoint`
    pub fn new(options: ProviderOptions) -> Result<Self> {
        let page_size = check_page_size(options.page_size)?;
        let base = api_base(options.endpoint())?;
        debug!("Using GitLab API at {}", base);

        let http = Client::builder()
            .user_agent(concat!("repo-vacuum/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create GitLab HTTP client")?;

        Ok(Self {
            http,
            base,
            token: options.token().map(String::from),
            page_size,
            retry: options.retry,
            shutdown: options.shutdown,
        })
    }

    /// Build an API URL from raw path segments; each segment is percent-encoded
    /// so group paths like "platform/backend" stay one segment.
    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        context: &str,
        url: Url,
    ) -> Result<(T, HeaderMap), ProviderError> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }

        let response = request.send().await.map_err(|e| ProviderError::Transport {
            context: context.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(context, status.as_u16(), &body));
        }

        let headers = response.headers().clone();
        let body = response.json::<T>().await.map_err(|e| ProviderError::Decode {
            context: context.to_string(),
            message: e.to_string(),
        })?;

        Ok((body, headers))
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        context: &str,
        segments: &[&str],
        query: &[(&str, String)],
        page: u32,
    ) -> Result<Page<T, u32>, ProviderError> {
        let mut query = query.to_vec();
        query.push(("per_page", self.page_size.to_string()));
        query.push(("page", page.to_string()));

        let (items, headers) = self
            .get_json::<Vec<T>>(context, self.endpoint(segments, &query))
            .await?;

        Ok(Page {
            items,
            next: next_page(&headers),
        })
    }

    async fn fetch_one<T: DeserializeOwned>(&self, context: &str, segments: &[&str]) -> Result<T, ProviderError> {
        let url = self.endpoint(segments, &[]);
        self.shutdown
            .guard(async { self.get_json::<T>(context, url).await.map(|(body, _)| body) })
            .await
    }

    async fn list_projects(
        &self,
        owner: &str,
        context: &str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Listing<Repository> {
        let raw: Listing<GitLabProject> = collect_pages(context, 1u32, &self.retry, &self.shutdown, |page| {
            self.fetch_page(context, segments, query, page)
        })
        .await;

        let repositories = raw.try_map(|project| project.into_raw(owner).normalize(NAME));
        info!("Found {} repositories for {}", repositories.len(), context);
        repositories
    }

    async fn is_authenticated_as(&self, username: &str) -> Result<bool, ProviderError> {
        if self.token.is_none() {
            return Ok(false);
        }

        let user: GitLabUser = self.fetch_one("authenticated user", &["user"]).await?;
        debug!("Authenticated as GitLab user: {}", user.username);

        Ok(user.username.eq_ignore_ascii_case(username))
    }
}

#[async_trait]
impl Provider for GitLab {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn organizations(&self, filter: &[String]) -> Listing<String> {
        if !filter.is_empty() {
            return resolve_each(filter, |group| async move {
                let context = format!("group {}", group);
                let found: GitLabGroup = self.fetch_one(&context, &["groups", group.as_str()]).await?;
                Ok(found.full_path)
            })
            .await;
        }

        debug!("Listing every visible GitLab group");
        let query = [("top_level_only", "true".to_string())];
        let groups: Listing<GitLabGroup> = collect_pages("groups", 1u32, &self.retry, &self.shutdown, |page| {
            self.fetch_page("groups", &["groups"], &query, page)
        })
        .await;

        groups.try_map(|group| Ok::<_, ProviderError>(group.full_path))
    }

    async fn organization_repositories(&self, org: &str) -> Listing<Repository> {
        let context = format!("group {}", org);
        let query = [("include_subgroups", "true".to_string())];
        self.list_projects(org, &context, &["groups", org, "projects"], &query)
            .await
    }

    async fn user_repositories(&self, username: &str) -> Listing<Repository> {
        let context = format!("user {}", username);
        let mut identity_errors = ErrorList::new();

        let own_account = match self.is_authenticated_as(username).await {
            Ok(own) => own,
            Err(err) => {
                warn!("Could not determine authenticated GitLab user: {}", err);
                identity_errors.push(err);
                false
            }
        };

        let mut listing = if own_account {
            debug!("{} is the authenticated user, including private and member projects", username);
            let query = [("membership", "true".to_string())];
            self.list_projects(username, &context, &["projects"], &query)
                .await
        } else {
            self.list_projects(username, &context, &["users", username, "projects"], &[])
                .await
        };

        identity_errors.merge(listing.errors);
        listing.errors = identity_errors;
        listing
    }
}
