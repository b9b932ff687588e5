//! Platform-agnostic repository record

use crate::provider::ProviderError;

/// One discovered repository, normalized from a provider page item.
///
/// Values are only produced through [`RawRepository::normalize`], which
/// guarantees a non-empty `owner` and `name` and at least one clone URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Owning organization, group or user
    pub owner: String,

    /// Full namespaced path (e.g. "group/subgroup/name"), may be empty
    pub path: String,

    /// Repository name
    pub name: String,

    /// HTTPS clone URL
    pub clone_url: String,

    /// SSH clone URL
    pub ssh_url: String,

    /// Default branch, empty when the platform did not report one
    pub default_branch: String,

    /// Name of the provider that produced this record
    pub provider: &'static str,

    /// Web URL of the top-level owner, used to group manifest remotes
    pub owner_url: String,
}

impl Repository {
    /// Display name in owner/name format
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Key under which repositories share a manifest remote.
    ///
    /// First segment of the full path, or the owner when no path is known.
    pub fn remote_root(&self) -> &str {
        match self.path.split('/').next() {
            Some(segment) if !segment.is_empty() && self.path.contains('/') => segment,
            _ => &self.owner,
        }
    }

    /// Path relative to the manifest root
    pub fn relative_path(&self) -> String {
        if self.path.is_empty() {
            self.full_name()
        } else {
            self.path.clone()
        }
    }
}

/// Unvalidated repository fields as decoded from one API page item
#[derive(Debug, Clone, Default)]
pub struct RawRepository {
    pub owner: Option<String>,
    pub path: Option<String>,
    pub name: Option<String>,
    pub clone_url: Option<String>,
    pub ssh_url: Option<String>,
    pub default_branch: Option<String>,
    pub owner_url: Option<String>,
}

impl RawRepository {
    /// Validate the raw fields and build a [`Repository`]
    pub fn normalize(self, provider: &'static str) -> Result<Repository, ProviderError> {
        let owner = non_empty(self.owner);
        let name = non_empty(self.name);
        let path = non_empty(self.path).unwrap_or_default();

        let label = match (&owner, &name) {
            (Some(owner), Some(name)) => format!("{}/{}", owner, name),
            _ if !path.is_empty() => path.clone(),
            _ => "<unnamed repository>".to_string(),
        };

        let (Some(owner), Some(name)) = (owner, name) else {
            return Err(ProviderError::Normalize {
                repository: label,
                reason: "missing owner or name".to_string(),
            });
        };

        let clone_url = non_empty(self.clone_url).unwrap_or_default();
        let ssh_url = non_empty(self.ssh_url).unwrap_or_default();
        if clone_url.is_empty() && ssh_url.is_empty() {
            return Err(ProviderError::Normalize {
                repository: label,
                reason: "no clone URL".to_string(),
            });
        }

        Ok(Repository {
            owner,
            path,
            name,
            clone_url,
            ssh_url,
            default_branch: non_empty(self.default_branch).unwrap_or_default(),
            provider,
            owner_url: non_empty(self.owner_url).unwrap_or_default(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
