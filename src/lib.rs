//! repo-vacuum - Repository discovery and delivery
//!
//! repo-vacuum enumerates every repository of GitHub or GitLab organizations
//! and users, then hands each one to an output strategy: clone it to disk,
//! describe it in a repo-tool XML manifest, or just log it.
//!
//! ## Modules
//!
//! - [`provider`]: Hosting platform APIs, pagination and retries
//! - [`sink`]: Output strategies (filesystem, manifest, nil)
//! - [`vacuum`]: Run orchestration
//! - [`config`]: Configuration management and parsing
//! - [`git`]: `git clone` invocation
//! - [`error`]: Error aggregation across a run

pub mod config;
pub mod error;
pub mod git;
pub mod provider;
pub mod repository;
pub mod shutdown;
pub mod sink;
pub mod vacuum;

pub use config::{Config, Overrides, Targets};
pub use error::{ErrorList, RunFailed};
pub use provider::{build_provider, Listing, Provider, ProviderError, ProviderKind, ProviderOptions};
pub use repository::{RawRepository, Repository};
pub use shutdown::Shutdown;
pub use sink::{build_sink, OutputKind, Sink, SinkOptions};
pub use vacuum::{RunReport, Vacuum};
