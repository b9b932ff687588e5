//! Vacuum run - walks every target and feeds its repositories to the sink
//!
//! Targets are processed one after the other. Failures of one target or one
//! repository are recorded in the run's [`ErrorList`] and never stop the rest
//! of the run.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::Targets;
use crate::error::ErrorList;
use crate::provider::{Listing, Provider};
use crate::repository::Repository;
use crate::sink::Sink;

/// Outcome of a complete run
#[derive(Debug)]
pub struct RunReport {
    /// Organizations and users whose repositories were requested
    pub targets: usize,
    /// Repositories handed to the sink
    pub repositories: usize,
    pub duration: Duration,
    pub errors: ErrorList,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Couples one provider with one sink for a run
pub struct Vacuum {
    provider: Box<dyn Provider>,
    sink: Box<dyn Sink>,
}

impl Vacuum {
    pub fn new(provider: Box<dyn Provider>, sink: Box<dyn Sink>) -> Self {
        Self { provider, sink }
    }

    /// Enumerate every target and deliver each repository, then flush the sink
    pub async fn run(&mut self, targets: &Targets) -> RunReport {
        let start_time = Instant::now();
        let mut report = RunReport {
            targets: 0,
            repositories: 0,
            duration: Duration::ZERO,
            errors: ErrorList::new(),
        };

        let org_phase = !targets.organizations.is_empty() || targets.users.is_empty();
        if org_phase {
            self.organization_phase(&targets.organizations, &mut report)
                .await;
        }

        if !targets.users.is_empty() {
            self.user_phase(&targets.users, &mut report).await;
        }

        if let Err(e) = self.sink.flush().await {
            error!("Failed to flush output: {:#}", e);
            report.errors.push(e);
        }

        report.duration = start_time.elapsed();
        info!(
            "Run completed in {:.2}s: {} target(s), {} repositories, {} error(s)",
            report.duration.as_secs_f64(),
            report.targets,
            report.repositories,
            report.errors.len()
        );

        report
    }

    async fn organization_phase(&mut self, filter: &[String], report: &mut RunReport) {
        if filter.is_empty() {
            info!("Discovering every visible {} organization", self.provider.name());
        } else {
            info!("Resolving {} {} organization(s)", filter.len(), self.provider.name());
        }

        let orgs = self.provider.organizations(filter).await;
        report.errors.merge(orgs.errors);

        for org in orgs.items {
            info!("Processing organization {}", org);
            report.targets += 1;

            let listing = self.provider.organization_repositories(&org).await;
            self.deliver(listing, report).await;
        }
    }

    async fn user_phase(&mut self, users: &[String], report: &mut RunReport) {
        for user in users {
            info!("Processing user {}", user);
            report.targets += 1;

            let listing = self.provider.user_repositories(user).await;
            self.deliver(listing, report).await;
        }
    }

    async fn deliver(&mut self, listing: Listing<Repository>, report: &mut RunReport) {
        if !listing.errors.is_empty() {
            warn!("{} error(s) while listing repositories", listing.errors.len());
        }
        report.errors.merge(listing.errors);

        for repo in listing.items {
            let full_name = repo.full_name();
            report.repositories += 1;

            if let Err(e) = self.sink.handle(repo).await {
                error!("Failed to handle {}: {:#}", full_name, e);
                report.errors.push(e.context(format!("repository {}", full_name)));
            }
        }
    }
}
