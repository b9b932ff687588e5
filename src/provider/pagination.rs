//! Page-by-page collection with bounded retries

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tracing::{debug, warn};

use super::{Listing, ProviderError};
use crate::shutdown::Shutdown;

/// One page of results and the cursor of the following page, if any
#[derive(Debug)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next: Option<C>,
}

/// How often a failing page is requested again before giving up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first one
    pub max_attempts: u32,

    /// Pause between two attempts on the same page
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Policy without pauses, for tests and local endpoints
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Fetch every page starting at `first`, following `next` cursors.
///
/// Failed attempts are recorded in the returned listing. Client errors and
/// cancellation end the loop at once; other failures retry the same cursor
/// until `policy.max_attempts` is reached.
pub async fn collect_pages<T, C, F, Fut>(
    context: &str,
    first: C,
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    mut fetch: F,
) -> Listing<T>
where
    C: Clone + std::fmt::Debug,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<Page<T, C>, ProviderError>>,
{
    let mut listing = Listing::default();
    let mut cursor = first;
    let mut page_number = 1u32;
    let retries = policy.max_attempts.max(1) as usize - 1;

    loop {
        debug!("Fetching {} page {} ({:?})", context, page_number, cursor);

        let mut failures: Vec<ProviderError> = Vec::new();
        let backoff = ConstantBuilder::default()
            .with_delay(policy.delay)
            .with_max_times(retries);

        let result = shutdown
            .guard(
                (|| fetch(cursor.clone()))
                    .retry(backoff)
                    .when(ProviderError::is_retryable)
                    .notify(|err: &ProviderError, delay: Duration| {
                        warn!(
                            "{} page {} failed (attempt {}), retrying in {:?}: {}",
                            context,
                            page_number,
                            failures.len() + 1,
                            delay,
                            err
                        );
                        failures.push(err.clone());
                    }),
            )
            .await;

        let attempts = failures.len() as u32 + 1;
        listing.errors.extend(failures.into_iter().map(anyhow::Error::from));

        match result {
            Ok(page) => {
                debug!("{} page {} returned {} item(s)", context, page_number, page.items.len());
                listing.items.extend(page.items);

                match page.next {
                    Some(next) => {
                        cursor = next;
                        page_number += 1;
                    }
                    None => break,
                }
            }
            Err(err) => {
                // a retryable error only surfaces here once the backoff ran out
                let exhausted = err.is_retryable();
                warn!("{} page {} failed (attempt {}): {}", context, page_number, attempts, err);
                listing.errors.push(err);

                if exhausted {
                    listing.errors.push(ProviderError::RetriesExhausted {
                        context: format!("{} page {}", context, page_number),
                        attempts,
                    });
                }
                break;
            }
        }
    }

    listing
}
