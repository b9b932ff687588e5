//! Error aggregation for a single vacuum run
//!
//! Failures that must not stop the run (one organization that cannot be listed,
//! one repository that cannot be cloned) are collected into an [`ErrorList`]
//! and handed back to the caller once everything else has been processed.

use std::fmt;

/// Ordered collection of independent failures.
///
/// Every entry keeps its original error value, so callers can still
/// `downcast_ref` to the typed error that produced it.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<anyhow::Error>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure
    pub fn push(&mut self, error: impl Into<anyhow::Error>) {
        self.errors.push(error.into());
    }

    /// Append every failure of `other`, keeping its order
    pub fn merge(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &anyhow::Error> {
        self.errors.iter()
    }

    /// Turn the aggregate into a `Result`, failing when anything was recorded
    pub fn into_result(self) -> Result<(), RunFailed> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RunFailed { errors: self })
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.errors.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{:#}", error)?;
        }
        Ok(())
    }
}

impl IntoIterator for ErrorList {
    type Item = anyhow::Error;
    type IntoIter = std::vec::IntoIter<anyhow::Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl Extend<anyhow::Error> for ErrorList {
    fn extend<I: IntoIterator<Item = anyhow::Error>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

/// A run that completed but recorded one or more failures
#[derive(Debug, thiserror::Error)]
#[error("{count} error(s) occurred: {errors}", count = .errors.len())]
pub struct RunFailed {
    pub errors: ErrorList,
}
