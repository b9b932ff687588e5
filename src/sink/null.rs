use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::Sink;
use crate::repository::Repository;

/// Sink that only logs what it is given
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl Sink for NullSink {
    async fn handle(&mut self, repo: Repository) -> Result<()> {
        debug!("Discovered {}", repo.full_name());
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
