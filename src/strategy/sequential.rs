//! Sequential replay strategy
//!
//! Streams the script through the synchronous [`SyncReader`] and applies
//! each command in file order, waiting for one to finish before starting the
//! next. Replays are fully deterministic.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::io::sync_reader::SyncReader;
use crate::strategy::{ReplayHarness, ReplayReport, ReplayStrategy};
use crate::types::TransferError;

#[derive(Debug, Clone, Copy)]
pub struct SequentialStrategy;

#[async_trait]
impl ReplayStrategy for SequentialStrategy {
    async fn replay(
        &self,
        script: &Path,
        harness: Arc<ReplayHarness>,
    ) -> Result<ReplayReport, TransferError> {
        let reader = SyncReader::new(script)?;
        let mut skipped = 0;

        for result in reader {
            match result {
                Ok(command) => harness.apply(&command).await,
                Err(e) => {
                    warn!(error = %e, "skipping command row");
                    skipped += 1;
                }
            }
        }

        Ok(harness.report(skipped))
    }
}
