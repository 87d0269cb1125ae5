//! Concurrent replay strategy
//!
//! Reads the script in batches with the async CSV reader and replays each
//! batch with label-based partitioning.
//!
//! # Architecture
//!
//! ```text
//! ConcurrentStrategy
//!     ├── BatchConfig (batch_size, max_concurrent)
//!     ├── AsyncReader (batch CSV reading)
//!     └── per-label tokio tasks → ReplayHarness → TransactionEngine
//! ```
//!
//! # Ordering
//!
//! - Batches are processed one after another, so a label's commands keep
//!   their file order even when they span batches
//! - Within a batch, commands are grouped by label; each group runs in its
//!   own tokio task, in order, while groups run in parallel
//! - A `sweep` row is a barrier: everything before it finishes first, then
//!   the sweep runs alone
//!
//! Commands of different labels may interleave arbitrarily. Their outcomes
//! are only deterministic when they do not compete for the same funds.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{error, warn};

use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::{Action, ReplayCommand};
use crate::strategy::{ReplayHarness, ReplayReport, ReplayStrategy};
use crate::types::TransferError;

/// Batch settings for the concurrent strategy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Rows read from the script per batch
    pub batch_size: usize,
    /// Upper bound on label tasks running at the same time
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a config, replacing zero values with the defaults
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(default = default.batch_size, "invalid batch_size 0, using default");
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent = if max_concurrent == 0 {
            warn!(default = default.max_concurrent, "invalid max_concurrent 0, using default");
            default.max_concurrent
        } else {
            max_concurrent
        };

        Self {
            batch_size,
            max_concurrent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConcurrentStrategy {
    config: BatchConfig,
}

impl ConcurrentStrategy {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}

/// Group commands by label, keeping file order within each group
pub fn partition_by_label(commands: Vec<ReplayCommand>) -> HashMap<String, Vec<ReplayCommand>> {
    let mut groups: HashMap<String, Vec<ReplayCommand>> = HashMap::new();
    for command in commands {
        groups.entry(command.label.clone()).or_default().push(command);
    }
    groups
}

async fn replay_partitioned(
    commands: Vec<ReplayCommand>,
    harness: &Arc<ReplayHarness>,
    permits: &Arc<Semaphore>,
) {
    let mut tasks = Vec::new();
    for (_label, group) in partition_by_label(commands) {
        let harness = Arc::clone(harness);
        let permits = Arc::clone(permits);
        tasks.push(tokio::spawn(async move {
            // The semaphore is never closed
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            for command in &group {
                harness.apply(command).await;
            }
        }));
    }

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "replay task failed");
        }
    }
}

#[async_trait]
impl ReplayStrategy for ConcurrentStrategy {
    async fn replay(
        &self,
        script: &Path,
        harness: Arc<ReplayHarness>,
    ) -> Result<ReplayReport, TransferError> {
        let file = tokio::fs::File::open(script).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransferError::FileNotFound {
                path: script.display().to_string(),
            },
            _ => TransferError::from(e),
        })?;
        let mut reader = AsyncReader::new(file.compat());
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        loop {
            let batch = reader.read_batch(self.config.batch_size).await;
            if batch.is_empty() {
                break;
            }

            let mut pending = Vec::new();
            for command in batch {
                if command.action == Action::Sweep {
                    replay_partitioned(std::mem::take(&mut pending), &harness, &permits).await;
                    harness.apply(&command).await;
                } else {
                    pending.push(command);
                }
            }
            replay_partitioned(pending, &harness, &permits).await;
        }

        Ok(harness.report(reader.skipped()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::WalletLedger;
    use crate::io::csv_format::convert_command_record;
    use crate::io::CommandRecord;
    use crate::strategy::test_support::{harness, HEADER};
    use crate::types::TransactionStatus;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn execute(label: &str, line: u64) -> ReplayCommand {
        convert_command_record(
            CommandRecord {
                command: "execute".to_string(),
                caller: Some("BCA".to_string()),
                label: Some(label.to_string()),
                ..CommandRecord::default()
            },
            line,
        )
        .unwrap()
    }

    #[test]
    fn test_partition_keeps_order_within_label() {
        let groups = partition_by_label(vec![
            execute("a", 2),
            execute("b", 3),
            execute("a", 4),
        ]);

        assert_eq!(groups.len(), 2);
        let lines: Vec<u64> = groups["a"].iter().map(|c| c.line).collect();
        assert_eq!(lines, vec![2, 4]);
        assert_eq!(groups["b"].len(), 1);
    }

    #[rstest]
    #[case::defaults(0, 0, 1000, num_cpus::get())]
    #[case::custom(50, 4, 50, 4)]
    #[case::zero_batch(0, 4, 1000, 4)]
    fn test_batch_config_new(
        #[case] batch_size: usize,
        #[case] max_concurrent: usize,
        #[case] expected_batch: usize,
        #[case] expected_concurrent: usize,
    ) {
        let config = BatchConfig::new(batch_size, max_concurrent);
        assert_eq!(config.batch_size, expected_batch);
        assert_eq!(config.max_concurrent, expected_concurrent);
    }

    #[rstest]
    #[case::single_batch(1000)]
    #[case::label_spans_batches(1)]
    #[case::small_batches(2)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_matches_sequential_outcome(#[case] batch_size: usize) {
        let file = create_temp_csv(&format!(
            "{}initiate,BCA,t1,BRI,wallet-bca-001,wallet-bri-001,50000,IDR,,,,bca-key\n\
             initiate,MANDIRI,t2,BCA,wallet-mandiri-001,wallet-bca-001,300000,IDR,,,,mandiri-key\n\
             execute,BCA,t1,,,,,,,,,bca-key\n\
             execute,MANDIRI,t2,,,,,,,,,mandiri-key\n\
             complete,BRI,t1,,,,,,,,,bri-key\n\
             cancel,BCA,t2,,,,,,,,Not expected,bca-key\n\
             refund,MANDIRI,t2,,,,,,,,,mandiri-key\n",
            HEADER
        ));
        let harness = Arc::new(harness());
        let strategy = ConcurrentStrategy::new(BatchConfig::new(batch_size, 4));

        let report = strategy.replay(file.path(), harness.clone()).await.unwrap();

        assert_eq!(report.applied, 7);
        assert_eq!(report.rejected, 0);
        let ledger = harness.engine().ledger();
        assert_eq!(ledger.get("wallet-bca-001").unwrap().balance, 950_000);
        assert_eq!(ledger.get("wallet-bri-001").unwrap().balance, 800_000);
        assert_eq!(ledger.get("wallet-mandiri-001").unwrap().balance, 2_000_000);
        let t2 = harness.transaction_id("t2").unwrap();
        assert_eq!(
            harness.engine().status("MANDIRI", t2).unwrap().status,
            TransactionStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_sweep_runs_after_preceding_commands() {
        let file = create_temp_csv(&format!(
            "{}initiate,BCA,t1,BRI,wallet-bca-001,wallet-bri-001,50000,IDR,,,,bca-key\n\
             sweep,,,,,,,,,,\n\
             execute,BCA,t1,,,,,,,,,bca-key\n",
            HEADER
        ));
        let harness = Arc::new(harness());

        let report = ConcurrentStrategy::new(BatchConfig::default())
            .replay(file.path(), harness.clone())
            .await
            .unwrap();

        // Nothing has expired, so the transfer is still executable after the sweep
        assert_eq!(report.applied, 3);
        let t1 = harness.transaction_id("t1").unwrap();
        assert_eq!(
            harness.engine().status("BCA", t1).unwrap().status,
            TransactionStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_concurrent_missing_script() {
        let result = ConcurrentStrategy::new(BatchConfig::default())
            .replay(Path::new("nonexistent.csv"), Arc::new(harness()))
            .await;

        assert!(matches!(result, Err(TransferError::FileNotFound { .. })));
    }
}
