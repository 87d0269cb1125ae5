//! Audit sink implementations
//!
//! - [`MemoryAuditSink`]: keeps records in a `DashMap`; can be told to fail or
//!   stall so callers can exercise their failure handling
//! - [`CsvAuditSink`]: append-only CSV event log; the current view of a
//!   transaction is folded from its events on query

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{AuditError, AuditRecord, AuditSink, AuditStatus};
use crate::types::TransactionId;

/// In-memory audit sink
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: DashMap<TransactionId, AuditRecord>,
    failures_remaining: AtomicUsize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that sleeps for `delay` before every call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make the next `n` calls fail with `Unavailable`
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Number of calls received, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, transaction_id: TransactionId) -> Option<AuditRecord> {
        self.records.get(&transaction_id).map(|r| r.clone())
    }

    async fn enter(&self) -> Result<(), AuditError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AuditError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record_transaction(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.enter().await?;
        self.records.insert(record.transaction_id, record.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        transaction_id: TransactionId,
        _participant: &str,
        status: AuditStatus,
    ) -> Result<(), AuditError> {
        self.enter().await?;
        let mut record = self
            .records
            .get_mut(&transaction_id)
            .ok_or(AuditError::NotFound(transaction_id))?;
        record.status = status;
        record.recorded_at = Utc::now();
        Ok(())
    }

    async fn query_by_participant(
        &self,
        participant: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        self.enter().await?;
        let mut records: Vec<AuditRecord> = self
            .records
            .iter()
            .filter(|r| r.involves(participant))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.recorded_at);
        Ok(records)
    }
}

/// One line of the CSV audit log
#[derive(Debug, Serialize, Deserialize)]
struct AuditRow {
    event: AuditEvent,
    transaction_id: TransactionId,
    participant: String,
    counterparty: Option<String>,
    from_wallet: Option<String>,
    to_wallet: Option<String>,
    amount: Option<u64>,
    currency: Option<String>,
    reference: Option<String>,
    description: Option<String>,
    status: AuditStatus,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AuditEvent {
    Record,
    Status,
}

impl AuditRow {
    fn record(record: &AuditRecord) -> Self {
        AuditRow {
            event: AuditEvent::Record,
            transaction_id: record.transaction_id,
            participant: record.participant.clone(),
            counterparty: Some(record.counterparty.clone()),
            from_wallet: Some(record.from_wallet.clone()),
            to_wallet: Some(record.to_wallet.clone()),
            amount: Some(record.amount),
            currency: Some(record.currency.clone()),
            reference: record.reference.clone(),
            description: record.description.clone(),
            status: record.status,
            recorded_at: record.recorded_at,
        }
    }

    fn status(transaction_id: TransactionId, participant: &str, status: AuditStatus) -> Self {
        AuditRow {
            event: AuditEvent::Status,
            transaction_id,
            participant: participant.to_string(),
            counterparty: None,
            from_wallet: None,
            to_wallet: None,
            amount: None,
            currency: None,
            reference: None,
            description: None,
            status,
            recorded_at: Utc::now(),
        }
    }

    fn into_record(self) -> AuditRecord {
        AuditRecord {
            transaction_id: self.transaction_id,
            participant: self.participant,
            counterparty: self.counterparty.unwrap_or_default(),
            from_wallet: self.from_wallet.unwrap_or_default(),
            to_wallet: self.to_wallet.unwrap_or_default(),
            amount: self.amount.unwrap_or_default(),
            currency: self.currency.unwrap_or_default(),
            reference: self.reference,
            description: self.description,
            status: self.status,
            recorded_at: self.recorded_at,
        }
    }
}

/// Append-only CSV audit log
///
/// Writes run on the blocking pool and are serialized by an async mutex, so
/// rows from concurrent callers never interleave.
#[derive(Debug)]
pub struct CsvAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, row: AuditRow) -> Result<(), AuditError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_row(&path, &row))
            .await
            .map_err(|e| AuditError::Io(e.to_string()))?
    }

    async fn read_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || fold_rows(&path))
            .await
            .map_err(|e| AuditError::Io(e.to_string()))?
    }
}

fn append_row(path: &Path, row: &AuditRow) -> Result<(), AuditError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AuditError::Io(e.to_string()))?;
    let needs_header = file
        .metadata()
        .map(|m| m.len() == 0)
        .map_err(|e| AuditError::Io(e.to_string()))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer
        .serialize(row)
        .map_err(|e| AuditError::Io(e.to_string()))?;
    writer.flush().map_err(|e| AuditError::Io(e.to_string()))
}

/// Replay the event log into the latest view of each transaction, in first-seen order
fn fold_rows(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AuditError::Io(e.to_string()))?;

    let mut order = Vec::new();
    let mut latest: HashMap<TransactionId, AuditRecord> = HashMap::new();

    for row in reader.deserialize::<AuditRow>() {
        let row = row.map_err(|e| AuditError::Io(e.to_string()))?;
        match row.event {
            AuditEvent::Record => {
                if !latest.contains_key(&row.transaction_id) {
                    order.push(row.transaction_id);
                }
                latest.insert(row.transaction_id, row.into_record());
            }
            AuditEvent::Status => {
                if let Some(record) = latest.get_mut(&row.transaction_id) {
                    record.status = row.status;
                    record.recorded_at = row.recorded_at;
                }
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|id| latest.remove(&id))
        .collect())
}

#[async_trait]
impl AuditSink for CsvAuditSink {
    async fn record_transaction(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.append(AuditRow::record(record)).await
    }

    async fn update_status(
        &self,
        transaction_id: TransactionId,
        participant: &str,
        status: AuditStatus,
    ) -> Result<(), AuditError> {
        self.append(AuditRow::status(transaction_id, participant, status))
            .await
    }

    async fn query_by_participant(
        &self,
        participant: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.involves(participant))
            .collect())
    }
}
