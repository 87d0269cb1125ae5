//! Audit mirror
//!
//! Transaction records are mirrored to an external audit sink on a
//! best-effort basis. The engine never talks to a sink directly: it enqueues
//! intents on an [`AuditOutbox`], whose background worker delivers them with
//! a per-attempt timeout and bounded retries. A sink that is slow or down can
//! delay the mirror but never a protocol decision.

pub mod outbox;
pub mod sink;

pub use outbox::{AuditOutbox, AuditStats, DeliveryPolicy};
pub use sink::{CsvAuditSink, MemoryAuditSink};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{Amount, ParticipantCode, Transaction, TransactionId, WalletId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit sink timed out after {0}ms")]
    Timeout(u64),

    #[error("Audit I/O error: {0}")]
    Io(String),

    #[error("Audit record for transaction {0} not found")]
    NotFound(TransactionId),
}

/// Status as seen by the audit mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Received,
    Done,
    Canceled,
    Failed,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditStatus::Received => "Received",
            AuditStatus::Done => "Done",
            AuditStatus::Canceled => "Canceled",
            AuditStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// One mirrored transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub transaction_id: TransactionId,
    /// Source participant
    pub participant: ParticipantCode,
    pub counterparty: ParticipantCode,
    pub from_wallet: WalletId,
    pub to_wallet: WalletId,
    pub amount: Amount,
    pub currency: String,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub status: AuditStatus,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn from_transaction(transaction: &Transaction, status: AuditStatus) -> Self {
        AuditRecord {
            transaction_id: transaction.id,
            participant: transaction.from_participant.clone(),
            counterparty: transaction.to_participant.clone(),
            from_wallet: transaction.from_wallet.clone(),
            to_wallet: transaction.to_wallet.clone(),
            amount: transaction.amount,
            currency: transaction.currency.clone(),
            reference: transaction.reference.clone(),
            description: transaction.description.clone(),
            status,
            recorded_at: Utc::now(),
        }
    }

    /// Whether `code` is the source or destination of the mirrored transfer
    pub fn involves(&self, code: &str) -> bool {
        self.participant == code || self.counterparty == code
    }
}

/// Durable mirror of transaction records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_transaction(&self, record: &AuditRecord) -> Result<(), AuditError>;

    async fn update_status(
        &self,
        transaction_id: TransactionId,
        participant: &str,
        status: AuditStatus,
    ) -> Result<(), AuditError>;

    /// Records whose source or destination is `participant`
    async fn query_by_participant(&self, participant: &str)
        -> Result<Vec<AuditRecord>, AuditError>;
}
