//! Transaction-related types
//!
//! This module defines the transfer record, its status state machine and the
//! append-only step log that records every protocol step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::TransferError;
use super::escrow::EscrowId;
use super::wallet::{Amount, ParticipantCode, WalletId};

/// Transaction identifier
pub type TransactionId = Uuid;

/// Step log entry identifier
pub type StepId = Uuid;

/// Transaction lifecycle status
///
/// ```text
/// pending -> going -> processing -> completed
///    \         \          \
///     +---------+----------+--> failed | cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Record created, validation passed, escrow not yet linked
    Pending,
    /// Escrow wallet created and linked, waiting for the source to fund it
    Going,
    /// Funds are parked in escrow, waiting for settlement
    Processing,
    /// Destination credited
    Completed,
    /// A protocol step failed
    Failed,
    /// Cancelled by one of the participants
    Cancelled,
}

impl TransactionStatus {
    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, next) {
            (Pending, Going) | (Going, Processing) | (Processing, Completed) => true,
            (from, Failed | Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Going => "going",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of protocol step recorded in the step log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Validation,
    EscrowCreated,
    FundsMovedToEscrow,
    CounterpartyNotified,
    Settled,
    Cancelled,
    Expired,
    Refunded,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Validation => "validation",
            StepKind::EscrowCreated => "escrow-created",
            StepKind::FundsMovedToEscrow => "funds-moved-to-escrow",
            StepKind::CounterpartyNotified => "counterparty-notified",
            StepKind::Settled => "settled",
            StepKind::Cancelled => "cancelled",
            StepKind::Expired => "expired",
            StepKind::Refunded => "refunded",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a protocol step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Success,
    Failure,
}

/// One entry of a transaction's step log
///
/// Entries are appended in protocol order and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub id: StepId,
    pub transaction_id: TransactionId,
    pub kind: StepKind,
    pub outcome: StepOutcome,
    /// Free-form structured detail (amounts, wallet ids, failure cause, ...)
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl StepLogEntry {
    pub fn new(
        transaction_id: TransactionId,
        kind: StepKind,
        outcome: StepOutcome,
        detail: serde_json::Value,
    ) -> Self {
        StepLogEntry {
            id: Uuid::new_v4(),
            transaction_id,
            kind,
            outcome,
            detail,
            timestamp: Utc::now(),
        }
    }

    pub fn success(
        transaction_id: TransactionId,
        kind: StepKind,
        detail: serde_json::Value,
    ) -> Self {
        Self::new(transaction_id, kind, StepOutcome::Success, detail)
    }

    pub fn failure(
        transaction_id: TransactionId,
        kind: StepKind,
        detail: serde_json::Value,
    ) -> Self {
        Self::new(transaction_id, kind, StepOutcome::Failure, detail)
    }
}

/// Validated transfer request as submitted by the source participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Declared destination participant
    pub to_participant: ParticipantCode,
    pub from_wallet: WalletId,
    pub to_wallet: WalletId,
    pub amount: Amount,
    pub currency: String,
    pub reference: Option<String>,
    pub description: Option<String>,
}

/// Transfer record
///
/// `amount` is fixed at creation and `escrow_id` is linked at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub from_participant: ParticipantCode,
    pub to_participant: ParticipantCode,
    pub from_wallet: WalletId,
    pub to_wallet: WalletId,
    pub amount: Amount,
    pub currency: String,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub escrow_id: Option<EscrowId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Step log in insertion order
    pub steps: Vec<StepLogEntry>,
}

impl Transaction {
    /// Create a `pending` transaction for `request` issued by `caller`
    pub fn new(caller: &str, request: &TransferRequest) -> Self {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            from_participant: caller.to_string(),
            to_participant: request.to_participant.clone(),
            from_wallet: request.from_wallet.clone(),
            to_wallet: request.to_wallet.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            reference: request.reference.clone(),
            description: request.description.clone(),
            status: TransactionStatus::Pending,
            escrow_id: None,
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition_to(&mut self, next: TransactionStatus) -> Result<(), TransferError> {
        if !self.status.can_transition_to(next) {
            return Err(TransferError::invalid_transition(
                "transaction",
                self.status.as_str(),
                next.as_str(),
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Link the escrow wallet; a second link is rejected
    pub fn link_escrow(&mut self, escrow_id: EscrowId) -> Result<(), TransferError> {
        if let Some(existing) = self.escrow_id {
            return Err(TransferError::EscrowAlreadyLinked {
                transaction: self.id,
                escrow: existing,
            });
        }
        self.escrow_id = Some(escrow_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether `participant` is the source or destination of this transfer
    pub fn is_party(&self, participant: &str) -> bool {
        self.from_participant == participant || self.to_participant == participant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use TransactionStatus::*;

    fn request() -> TransferRequest {
        TransferRequest {
            to_participant: "BRI".to_string(),
            from_wallet: "wallet-bca-001".to_string(),
            to_wallet: "wallet-bri-001".to_string(),
            amount: 50_000,
            currency: "IDR".to_string(),
            reference: Some("INV-1".to_string()),
            description: None,
        }
    }

    #[rstest]
    #[case::pending_to_going(Pending, Going, true)]
    #[case::going_to_processing(Going, Processing, true)]
    #[case::processing_to_completed(Processing, Completed, true)]
    #[case::pending_to_failed(Pending, Failed, true)]
    #[case::going_to_cancelled(Going, Cancelled, true)]
    #[case::processing_to_failed(Processing, Failed, true)]
    #[case::skip_going(Pending, Processing, false)]
    #[case::backwards(Processing, Going, false)]
    #[case::completed_to_failed(Completed, Failed, false)]
    #[case::cancelled_to_cancelled(Cancelled, Cancelled, false)]
    #[case::failed_to_going(Failed, Going, false)]
    fn test_status_transitions(
        #[case] from: TransactionStatus,
        #[case] to: TransactionStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_new_transaction_is_pending_with_empty_log() {
        let tx = Transaction::new("BCA", &request());

        assert_eq!(tx.status, Pending);
        assert_eq!(tx.from_participant, "BCA");
        assert_eq!(tx.to_participant, "BRI");
        assert!(tx.escrow_id.is_none());
        assert!(tx.steps.is_empty());
    }

    #[test]
    fn test_transition_rejected_leaves_status() {
        let mut tx = Transaction::new("BCA", &request());

        let result = tx.transition_to(Completed);

        assert!(matches!(
            result,
            Err(TransferError::InvalidTransition { .. })
        ));
        assert_eq!(tx.status, Pending);
    }

    #[test]
    fn test_escrow_linked_at_most_once() {
        let mut tx = Transaction::new("BCA", &request());
        tx.link_escrow(Uuid::new_v4()).unwrap();

        let result = tx.link_escrow(Uuid::new_v4());
        assert!(matches!(
            result,
            Err(TransferError::EscrowAlreadyLinked { .. })
        ));
    }

    #[test]
    fn test_is_party() {
        let tx = Transaction::new("BCA", &request());

        assert!(tx.is_party("BCA"));
        assert!(tx.is_party("BRI"));
        assert!(!tx.is_party("MANDIRI"));
    }

    #[test]
    fn test_step_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&StepKind::FundsMovedToEscrow).unwrap();
        assert_eq!(json, "\"funds-moved-to-escrow\"");
        assert_eq!(StepKind::EscrowCreated.to_string(), "escrow-created");
    }
}
