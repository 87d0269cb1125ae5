//! Counterparty notification
//!
//! Once funds sit in escrow the destination participant is told about the
//! incoming transfer, including the escrow token it needs to settle. Delivery
//! is one-way: a failed delivery is recorded in the step log but never moves
//! funds back.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tracing::info;

use crate::types::{IncomingTransferNotification, ParticipantCode, TransactionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Participant {0} is unreachable")]
    Unreachable(String),

    #[error("Notification to {participant} timed out after {timeout_ms}ms")]
    Timeout { participant: String, timeout_ms: u64 },
}

/// Delivers the incoming-transfer payload to the destination participant
#[async_trait]
pub trait CounterpartyNotifier: Send + Sync {
    async fn notify(&self, notification: &IncomingTransferNotification) -> Result<(), NotifyError>;
}

/// Keeps delivered notifications in a per-participant inbox
///
/// Stands in for the destination's inbound endpoint: the replay harness reads
/// escrow tokens back out of the inbox when a destination settles.
#[derive(Debug, Default)]
pub struct InboxNotifier {
    inboxes: DashMap<ParticipantCode, Vec<IncomingTransferNotification>>,
    unreachable: DashSet<ParticipantCode>,
}

impl InboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries to `participant` fail (or succeed again)
    pub fn set_reachable(&self, participant: &str, reachable: bool) {
        if reachable {
            self.unreachable.remove(participant);
        } else {
            self.unreachable.insert(participant.to_string());
        }
    }

    /// Remove and return the notification for one transaction
    pub fn take(
        &self,
        participant: &str,
        transaction_id: TransactionId,
    ) -> Option<IncomingTransferNotification> {
        let mut inbox = self.inboxes.get_mut(participant)?;
        let position = inbox
            .iter()
            .position(|n| n.transaction_id == transaction_id)?;
        Some(inbox.remove(position))
    }

    pub fn pending(&self, participant: &str) -> usize {
        self.inboxes
            .get(participant)
            .map(|inbox| inbox.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CounterpartyNotifier for InboxNotifier {
    async fn notify(&self, notification: &IncomingTransferNotification) -> Result<(), NotifyError> {
        let participant = &notification.to_participant;
        if self.unreachable.contains(participant) {
            return Err(NotifyError::Unreachable(participant.clone()));
        }

        let mut inbox = self.inboxes.entry(participant.clone()).or_default();
        // A retried delivery replaces the earlier copy
        inbox.retain(|n| n.transaction_id != notification.transaction_id);
        inbox.push(notification.clone());
        Ok(())
    }
}

/// Notifier that only logs the delivery
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl CounterpartyNotifier for LoggingNotifier {
    async fn notify(&self, notification: &IncomingTransferNotification) -> Result<(), NotifyError> {
        info!(
            transaction_id = %notification.transaction_id,
            from = %notification.from_participant,
            to = %notification.to_participant,
            amount = notification.amount,
            currency = %notification.currency,
            "incoming transfer notification"
        );
        Ok(())
    }
}
