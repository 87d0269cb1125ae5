//! Command replay against a [`TransactionEngine`]
//!
//! The harness plays every participant at once: it maps script labels to
//! transaction ids and stands in for the destination's inbound endpoint by
//! wiring an [`InboxNotifier`] into the engine. A `complete` row settles
//! with the escrow token found in the calling participant's inbox.
//!
//! Every row that names a caller is authenticated against the participant
//! registry with the row's `api_key` before it reaches the engine.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::TransactionEngine;
use crate::directory::ParticipantRegistry;
use crate::io::csv_format::{Action, ReplayCommand};
use crate::notify::InboxNotifier;
use crate::types::{TransactionId, TransferError};

/// Outcome counts of one replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    /// Commands the engine accepted
    pub applied: usize,
    /// Commands the engine (or the harness) rejected
    pub rejected: usize,
    /// Rows that could not be parsed
    pub skipped: usize,
}

pub struct ReplayHarness {
    engine: TransactionEngine,
    credentials: Arc<ParticipantRegistry>,
    inbox: Arc<InboxNotifier>,
    labels: DashMap<String, TransactionId>,
    applied: AtomicUsize,
    rejected: AtomicUsize,
}

impl ReplayHarness {
    /// Wrap `engine`, replacing its notifier with the harness inbox
    ///
    /// `credentials` checks each row's caller and API key.
    pub fn new(engine: TransactionEngine, credentials: Arc<ParticipantRegistry>) -> Self {
        let inbox = Arc::new(InboxNotifier::new());
        Self {
            engine: engine.with_notifier(inbox.clone()),
            credentials,
            inbox,
            labels: DashMap::new(),
            applied: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }

    pub fn engine(&self) -> &TransactionEngine {
        &self.engine
    }

    pub fn inbox(&self) -> &InboxNotifier {
        &self.inbox
    }

    /// Transaction created by the `initiate` row with this label
    pub fn transaction_id(&self, label: &str) -> Option<TransactionId> {
        self.labels.get(label).map(|id| *id)
    }

    /// Apply one command and count the outcome
    ///
    /// Rejections are logged, never propagated: a script keeps going after a
    /// failed command the same way a real participant would.
    pub async fn apply(&self, command: &ReplayCommand) {
        match self.dispatch(command).await {
            Ok(()) => {
                self.applied.fetch_add(1, Ordering::Relaxed);
                info!(
                    line = command.line,
                    command = ?command.command_type(),
                    label = %command.label,
                    caller = %command.caller,
                    "command applied"
                );
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    line = command.line,
                    command = ?command.command_type(),
                    label = %command.label,
                    caller = %command.caller,
                    code = e.code(),
                    error = %e,
                    "command rejected"
                );
            }
        }
    }

    async fn dispatch(&self, command: &ReplayCommand) -> Result<(), TransferError> {
        if command.action != Action::Sweep {
            self.credentials
                .authenticate(&command.caller, command.api_key.as_deref().unwrap_or_default())?;
        }
        let caller = command.caller.as_str();

        match &command.action {
            Action::Initiate(request) => {
                if self.labels.contains_key(&command.label) {
                    return Err(TransferError::ParseError {
                        line: Some(command.line),
                        message: format!("Label '{}' already used", command.label),
                    });
                }
                let receipt = self.engine.initiate(caller, request.clone()).await?;
                self.labels
                    .insert(command.label.clone(), receipt.transaction_id);
            }
            Action::Execute => {
                let receipt = self.engine.execute(caller, self.resolve(command)?).await?;
                if !receipt.notified {
                    warn!(label = %command.label, "{}", receipt.message);
                }
            }
            Action::Complete { to_wallet } => {
                let transaction_id = self.resolve(command)?;
                let notification = self
                    .inbox
                    .take(caller, transaction_id)
                    .ok_or(TransferError::InvalidToken)?;
                let wallet = to_wallet
                    .as_deref()
                    .unwrap_or(notification.to_wallet.as_str());
                self.engine
                    .complete(&notification.escrow_token, wallet)
                    .await?;
            }
            Action::Cancel { reason } => {
                self.engine
                    .cancel(caller, self.resolve(command)?, reason.clone())
                    .await?;
            }
            Action::Refund => {
                self.engine.refund(caller, self.resolve(command)?).await?;
            }
            Action::Notify => {
                self.engine
                    .retry_notification(caller, self.resolve(command)?)
                    .await?;
            }
            Action::Sweep => {
                let expired = self.engine.sweep_expired().await;
                info!(expired = expired.len(), "sweep finished");
            }
        }
        Ok(())
    }

    fn resolve(&self, command: &ReplayCommand) -> Result<TransactionId, TransferError> {
        self.transaction_id(&command.label)
            .ok_or_else(|| TransferError::ParseError {
                line: Some(command.line),
                message: format!("Unknown label '{}'", command.label),
            })
    }

    pub fn report(&self, skipped: usize) -> ReplayReport {
        ReplayReport {
            applied: self.applied.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            skipped,
        }
    }
}
