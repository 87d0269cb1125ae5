//! Escrow transfer orchestration
//!
//! `TransactionEngine` runs the interbank transfer protocol on top of the
//! wallet ledger, the escrow store and the transaction store:
//!
//! ```text
//! initiate  : validate, create transaction + escrow          pending -> going
//! execute   : debit source into escrow, notify destination   going -> processing
//! complete  : credit destination with the escrow token       processing -> completed
//! cancel    : stop a transfer that has not finished          * -> cancelled
//! refund    : return escrowed funds of a dead transfer       (failed | cancelled)
//! ```
//!
//! # Concurrency
//!
//! Every operation on an existing transaction holds that transaction's async
//! mutex for the whole step, so steps on one transaction never interleave and
//! each step re-reads state after taking the lock. Wallet balances are
//! protected by the ledger itself. Different transactions run in parallel.
//!
//! # Failure policy
//!
//! A step that fails after the transaction exists moves the transaction (and
//! its escrow, when not yet terminal) to `failed` and records the cause in the
//! step log before the error is returned. Funds already in escrow stay there
//! until [`TransactionEngine::refund`] returns them. Audit and notification
//! problems are logged and never change an operation's result.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::escrow_store::InMemoryEscrowStore;
use super::locks::KeyedLocks;
use super::traits::{EscrowStore, TransactionStore, WalletLedger};
use super::transaction_store::InMemoryTransactionStore;
use super::wallet_ledger::InMemoryWalletLedger;
use crate::audit::{AuditOutbox, AuditRecord, AuditStatus};
use crate::config::EngineConfig;
use crate::directory::ParticipantDirectory;
use crate::notify::{CounterpartyNotifier, LoggingNotifier, NotifyError};
use crate::types::{
    CancelReceipt, CompleteReceipt, EscrowStatus, EscrowToken, EscrowWallet, ExecuteReceipt,
    IncomingTransferNotification, InitiateReceipt, ParticipantWallets, RefundReceipt, StepKind,
    StepLogEntry, Transaction, TransactionId, TransactionStatus, TransferError, TransferRequest,
    Wallet, WalletValidation,
};

/// Transfer protocol orchestrator
///
/// Cheap to clone; clones share all state and can be moved into tokio tasks.
pub struct TransactionEngine<
    L = InMemoryWalletLedger,
    E = InMemoryEscrowStore,
    S = InMemoryTransactionStore,
> {
    ledger: Arc<L>,
    escrows: Arc<E>,
    transactions: Arc<S>,
    directory: Arc<dyn ParticipantDirectory>,
    notifier: Arc<dyn CounterpartyNotifier>,
    audit: AuditOutbox,
    locks: Arc<KeyedLocks<TransactionId>>,
    config: Arc<EngineConfig>,
}

impl<L, E, S> Clone for TransactionEngine<L, E, S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            escrows: Arc::clone(&self.escrows),
            transactions: Arc::clone(&self.transactions),
            directory: Arc::clone(&self.directory),
            notifier: Arc::clone(&self.notifier),
            audit: self.audit.clone(),
            locks: Arc::clone(&self.locks),
            config: Arc::clone(&self.config),
        }
    }
}

impl TransactionEngine {
    /// Engine over the given ledger with fresh in-memory escrow and transaction stores
    pub fn in_memory(
        ledger: Arc<InMemoryWalletLedger>,
        directory: Arc<dyn ParticipantDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self::new(
            ledger,
            Arc::new(InMemoryEscrowStore::new()),
            Arc::new(InMemoryTransactionStore::new()),
            directory,
            config,
        )
    }
}

impl<L, E, S> TransactionEngine<L, E, S>
where
    L: WalletLedger,
    E: EscrowStore,
    S: TransactionStore,
{
    /// Create an engine that logs notifications and has no audit mirror
    ///
    /// Use [`with_notifier`](Self::with_notifier) and
    /// [`with_audit`](Self::with_audit) to plug in the collaborators.
    pub fn new(
        ledger: Arc<L>,
        escrows: Arc<E>,
        transactions: Arc<S>,
        directory: Arc<dyn ParticipantDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            escrows,
            transactions,
            directory,
            notifier: Arc::new(LoggingNotifier),
            audit: AuditOutbox::disabled(),
            locks: Arc::new(KeyedLocks::new()),
            config: Arc::new(config),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CounterpartyNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_audit(mut self, audit: AuditOutbox) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn escrows(&self) -> &E {
        &self.escrows
    }

    // ---------------------------------------------------------------------
    // Initiate
    // ---------------------------------------------------------------------

    /// Validate a transfer request from `caller` and open an escrow for it
    ///
    /// Checks run in order: request fields, both participants connected,
    /// both wallets exist and are active, wallet ownership, wallet
    /// currencies, source balance. Any failure rejects the request without
    /// creating a transaction.
    ///
    /// # Returns
    ///
    /// * `Ok(InitiateReceipt)` - transaction in `going` with its escrow token
    /// * `Err(TransferError)` - validation, authorization or resource error
    pub async fn initiate(
        &self,
        caller: &str,
        request: TransferRequest,
    ) -> Result<InitiateReceipt, TransferError> {
        self.validate_request(caller, &request)?;

        for participant in [caller, request.to_participant.as_str()] {
            if !self.is_connected(participant).await {
                return Err(TransferError::not_connected(participant));
            }
        }

        let source = self.active_wallet(&request.from_wallet)?;
        let destination = self.active_wallet(&request.to_wallet)?;
        check_owner(&source, caller)?;
        check_owner(&destination, &request.to_participant)?;
        for wallet in [&source, &destination] {
            if wallet.currency != request.currency {
                return Err(TransferError::CurrencyMismatch {
                    wallet: wallet.id.clone(),
                    wallet_currency: wallet.currency.clone(),
                    currency: request.currency.clone(),
                });
            }
        }
        if source.balance < request.amount {
            return Err(TransferError::insufficient_funds(
                &source.id,
                source.balance,
                request.amount,
            ));
        }

        let transaction = Transaction::new(caller, &request);
        let tx_id = transaction.id;
        let guard = self.locks.lock(&tx_id).await;
        let result = self.open_escrow(transaction);
        drop(guard);
        self.locks.release(&tx_id);
        let (transaction, escrow) = result?;

        info!(
            transaction_id = %tx_id,
            caller,
            to = %transaction.to_participant,
            amount = transaction.amount,
            "transfer initiated"
        );
        self.audit
            .record(AuditRecord::from_transaction(&transaction, AuditStatus::Received));

        Ok(InitiateReceipt {
            transaction_id: tx_id,
            status: transaction.status,
            escrow_token: escrow.token,
            expires_at: escrow.expires_at,
            message: "Transfer initiated; execute to move funds into escrow".to_string(),
        })
    }

    fn validate_request(&self, caller: &str, request: &TransferRequest) -> Result<(), TransferError> {
        let required = [
            ("caller", caller),
            ("to_participant", request.to_participant.as_str()),
            ("from_wallet", request.from_wallet.as_str()),
            ("to_wallet", request.to_wallet.as_str()),
            ("currency", request.currency.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(TransferError::missing_field(field));
        }
        if request.amount == 0 {
            return Err(TransferError::InvalidAmount);
        }
        if !self.config.is_supported_currency(&request.currency) {
            return Err(TransferError::unsupported_currency(&request.currency));
        }
        if request.from_wallet == request.to_wallet {
            return Err(TransferError::SameWallet {
                wallet: request.from_wallet.clone(),
            });
        }
        Ok(())
    }

    fn active_wallet(&self, wallet_id: &str) -> Result<Wallet, TransferError> {
        let wallet = self
            .ledger
            .get(wallet_id)
            .ok_or_else(|| TransferError::wallet_not_found(wallet_id))?;
        if !wallet.active {
            return Err(TransferError::wallet_inactive(wallet_id));
        }
        Ok(wallet)
    }

    fn open_escrow(
        &self,
        transaction: Transaction,
    ) -> Result<(Transaction, EscrowWallet), TransferError> {
        let tx_id = transaction.id;
        let detail = json!({
            "from_wallet": transaction.from_wallet,
            "to_wallet": transaction.to_wallet,
            "amount": transaction.amount,
            "currency": transaction.currency,
        });
        self.transactions.insert(transaction.clone())?;
        self.transactions
            .append_step(StepLogEntry::success(tx_id, StepKind::Validation, detail))?;

        let escrow = match self.escrows.create(
            tx_id,
            transaction.amount,
            &transaction.currency,
            self.config.escrow_ttl(),
        ) {
            Ok(escrow) => escrow,
            Err(err) => {
                self.fail_transaction(&transaction, StepKind::EscrowCreated, &err)?;
                return Err(err);
            }
        };

        let transaction = self.transactions.update(tx_id, |tx| {
            tx.link_escrow(escrow.id)?;
            tx.transition_to(TransactionStatus::Going)?;
            Ok(tx.clone())
        })?;
        self.transactions.append_step(StepLogEntry::success(
            tx_id,
            StepKind::EscrowCreated,
            json!({
                "escrow_id": escrow.id,
                "expires_at": escrow.expires_at,
            }),
        ))?;

        Ok((transaction, escrow))
    }

    // ---------------------------------------------------------------------
    // Execute
    // ---------------------------------------------------------------------

    /// Move the transfer amount from the source wallet into escrow and
    /// notify the destination participant
    ///
    /// Only the source participant may execute, and only from `going`. An
    /// expired escrow or a failed debit fails the transaction. Notification
    /// problems are reported through `ExecuteReceipt::notified` and the step
    /// log; the escrowed funds stay where they are.
    pub async fn execute(
        &self,
        caller: &str,
        transaction_id: TransactionId,
    ) -> Result<ExecuteReceipt, TransferError> {
        let guard = self.locks.lock(&transaction_id).await;
        let result = self.execute_locked(caller, transaction_id).await;
        drop(guard);
        self.locks.release(&transaction_id);
        result
    }

    async fn execute_locked(
        &self,
        caller: &str,
        transaction_id: TransactionId,
    ) -> Result<ExecuteReceipt, TransferError> {
        let tx = self.get_transaction(transaction_id)?;
        if tx.from_participant != caller {
            return Err(TransferError::not_source(caller, transaction_id, "execute"));
        }
        if tx.status != TransactionStatus::Going {
            return Err(TransferError::invalid_state(
                transaction_id,
                tx.status.as_str(),
                "execute",
            ));
        }
        let escrow = self.escrow_for(&tx)?;

        if escrow.is_expired(Utc::now()) {
            let err = TransferError::EscrowExpired { escrow: escrow.id };
            self.fail_transaction(&tx, StepKind::FundsMovedToEscrow, &err)?;
            return Err(err);
        }

        let balance = match self.ledger.debit(&tx.from_wallet, tx.amount) {
            Ok(balance) => balance,
            Err(err) => {
                self.fail_transaction(&tx, StepKind::FundsMovedToEscrow, &err)?;
                return Err(err);
            }
        };

        // Debit and escrow funding are one custody change: undo the debit if
        // the escrow cannot take the funds.
        let escrow = match self.escrows.update(escrow.id, |e| {
            e.transition_to(EscrowStatus::FundsReceived)?;
            Ok(e.clone())
        }) {
            Ok(escrow) => escrow,
            Err(err) => {
                if let Err(undo) = self.ledger.credit(&tx.from_wallet, tx.amount) {
                    error!(
                        transaction_id = %transaction_id,
                        wallet_id = %tx.from_wallet,
                        amount = tx.amount,
                        error = %undo,
                        cause = %err,
                        "debited funds could not be returned"
                    );
                }
                self.fail_transaction(&tx, StepKind::FundsMovedToEscrow, &err)?;
                return Err(err);
            }
        };

        let tx = self.transactions.update(transaction_id, |t| {
            t.transition_to(TransactionStatus::Processing)?;
            Ok(t.clone())
        })?;
        self.transactions.append_step(StepLogEntry::success(
            transaction_id,
            StepKind::FundsMovedToEscrow,
            json!({
                "escrow_id": escrow.id,
                "from_wallet": tx.from_wallet,
                "amount": tx.amount,
                "balance_after": balance,
            }),
        ))?;
        info!(
            transaction_id = %transaction_id,
            wallet_id = %tx.from_wallet,
            amount = tx.amount,
            "funds moved to escrow"
        );

        let notified = self.notify_counterparty(&tx, &escrow).await?;
        let message = if notified {
            "Funds moved to escrow; destination notified"
        } else {
            "Funds moved to escrow; destination notification failed"
        };

        Ok(ExecuteReceipt {
            executed: true,
            notified,
            message: message.to_string(),
        })
    }

    /// Deliver the incoming-transfer payload and record the outcome
    async fn notify_counterparty(
        &self,
        tx: &Transaction,
        escrow: &EscrowWallet,
    ) -> Result<bool, TransferError> {
        let outcome = if self.is_connected(&tx.to_participant).await {
            let notification = IncomingTransferNotification {
                transaction_id: tx.id,
                from_participant: tx.from_participant.clone(),
                to_participant: tx.to_participant.clone(),
                to_wallet: tx.to_wallet.clone(),
                amount: escrow.amount,
                currency: escrow.currency.clone(),
                escrow_token: escrow.token.clone(),
                reference: tx.reference.clone(),
                description: tx.description.clone(),
            };
            let timeout = self.config.notification_timeout();
            match tokio::time::timeout(timeout, self.notifier.notify(&notification)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout {
                    participant: tx.to_participant.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        } else {
            Err(NotifyError::Unreachable(tx.to_participant.clone()))
        };

        let entry = match &outcome {
            Ok(()) => StepLogEntry::success(
                tx.id,
                StepKind::CounterpartyNotified,
                json!({ "to_participant": tx.to_participant }),
            ),
            Err(err) => {
                warn!(
                    transaction_id = %tx.id,
                    to = %tx.to_participant,
                    error = %err,
                    "counterparty notification failed"
                );
                StepLogEntry::failure(
                    tx.id,
                    StepKind::CounterpartyNotified,
                    json!({ "to_participant": tx.to_participant, "error": err.to_string() }),
                )
            }
        };
        self.transactions.append_step(entry)?;
        Ok(outcome.is_ok())
    }

    /// Re-send the notification for a transfer whose funds sit in escrow
    ///
    /// Source participant only. Appends a new `counterparty-notified` entry.
    pub async fn retry_notification(
        &self,
        caller: &str,
        transaction_id: TransactionId,
    ) -> Result<ExecuteReceipt, TransferError> {
        let guard = self.locks.lock(&transaction_id).await;
        let result = self.retry_notification_locked(caller, transaction_id).await;
        drop(guard);
        self.locks.release(&transaction_id);
        result
    }

    async fn retry_notification_locked(
        &self,
        caller: &str,
        transaction_id: TransactionId,
    ) -> Result<ExecuteReceipt, TransferError> {
        let tx = self.get_transaction(transaction_id)?;
        if tx.from_participant != caller {
            return Err(TransferError::not_source(caller, transaction_id, "notify"));
        }
        let escrow = self.escrow_for(&tx)?;
        if tx.status != TransactionStatus::Processing || escrow.status != EscrowStatus::FundsReceived
        {
            return Err(TransferError::invalid_state(
                transaction_id,
                tx.status.as_str(),
                "notify",
            ));
        }
        if escrow.is_expired(Utc::now()) {
            return Err(TransferError::EscrowExpired { escrow: escrow.id });
        }

        let notified = self.notify_counterparty(&tx, &escrow).await?;
        Ok(ExecuteReceipt {
            executed: true,
            notified,
            message: if notified {
                "Destination notified".to_string()
            } else {
                "Destination notification failed".to_string()
            },
        })
    }

    // ---------------------------------------------------------------------
    // Complete
    // ---------------------------------------------------------------------

    /// Settle a transfer: credit the destination wallet from escrow
    ///
    /// Authorized by possession of the escrow token alone. An unknown token,
    /// or a transaction that is not `processing` with a `funds_received`
    /// escrow, is rejected without touching any state. A wrong destination
    /// wallet, an expired escrow or a failed credit fails the transaction and
    /// leaves the funds in escrow for refund.
    pub async fn complete(
        &self,
        token: &EscrowToken,
        destination_wallet: &str,
    ) -> Result<CompleteReceipt, TransferError> {
        let escrow = self
            .escrows
            .find_by_token(token)
            .ok_or(TransferError::InvalidToken)?;
        let transaction_id = escrow.transaction_id;

        let guard = self.locks.lock(&transaction_id).await;
        let result = self.complete_locked(transaction_id, destination_wallet);
        drop(guard);
        self.locks.release(&transaction_id);
        result
    }

    fn complete_locked(
        &self,
        transaction_id: TransactionId,
        destination_wallet: &str,
    ) -> Result<CompleteReceipt, TransferError> {
        let tx = self.get_transaction(transaction_id)?;
        let escrow = self.escrow_for(&tx)?;
        if tx.status != TransactionStatus::Processing || escrow.status != EscrowStatus::FundsReceived
        {
            return Err(TransferError::invalid_state(
                transaction_id,
                tx.status.as_str(),
                "complete",
            ));
        }

        let precondition = if destination_wallet != tx.to_wallet {
            Err(TransferError::DestinationMismatch {
                transaction: transaction_id,
                expected: tx.to_wallet.clone(),
                presented: destination_wallet.to_string(),
            })
        } else if escrow.is_expired(Utc::now()) {
            Err(TransferError::EscrowExpired { escrow: escrow.id })
        } else {
            self.active_wallet(&tx.to_wallet).map(|_| ())
        };

        let settled = precondition.and_then(|()| self.ledger.credit(&tx.to_wallet, escrow.amount));
        let balance = match settled {
            Ok(balance) => balance,
            Err(err) => {
                self.fail_transaction(&tx, StepKind::Settled, &err)?;
                return Err(err);
            }
        };

        self.escrows.update(escrow.id, |e| {
            e.transition_to(EscrowStatus::FundsSent)?;
            e.transition_to(EscrowStatus::Completed)
        })?;
        let tx = self.transactions.update(transaction_id, |t| {
            t.transition_to(TransactionStatus::Completed)?;
            Ok(t.clone())
        })?;
        self.transactions.append_step(StepLogEntry::success(
            transaction_id,
            StepKind::Settled,
            json!({
                "to_wallet": tx.to_wallet,
                "amount": escrow.amount,
                "balance_after": balance,
            }),
        ))?;

        info!(
            transaction_id = %transaction_id,
            wallet_id = %tx.to_wallet,
            amount = escrow.amount,
            "transfer completed"
        );
        self.audit
            .update_status(transaction_id, &tx.from_participant, AuditStatus::Done);

        Ok(CompleteReceipt {
            transaction_id,
            completed: true,
        })
    }

    // ---------------------------------------------------------------------
    // Cancel / refund
    // ---------------------------------------------------------------------

    /// Cancel a transfer that has not reached a terminal status
    ///
    /// Source or destination participant only. Funds already in escrow are
    /// not returned by cancelling; see [`refund`](Self::refund).
    pub async fn cancel(
        &self,
        caller: &str,
        transaction_id: TransactionId,
        reason: Option<String>,
    ) -> Result<CancelReceipt, TransferError> {
        let guard = self.locks.lock(&transaction_id).await;
        let result = self.cancel_locked(caller, transaction_id, reason);
        drop(guard);
        self.locks.release(&transaction_id);
        result
    }

    fn cancel_locked(
        &self,
        caller: &str,
        transaction_id: TransactionId,
        reason: Option<String>,
    ) -> Result<CancelReceipt, TransferError> {
        let tx = self.get_transaction(transaction_id)?;
        if !tx.is_party(caller) {
            return Err(TransferError::not_party(caller, transaction_id));
        }
        if tx.status.is_terminal() {
            return Err(TransferError::invalid_state(
                transaction_id,
                tx.status.as_str(),
                "cancel",
            ));
        }

        self.transactions
            .update(transaction_id, |t| t.transition_to(TransactionStatus::Cancelled))?;
        let funds_in_escrow = self.fail_escrow(&tx)?;

        let reason = reason.unwrap_or_else(|| "Cancelled by participant".to_string());
        self.transactions.append_step(StepLogEntry::success(
            transaction_id,
            StepKind::Cancelled,
            json!({
                "reason": reason,
                "cancelled_by": caller,
                "cancelled_at": Utc::now(),
                "funds_in_escrow": funds_in_escrow,
            }),
        ))?;

        info!(transaction_id = %transaction_id, caller, %reason, "transfer cancelled");
        self.audit
            .update_status(transaction_id, &tx.from_participant, AuditStatus::Canceled);

        Ok(CancelReceipt {
            transaction_id,
            cancelled: true,
            funds_in_escrow,
        })
    }

    /// Return escrowed funds of a `failed` or `cancelled` transfer to the source wallet
    ///
    /// Source participant only. Rejected with `NothingToRefund` when the
    /// escrow never received funds or has already been refunded.
    pub async fn refund(
        &self,
        caller: &str,
        transaction_id: TransactionId,
    ) -> Result<RefundReceipt, TransferError> {
        let guard = self.locks.lock(&transaction_id).await;
        let result = self.refund_locked(caller, transaction_id);
        drop(guard);
        self.locks.release(&transaction_id);
        result
    }

    fn refund_locked(
        &self,
        caller: &str,
        transaction_id: TransactionId,
    ) -> Result<RefundReceipt, TransferError> {
        let tx = self.get_transaction(transaction_id)?;
        if tx.from_participant != caller {
            return Err(TransferError::not_source(caller, transaction_id, "refund"));
        }
        if !matches!(
            tx.status,
            TransactionStatus::Failed | TransactionStatus::Cancelled
        ) {
            return Err(TransferError::invalid_state(
                transaction_id,
                tx.status.as_str(),
                "refund",
            ));
        }
        let escrow = self.escrow_for(&tx)?;
        if !escrow.holds_funds() {
            return Err(TransferError::NothingToRefund {
                transaction: transaction_id,
            });
        }

        if let Err(err) = self.ledger.credit(&tx.from_wallet, escrow.amount) {
            self.transactions.append_step(StepLogEntry::failure(
                transaction_id,
                StepKind::Refunded,
                json!({ "error": err.to_string(), "code": err.code() }),
            ))?;
            return Err(err);
        }
        if let Err(err) = self
            .escrows
            .update(escrow.id, |e| e.transition_to(EscrowStatus::Refunded))
        {
            if let Err(undo) = self.ledger.debit(&tx.from_wallet, escrow.amount) {
                error!(
                    transaction_id = %transaction_id,
                    wallet_id = %tx.from_wallet,
                    amount = escrow.amount,
                    error = %undo,
                    cause = %err,
                    "refund credit could not be reversed"
                );
            }
            return Err(err);
        }
        self.transactions.append_step(StepLogEntry::success(
            transaction_id,
            StepKind::Refunded,
            json!({ "wallet": tx.from_wallet, "amount": escrow.amount }),
        ))?;

        info!(
            transaction_id = %transaction_id,
            wallet_id = %tx.from_wallet,
            amount = escrow.amount,
            "escrow refunded"
        );

        Ok(RefundReceipt {
            transaction_id,
            refunded: escrow.amount,
            wallet: tx.from_wallet,
        })
    }

    // ---------------------------------------------------------------------
    // Expiry sweep
    // ---------------------------------------------------------------------

    /// Fail every open transfer whose escrow has expired
    ///
    /// Each candidate is re-checked under its transaction lock, so a sweep
    /// and a concurrent settlement never both act on the same transfer.
    ///
    /// # Returns
    ///
    /// Ids of the transactions that were expired by this call.
    pub async fn sweep_expired(&self) -> Vec<TransactionId> {
        let candidates: Vec<TransactionId> = self
            .transactions
            .all()
            .into_iter()
            .filter(|tx| {
                matches!(
                    tx.status,
                    TransactionStatus::Going | TransactionStatus::Processing
                )
            })
            .map(|tx| tx.id)
            .collect();

        let mut expired = Vec::new();
        for transaction_id in candidates {
            let guard = self.locks.lock(&transaction_id).await;
            let result = self.expire_locked(transaction_id);
            drop(guard);
            self.locks.release(&transaction_id);

            match result {
                Ok(true) => expired.push(transaction_id),
                Ok(false) => {}
                Err(err) => {
                    warn!(transaction_id = %transaction_id, error = %err, "expiry sweep failed")
                }
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "expired escrows swept");
        }
        expired
    }

    fn expire_locked(&self, transaction_id: TransactionId) -> Result<bool, TransferError> {
        let tx = self.get_transaction(transaction_id)?;
        if !matches!(
            tx.status,
            TransactionStatus::Going | TransactionStatus::Processing
        ) {
            return Ok(false);
        }
        let escrow = self.escrow_for(&tx)?;
        if !escrow.is_expired(Utc::now()) {
            return Ok(false);
        }

        let err = TransferError::EscrowExpired { escrow: escrow.id };
        self.fail_transaction(&tx, StepKind::Expired, &err)?;
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Transaction with its full step log, visible to source and destination only
    pub fn status(
        &self,
        caller: &str,
        transaction_id: TransactionId,
    ) -> Result<Transaction, TransferError> {
        let tx = self.get_transaction(transaction_id)?;
        if !tx.is_party(caller) {
            return Err(TransferError::not_party(caller, transaction_id));
        }
        Ok(tx)
    }

    /// Every transaction where `caller` is source or destination, oldest first
    pub fn list_by_participant(&self, caller: &str) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .all()
            .into_iter()
            .filter(|tx| tx.is_party(caller))
            .collect();
        transactions.sort_by_key(|tx| tx.created_at);
        transactions
    }

    /// Wallets held by `caller`, sorted by id, with per-currency totals
    pub fn wallets_of(&self, caller: &str) -> ParticipantWallets {
        let wallets = self
            .wallets()
            .into_iter()
            .filter(|wallet| wallet.owner == caller)
            .collect();
        ParticipantWallets::new(caller, wallets)
    }

    /// One wallet; only the participant holding it may view it
    pub fn wallet_info(&self, caller: &str, wallet_id: &str) -> Result<Wallet, TransferError> {
        let wallet = self
            .ledger
            .get(wallet_id)
            .ok_or_else(|| TransferError::wallet_not_found(wallet_id))?;
        check_owner(&wallet, caller)?;
        Ok(wallet)
    }

    /// Whether a wallet exists and is active, without exposing its balance
    pub fn validate_wallet(&self, wallet_id: &str) -> WalletValidation {
        let wallet = self.ledger.get(wallet_id);
        WalletValidation {
            wallet_id: wallet_id.to_string(),
            exists: wallet.is_some(),
            active: wallet.as_ref().is_some_and(|w| w.active),
            account_number: wallet.as_ref().map(|w| w.account_number.clone()),
            currency: wallet.map(|w| w.currency),
        }
    }

    /// Whether `code` is connected; directory errors count as not connected
    pub async fn validate_participant(&self, code: &str) -> bool {
        self.is_connected(code).await
    }

    /// Audit mirror records involving `caller`; empty when the mirror is unavailable
    pub async fn audit_history(&self, caller: &str) -> Vec<AuditRecord> {
        self.audit.query_by_participant(caller).await
    }

    /// Wait until all pending audit intents have been handled
    pub async fn flush_audit(&self) {
        self.audit.flush().await;
    }

    /// Wallet snapshot sorted by wallet id
    pub fn wallets(&self) -> Vec<Wallet> {
        let mut wallets = self.ledger.all();
        wallets.sort_by(|a, b| a.id.cmp(&b.id));
        wallets
    }

    /// Every transaction, oldest first
    pub fn transactions(&self) -> Vec<Transaction> {
        let mut transactions = self.transactions.all();
        transactions.sort_by_key(|tx| tx.created_at);
        transactions
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    /// Directory lookup; errors count as not connected
    async fn is_connected(&self, participant: &str) -> bool {
        match self.directory.is_connected(participant).await {
            Ok(connected) => connected,
            Err(err) => {
                warn!(participant, error = %err, "directory lookup failed");
                false
            }
        }
    }

    fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction, TransferError> {
        self.transactions
            .get(transaction_id)
            .ok_or_else(|| TransferError::transaction_not_found(transaction_id))
    }

    fn escrow_for(&self, tx: &Transaction) -> Result<EscrowWallet, TransferError> {
        tx.escrow_id
            .and_then(|id| self.escrows.get(id))
            .ok_or(TransferError::EscrowNotFound { transaction: tx.id })
    }

    /// Move a non-terminal escrow to `failed`; returns whether it still holds funds
    fn fail_escrow(&self, tx: &Transaction) -> Result<bool, TransferError> {
        match tx.escrow_id {
            Some(escrow_id) => self.escrows.update(escrow_id, |e| {
                if !e.status.is_terminal() {
                    e.transition_to(EscrowStatus::Failed)?;
                }
                Ok(e.holds_funds())
            }),
            None => Ok(false),
        }
    }

    /// Mark the transaction and its escrow `failed` and log the cause
    fn fail_transaction(
        &self,
        tx: &Transaction,
        step: StepKind,
        cause: &TransferError,
    ) -> Result<(), TransferError> {
        self.transactions
            .update(tx.id, |t| t.transition_to(TransactionStatus::Failed))?;
        let funds_in_escrow = self.fail_escrow(tx)?;
        self.transactions.append_step(StepLogEntry::failure(
            tx.id,
            step,
            json!({
                "error": cause.to_string(),
                "code": cause.code(),
                "funds_in_escrow": funds_in_escrow,
            }),
        ))?;

        warn!(
            transaction_id = %tx.id,
            step = %step,
            code = cause.code(),
            funds_in_escrow,
            "transfer failed"
        );
        self.audit
            .update_status(tx.id, &tx.from_participant, AuditStatus::Failed);
        Ok(())
    }
}

fn check_owner(wallet: &Wallet, expected: &str) -> Result<(), TransferError> {
    if wallet.owner != expected {
        return Err(TransferError::OwnershipMismatch {
            wallet: wallet.id.clone(),
            owner: wallet.owner.clone(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}
