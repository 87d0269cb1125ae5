//! Repository traits for the wallet ledger, escrow store and transaction store
//!
//! The engine depends only on these traits. All methods take `&self`:
//! implementations are expected to be internally synchronized so that a
//! single instance can be shared across tokio tasks behind an `Arc`.
//!
//! Closure-based `update` methods apply the closure to a working copy and
//! commit it only when the closure returns `Ok`, so a rejected update never
//! leaves a partially modified record behind.

use chrono::Duration;

use crate::types::{
    Amount, EscrowId, EscrowToken, EscrowWallet, ParticipantCode, StepLogEntry, Transaction,
    TransactionId, TransferError, Wallet,
};

/// Per-wallet balances
pub trait WalletLedger: Send + Sync {
    /// Atomically subtract `amount` from the wallet balance
    ///
    /// # Returns
    ///
    /// * `Ok(balance)` - the balance after the debit
    /// * `Err(TransferError::InsufficientFunds)` - balance left unchanged
    /// * `Err(TransferError::WalletNotFound)`
    fn debit(&self, wallet_id: &str, amount: Amount) -> Result<Amount, TransferError>;

    /// Atomically add `amount` to the wallet balance
    ///
    /// An addition that would overflow is rejected with `BalanceOverflow`.
    fn credit(&self, wallet_id: &str, amount: Amount) -> Result<Amount, TransferError>;

    /// `false` for unknown wallets
    fn is_active(&self, wallet_id: &str) -> bool;

    fn owner_of(&self, wallet_id: &str) -> Option<ParticipantCode>;

    fn get(&self, wallet_id: &str) -> Option<Wallet>;

    /// Insert or replace a wallet (used for seeding)
    fn insert(&self, wallet: Wallet);

    /// Snapshot of every wallet, in no particular order
    fn all(&self) -> Vec<Wallet>;
}

/// Escrow custody records
pub trait EscrowStore: Send + Sync {
    /// Create a `created` escrow for `transaction_id`
    ///
    /// Rejects a second escrow for the same transaction with
    /// `EscrowAlreadyExists`.
    fn create(
        &self,
        transaction_id: TransactionId,
        amount: Amount,
        currency: &str,
        ttl: Duration,
    ) -> Result<EscrowWallet, TransferError>;

    fn get(&self, escrow_id: EscrowId) -> Option<EscrowWallet>;

    fn find_by_token(&self, token: &EscrowToken) -> Option<EscrowWallet>;

    fn find_by_transaction(&self, transaction_id: TransactionId) -> Option<EscrowWallet>;

    /// Update an escrow using a closure
    fn update<F, R>(&self, escrow_id: EscrowId, f: F) -> Result<R, TransferError>
    where
        F: FnOnce(&mut EscrowWallet) -> Result<R, TransferError>;
}

/// Transaction records and their step logs
pub trait TransactionStore: Send + Sync {
    /// Store a new transaction; ids must be unique
    fn insert(&self, transaction: Transaction) -> Result<(), TransferError>;

    fn get(&self, transaction_id: TransactionId) -> Option<Transaction>;

    /// Update a transaction using a closure
    fn update<F, R>(&self, transaction_id: TransactionId, f: F) -> Result<R, TransferError>
    where
        F: FnOnce(&mut Transaction) -> Result<R, TransferError>;

    /// Append an entry to the owning transaction's step log
    fn append_step(&self, entry: StepLogEntry) -> Result<(), TransferError>;

    /// Snapshot of every transaction, in no particular order
    fn all(&self) -> Vec<Transaction>;
}
