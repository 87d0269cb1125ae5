//! Core business logic module
//!
//! This module contains the escrow transfer components:
//! - `traits` - Repository traits the engine depends on
//! - `engine` - Transfer protocol orchestration
//! - `wallet_ledger` - Wallet balances with atomic debit and credit
//! - `escrow_store` - Escrow custody records
//! - `transaction_store` - Transactions and their step logs
//! - `locks` - Per-transaction async locks

pub mod engine;
pub mod escrow_store;
pub mod locks;
pub mod traits;
pub mod transaction_store;
pub mod wallet_ledger;

pub use engine::TransactionEngine;
pub use escrow_store::InMemoryEscrowStore;
pub use locks::KeyedLocks;
pub use traits::{EscrowStore, TransactionStore, WalletLedger};
pub use transaction_store::InMemoryTransactionStore;
pub use wallet_ledger::InMemoryWalletLedger;
