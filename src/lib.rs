//! Interbank Escrow Engine Library
//! # Overview
//!
//! This library moves funds between wallets held at independent participants
//! (banks) through a short-lived escrow, in discrete and auditable steps,
//! and ships a CSV replay harness with a sequential and a concurrent strategy.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Wallet, Transaction, EscrowWallet, errors)
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Transfer protocol orchestration
//!   - [`core::wallet_ledger`] - Wallet balances with atomic debit/credit
//!   - [`core::escrow_store`] - Escrow custody records indexed by token
//!   - [`core::transaction_store`] - Transactions and their step logs
//! - [`directory`] - Participant connectivity and credentials
//! - [`notify`] - Delivery of incoming-transfer notifications
//! - [`audit`] - Best-effort audit mirror behind an outbox
//! - [`config`] / [`logging`] - Engine configuration and tracing setup
//! - [`io`] / [`strategy`] / [`cli`] / [`app`] - CSV replay harness
//!
//! # Protocol
//!
//! - **Initiate**: validate the request, open an escrow (`pending → going`)
//! - **Execute**: debit the source into escrow, notify the destination (`going → processing`)
//! - **Complete**: the escrow token holder credits the destination (`processing → completed`)
//! - **Cancel**: either party stops an unfinished transfer (`→ cancelled`)
//! - **Refund**: escrowed funds of a failed or cancelled transfer go back to the source
//!
//! # Escrow States
//!
//! `created → funds_received → funds_sent → completed`, with `failed` reachable
//! before funds are sent and `refunded` once held funds are returned.

pub mod app;
pub mod audit;
pub mod cli;
pub mod config;
pub mod core;
pub mod directory;
pub mod io;
pub mod logging;
pub mod notify;
pub mod strategy;
pub mod types;

pub use config::EngineConfig;
pub use core::{
    EscrowStore, InMemoryEscrowStore, InMemoryTransactionStore, InMemoryWalletLedger,
    TransactionEngine, TransactionStore, WalletLedger,
};
pub use io::write_wallets_csv;
pub use types::{
    EscrowStatus, EscrowToken, EscrowWallet, StepKind, StepLogEntry, Transaction, TransactionId,
    TransactionStatus, TransferError, TransferRequest, Wallet,
};
