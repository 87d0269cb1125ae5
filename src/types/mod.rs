//! Types module
//!
//! Contains core data structures used throughout the engine:
//! - `wallet`: Wallet ledger entries and identifiers
//! - `transaction`: Transfer record, status machine and step log
//! - `escrow`: Escrow custody record and bearer token
//! - `protocol`: Operation receipts and the counterparty notification payload
//! - `error`: Error types for the escrow engine

pub mod error;
pub mod escrow;
pub mod protocol;
pub mod transaction;
pub mod wallet;

pub use error::{ErrorKind, TransferError};
pub use escrow::{EscrowId, EscrowStatus, EscrowToken, EscrowWallet};
pub use protocol::{
    CancelReceipt, CompleteReceipt, ExecuteReceipt, IncomingTransferNotification,
    InitiateReceipt, ParticipantWallets, RefundReceipt, WalletValidation,
};
pub use transaction::{
    StepId, StepKind, StepLogEntry, StepOutcome, Transaction, TransactionId, TransactionStatus,
    TransferRequest,
};
pub use wallet::{Amount, ParticipantCode, Wallet, WalletId};
