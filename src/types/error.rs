//! Error types for the interbank escrow engine
//!
//! Every public engine operation returns `Result<T, TransferError>`.
//! Variants carry enough context to produce a descriptive log line, and each
//! one maps to a stable machine code ([`TransferError::code`]) and a category
//! ([`TransferError::kind`]).
//!
//! # Error Categories
//!
//! - **Validation**: malformed input, rejected before any state is created
//! - **Authorization**: the caller is not allowed to perform the operation
//! - **Resource state**: a wallet, escrow or transaction is in the wrong state
//! - **Input**: files, CSV rows and configuration read by the binary

use thiserror::Error;

use super::escrow::EscrowId;
use super::transaction::TransactionId;
use super::wallet::Amount;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    ResourceState,
    Input,
}

/// Main error type for the escrow engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransferError {
    // === Validation ===
    /// A required field is empty
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Amount is zero
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Unsupported currency: {currency}")]
    UnsupportedCurrency { currency: String },

    /// Wallet currency differs from the transfer currency
    #[error("Currency mismatch on wallet {wallet}: wallet holds {wallet_currency}, transfer is in {currency}")]
    CurrencyMismatch {
        wallet: String,
        wallet_currency: String,
        currency: String,
    },

    #[error("Source and destination wallet cannot be the same ({wallet})")]
    SameWallet { wallet: String },

    // === Authorization ===
    /// Caller is neither source nor destination participant
    #[error("Participant {caller} is not a party to transaction {transaction}")]
    NotParty {
        caller: String,
        transaction: TransactionId,
    },

    /// Operation is reserved to the source participant
    #[error("Only the source participant may {operation} transaction {transaction} (caller {caller})")]
    NotSource {
        caller: String,
        transaction: TransactionId,
        operation: String,
    },

    #[error("Wallet {wallet} belongs to {owner}, not {expected}")]
    OwnershipMismatch {
        wallet: String,
        owner: String,
        expected: String,
    },

    #[error("Invalid credentials for participant '{participant}'")]
    InvalidCredentials { participant: String },

    // === Resource state ===
    #[error("Participant {participant} is not connected")]
    ParticipantNotConnected { participant: String },

    #[error("Wallet {wallet} not found")]
    WalletNotFound { wallet: String },

    #[error("Wallet {wallet} is inactive")]
    WalletInactive { wallet: String },

    #[error("Insufficient funds in wallet {wallet}: available {available}, requested {requested}")]
    InsufficientFunds {
        wallet: String,
        available: Amount,
        requested: Amount,
    },

    /// Credit would overflow the wallet balance
    #[error("Balance overflow on wallet {wallet}")]
    BalanceOverflow { wallet: String },

    #[error("Escrow {escrow} has expired")]
    EscrowExpired { escrow: EscrowId },

    #[error("No escrow for transaction {transaction}")]
    EscrowNotFound { transaction: TransactionId },

    #[error("Escrow {escrow} not found")]
    UnknownEscrow { escrow: EscrowId },

    #[error("Escrow already exists for transaction {transaction}")]
    EscrowAlreadyExists { transaction: TransactionId },

    #[error("Transaction {transaction} is already linked to escrow {escrow}")]
    EscrowAlreadyLinked {
        transaction: TransactionId,
        escrow: EscrowId,
    },

    /// Presented token matches no escrow
    #[error("Invalid escrow token")]
    InvalidToken,

    #[error("Transaction {transaction} not found")]
    TransactionNotFound { transaction: TransactionId },

    /// Presented destination wallet differs from the declared one
    #[error("Destination mismatch on transaction {transaction}: expected {expected}, got {presented}")]
    DestinationMismatch {
        transaction: TransactionId,
        expected: String,
        presented: String,
    },

    /// Operation is not allowed in the current status
    #[error("Cannot {operation} transaction {transaction} in status {status}")]
    InvalidState {
        transaction: TransactionId,
        status: String,
        operation: String,
    },

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Nothing to refund for transaction {transaction}")]
    NothingToRefund { transaction: TransactionId },

    // === Input ===
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error: {message}")]
    IoError { message: String },

    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError { line: Option<u64>, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl TransferError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::MissingField { .. } => "MISSING_FIELD",
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::UnsupportedCurrency { .. } => "UNSUPPORTED_CURRENCY",
            TransferError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            TransferError::SameWallet { .. } => "SAME_WALLET",
            TransferError::NotParty { .. } => "NOT_PARTY",
            TransferError::NotSource { .. } => "NOT_SOURCE",
            TransferError::OwnershipMismatch { .. } => "OWNERSHIP_MISMATCH",
            TransferError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            TransferError::ParticipantNotConnected { .. } => "PARTICIPANT_NOT_CONNECTED",
            TransferError::WalletNotFound { .. } => "WALLET_NOT_FOUND",
            TransferError::WalletInactive { .. } => "WALLET_INACTIVE",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::BalanceOverflow { .. } => "BALANCE_OVERFLOW",
            TransferError::EscrowExpired { .. } => "ESCROW_EXPIRED",
            TransferError::EscrowNotFound { .. } => "ESCROW_NOT_FOUND",
            TransferError::UnknownEscrow { .. } => "UNKNOWN_ESCROW",
            TransferError::EscrowAlreadyExists { .. } => "ESCROW_ALREADY_EXISTS",
            TransferError::EscrowAlreadyLinked { .. } => "ESCROW_ALREADY_LINKED",
            TransferError::InvalidToken => "INVALID_TOKEN",
            TransferError::TransactionNotFound { .. } => "TRANSACTION_NOT_FOUND",
            TransferError::DestinationMismatch { .. } => "DESTINATION_MISMATCH",
            TransferError::InvalidState { .. } => "INVALID_STATE",
            TransferError::InvalidTransition { .. } => "INVALID_TRANSITION",
            TransferError::NothingToRefund { .. } => "NOTHING_TO_REFUND",
            TransferError::FileNotFound { .. } => "FILE_NOT_FOUND",
            TransferError::IoError { .. } => "IO_ERROR",
            TransferError::ParseError { .. } => "PARSE_ERROR",
            TransferError::ConfigError { .. } => "CONFIG_ERROR",
        }
    }

    /// Error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::MissingField { .. }
            | TransferError::InvalidAmount
            | TransferError::UnsupportedCurrency { .. }
            | TransferError::CurrencyMismatch { .. }
            | TransferError::SameWallet { .. } => ErrorKind::Validation,

            TransferError::NotParty { .. }
            | TransferError::NotSource { .. }
            | TransferError::OwnershipMismatch { .. }
            | TransferError::InvalidCredentials { .. } => ErrorKind::Authorization,

            TransferError::FileNotFound { .. }
            | TransferError::IoError { .. }
            | TransferError::ParseError { .. }
            | TransferError::ConfigError { .. } => ErrorKind::Input,

            _ => ErrorKind::ResourceState,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(error: std::io::Error) -> Self {
        TransferError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for TransferError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        TransferError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<csv_async::Error> for TransferError {
    fn from(error: csv_async::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        TransferError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl TransferError {
    pub fn missing_field(field: &str) -> Self {
        TransferError::MissingField {
            field: field.to_string(),
        }
    }

    pub fn unsupported_currency(currency: &str) -> Self {
        TransferError::UnsupportedCurrency {
            currency: currency.to_string(),
        }
    }

    pub fn not_party(caller: &str, transaction: TransactionId) -> Self {
        TransferError::NotParty {
            caller: caller.to_string(),
            transaction,
        }
    }

    pub fn not_source(caller: &str, transaction: TransactionId, operation: &str) -> Self {
        TransferError::NotSource {
            caller: caller.to_string(),
            transaction,
            operation: operation.to_string(),
        }
    }

    pub fn not_connected(participant: &str) -> Self {
        TransferError::ParticipantNotConnected {
            participant: participant.to_string(),
        }
    }

    pub fn wallet_not_found(wallet: &str) -> Self {
        TransferError::WalletNotFound {
            wallet: wallet.to_string(),
        }
    }

    pub fn wallet_inactive(wallet: &str) -> Self {
        TransferError::WalletInactive {
            wallet: wallet.to_string(),
        }
    }

    pub fn insufficient_funds(wallet: &str, available: Amount, requested: Amount) -> Self {
        TransferError::InsufficientFunds {
            wallet: wallet.to_string(),
            available,
            requested,
        }
    }

    pub fn transaction_not_found(transaction: TransactionId) -> Self {
        TransferError::TransactionNotFound { transaction }
    }

    pub fn invalid_state(transaction: TransactionId, status: &str, operation: &str) -> Self {
        TransferError::InvalidState {
            transaction,
            status: status.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn invalid_transition(entity: &str, from: &str, to: &str) -> Self {
        TransferError::InvalidTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        TransferError::ConfigError {
            message: message.into(),
        }
    }
}
