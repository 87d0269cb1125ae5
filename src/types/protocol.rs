//! Receipts returned by engine operations and the payload delivered to the
//! destination participant.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::escrow::EscrowToken;
use super::transaction::{TransactionId, TransactionStatus};
use super::wallet::{Amount, ParticipantCode, Wallet, WalletId};

/// Result of a successful initiate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiateReceipt {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub escrow_token: EscrowToken,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// Result of an execute call
///
/// `notified` is false when the funds are in escrow but the destination
/// could not be reached; the transfer can still be settled or refunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecuteReceipt {
    pub executed: bool,
    pub notified: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompleteReceipt {
    pub transaction_id: TransactionId,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelReceipt {
    pub transaction_id: TransactionId,
    pub cancelled: bool,
    /// Funds stay in escrow until refunded
    pub funds_in_escrow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundReceipt {
    pub transaction_id: TransactionId,
    pub refunded: Amount,
    pub wallet: WalletId,
}

/// Payload delivered to the destination participant once funds are escrowed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomingTransferNotification {
    pub transaction_id: TransactionId,
    pub from_participant: ParticipantCode,
    pub to_participant: ParticipantCode,
    pub to_wallet: WalletId,
    pub amount: Amount,
    pub currency: String,
    pub escrow_token: EscrowToken,
    pub reference: Option<String>,
    pub description: Option<String>,
}

/// Wallets held by one participant
///
/// Totals are kept per currency since balances are never converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantWallets {
    pub participant: ParticipantCode,
    pub wallets: Vec<Wallet>,
    pub totals: BTreeMap<String, u128>,
}

impl ParticipantWallets {
    pub fn new(participant: &str, wallets: Vec<Wallet>) -> Self {
        let mut totals = BTreeMap::new();
        for wallet in &wallets {
            *totals.entry(wallet.currency.clone()).or_insert(0u128) += u128::from(wallet.balance);
        }
        Self {
            participant: participant.to_string(),
            wallets,
            totals,
        }
    }

    /// Sum of balances in `currency`; zero when no wallet holds it
    pub fn total(&self, currency: &str) -> u128 {
        self.totals.get(currency).copied().unwrap_or(0)
    }
}

/// Public view of a wallet lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletValidation {
    pub wallet_id: WalletId,
    pub exists: bool,
    pub active: bool,
    pub account_number: Option<String>,
    pub currency: Option<String>,
}
