//! Wallet-related types
//!
//! A wallet is an account held by one participant. Balances are kept in
//! minor currency units so the ledger never deals with fractional values.

use serde::{Deserialize, Serialize};

/// Participant (bank) code, e.g. `BCA` or `BRI`
pub type ParticipantCode = String;

/// Opaque wallet identifier, e.g. `wallet-bca-001`
pub type WalletId = String;

/// Amount in minor currency units
pub type Amount = u64;

/// Wallet state held by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet identifier
    pub id: WalletId,

    /// Code of the participant that owns this wallet
    pub owner: ParticipantCode,

    /// Account number at the owning participant
    pub account_number: String,

    /// Current balance in minor units
    ///
    /// Only the ledger's debit and credit operations change this value.
    pub balance: Amount,

    /// ISO currency code of the wallet
    pub currency: String,

    /// Inactive wallets cannot take part in new transfers
    pub active: bool,
}

impl Wallet {
    /// Create an active wallet
    pub fn new(
        id: impl Into<WalletId>,
        owner: impl Into<ParticipantCode>,
        account_number: impl Into<String>,
        balance: Amount,
        currency: impl Into<String>,
    ) -> Self {
        Wallet {
            id: id.into(),
            owner: owner.into(),
            account_number: account_number.into(),
            balance,
            currency: currency.into(),
            active: true,
        }
    }
}
