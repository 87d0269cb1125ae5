//! Escrow wallet types
//!
//! An escrow wallet is a short-lived custody record that holds a transfer's
//! funds between the source debit and the destination credit. It is bound to
//! exactly one transaction and carries the bearer token that settles it.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::TransferError;
use super::transaction::TransactionId;
use super::wallet::Amount;

/// Escrow wallet identifier
pub type EscrowId = Uuid;

const TOKEN_PREFIX: &str = "tok_";
const TOKEN_BYTES: usize = 32;

/// Opaque bearer credential for settling an escrow
///
/// Holding the token is the only thing required to complete a transfer, so
/// it never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscrowToken(String);

impl EscrowToken {
    /// Generate a fresh token from 256 bits of OS randomness
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        EscrowToken(format!("{}{}", TOKEN_PREFIX, hex::encode(bytes)))
    }

    /// Wrap a token presented by a caller
    pub fn from_presented(value: impl Into<String>) -> Self {
        EscrowToken(value.into())
    }

    /// Raw token value, for handing to the counterparty
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EscrowToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EscrowToken(<redacted>)")
    }
}

/// Escrow lifecycle status
///
/// ```text
/// created -> funds_received -> funds_sent -> completed
///    \            \
///     +------------+--> failed -> refunded
///                  \
///                   +--> refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Created,
    FundsReceived,
    FundsSent,
    Completed,
    Failed,
    Refunded,
}

impl EscrowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscrowStatus::Completed | EscrowStatus::Failed | EscrowStatus::Refunded
        )
    }

    /// Whether `next` is a legal successor of this status
    ///
    /// `failed -> refunded` is the one transition out of a terminal status;
    /// whether the failed escrow actually holds funds is checked by
    /// [`EscrowWallet::transition_to`].
    pub fn can_transition_to(&self, next: EscrowStatus) -> bool {
        use EscrowStatus::*;
        matches!(
            (self, next),
            (Created, FundsReceived)
                | (FundsReceived, FundsSent)
                | (FundsSent, Completed)
                | (Created, Failed)
                | (FundsReceived, Failed)
                | (FundsReceived, Refunded)
                | (Failed, Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Created => "created",
            EscrowStatus::FundsReceived => "funds_received",
            EscrowStatus::FundsSent => "funds_sent",
            EscrowStatus::Completed => "completed",
            EscrowStatus::Failed => "failed",
            EscrowStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escrow custody record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowWallet {
    pub id: EscrowId,
    pub transaction_id: TransactionId,
    pub amount: Amount,
    pub currency: String,
    #[serde(skip_serializing)]
    pub token: EscrowToken,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set when the source debit lands in custody
    pub funded_at: Option<DateTime<Utc>>,
}

impl EscrowWallet {
    /// Create an escrow in `created` status that expires after `ttl`
    pub fn new(
        transaction_id: TransactionId,
        amount: Amount,
        currency: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        EscrowWallet {
            id: Uuid::new_v4(),
            transaction_id,
            amount,
            currency: currency.into(),
            token: EscrowToken::generate(),
            status: EscrowStatus::Created,
            created_at: now,
            expires_at: now + ttl,
            funded_at: None,
        }
    }

    /// Expiry check; `now == expires_at` already counts as expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether funds are in custody and not yet released
    pub fn holds_funds(&self) -> bool {
        match self.status {
            EscrowStatus::FundsReceived => true,
            EscrowStatus::Failed => self.funded_at.is_some(),
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition_to(&mut self, next: EscrowStatus) -> Result<(), TransferError> {
        let allowed = self.status.can_transition_to(next)
            && (next != EscrowStatus::Refunded || self.holds_funds());
        if !allowed {
            return Err(TransferError::invalid_transition(
                "escrow",
                self.status.as_str(),
                next.as_str(),
            ));
        }
        if next == EscrowStatus::FundsReceived {
            self.funded_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use EscrowStatus::*;

    fn escrow() -> EscrowWallet {
        EscrowWallet::new(Uuid::new_v4(), 50_000, "IDR", Duration::minutes(30))
    }

    #[test]
    fn test_token_shape_and_uniqueness() {
        let a = EscrowToken::generate();
        let b = EscrowToken::generate();

        assert!(a.expose().starts_with("tok_"));
        assert_eq!(a.expose().len(), 4 + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = EscrowToken::generate();
        let debug = format!("{:?}", token);

        assert!(!debug.contains(token.expose()));
        assert_eq!(debug, "EscrowToken(<redacted>)");
    }

    #[test]
    fn test_escrow_debug_hides_token() {
        let escrow = escrow();
        let debug = format!("{:?}", escrow);

        assert!(!debug.contains(escrow.token.expose()));
    }

    #[test]
    fn test_expiry_boundary() {
        let escrow = escrow();

        assert!(!escrow.is_expired(escrow.created_at));
        assert!(escrow.is_expired(escrow.expires_at));
        assert!(escrow.is_expired(escrow.expires_at + Duration::seconds(1)));
    }

    #[rstest]
    #[case::fund(Created, FundsReceived, true)]
    #[case::send(FundsReceived, FundsSent, true)]
    #[case::complete(FundsSent, Completed, true)]
    #[case::fail_created(Created, Failed, true)]
    #[case::fail_funded(FundsReceived, Failed, true)]
    #[case::refund_funded(FundsReceived, Refunded, true)]
    #[case::fail_after_send(FundsSent, Failed, false)]
    #[case::skip_funding(Created, FundsSent, false)]
    #[case::reopen(Completed, Created, false)]
    fn test_status_transitions(
        #[case] from: EscrowStatus,
        #[case] to: EscrowStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_funding_sets_funded_at() {
        let mut escrow = escrow();
        escrow.transition_to(FundsReceived).unwrap();

        assert!(escrow.funded_at.is_some());
        assert!(escrow.holds_funds());
    }

    #[test]
    fn test_refund_requires_funds_in_custody() {
        let mut unfunded = escrow();
        unfunded.transition_to(Failed).unwrap();
        assert!(!unfunded.holds_funds());
        assert!(unfunded.transition_to(Refunded).is_err());

        let mut funded = escrow();
        funded.transition_to(FundsReceived).unwrap();
        funded.transition_to(Failed).unwrap();
        assert!(funded.holds_funds());
        funded.transition_to(Refunded).unwrap();
        assert!(!funded.holds_funds());
    }
}
