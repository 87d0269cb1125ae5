//! Thread-safe wallet ledger
//!
//! This module provides `InMemoryWalletLedger`, the in-memory implementation of
//! [`WalletLedger`]. Wallets are stored in a `DashMap`, so debits and credits
//! on one wallet run while holding that wallet's shard lock and are therefore
//! atomic, while operations on wallets in other shards proceed in parallel.
//!
//! # Balance invariants
//!
//! - A balance is never negative: `debit` checks and subtracts under the same
//!   lock and rejects with `InsufficientFunds` otherwise
//! - Credits that would overflow `u64` are rejected
//! - A rejected operation leaves the balance unchanged

use dashmap::DashMap;
use tracing::debug;

use super::traits::WalletLedger;
use crate::types::{Amount, ParticipantCode, TransferError, Wallet, WalletId};

/// Concurrent wallet ledger backed by `DashMap`
#[derive(Debug, Default)]
pub struct InMemoryWalletLedger {
    wallets: DashMap<WalletId, Wallet>,
}

impl InMemoryWalletLedger {
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
        }
    }

    /// Build a ledger pre-populated with `wallets`
    pub fn with_wallets(wallets: impl IntoIterator<Item = Wallet>) -> Self {
        let ledger = Self::new();
        for wallet in wallets {
            ledger.insert(wallet);
        }
        ledger
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

impl WalletLedger for InMemoryWalletLedger {
    fn debit(&self, wallet_id: &str, amount: Amount) -> Result<Amount, TransferError> {
        let mut wallet = self
            .wallets
            .get_mut(wallet_id)
            .ok_or_else(|| TransferError::wallet_not_found(wallet_id))?;

        let new_balance = wallet
            .balance
            .checked_sub(amount)
            .ok_or_else(|| TransferError::insufficient_funds(wallet_id, wallet.balance, amount))?;
        wallet.balance = new_balance;

        debug!(wallet_id, amount, balance = new_balance, "wallet debited");
        Ok(new_balance)
    }

    fn credit(&self, wallet_id: &str, amount: Amount) -> Result<Amount, TransferError> {
        let mut wallet = self
            .wallets
            .get_mut(wallet_id)
            .ok_or_else(|| TransferError::wallet_not_found(wallet_id))?;

        let new_balance =
            wallet
                .balance
                .checked_add(amount)
                .ok_or_else(|| TransferError::BalanceOverflow {
                    wallet: wallet_id.to_string(),
                })?;
        wallet.balance = new_balance;

        debug!(wallet_id, amount, balance = new_balance, "wallet credited");
        Ok(new_balance)
    }

    fn is_active(&self, wallet_id: &str) -> bool {
        self.wallets
            .get(wallet_id)
            .map(|wallet| wallet.active)
            .unwrap_or(false)
    }

    fn owner_of(&self, wallet_id: &str) -> Option<ParticipantCode> {
        self.wallets.get(wallet_id).map(|wallet| wallet.owner.clone())
    }

    fn get(&self, wallet_id: &str) -> Option<Wallet> {
        self.wallets.get(wallet_id).map(|wallet| wallet.clone())
    }

    fn insert(&self, wallet: Wallet) {
        self.wallets.insert(wallet.id.clone(), wallet);
    }

    fn all(&self) -> Vec<Wallet> {
        self.wallets
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::sync::Arc;
    use std::thread;

    #[fixture]
    fn ledger() -> InMemoryWalletLedger {
        InMemoryWalletLedger::with_wallets([
            Wallet::new("wallet-bca-001", "BCA", "1234567890", 1_000_000, "IDR"),
            Wallet::new("wallet-bri-001", "BRI", "5555555555", 750_000, "IDR"),
        ])
    }

    #[rstest]
    fn test_debit_reduces_balance(ledger: InMemoryWalletLedger) {
        let balance = ledger.debit("wallet-bca-001", 50_000).unwrap();

        assert_eq!(balance, 950_000);
        assert_eq!(ledger.get("wallet-bca-001").unwrap().balance, 950_000);
    }

    #[rstest]
    fn test_debit_exact_balance_reaches_zero(ledger: InMemoryWalletLedger) {
        assert_eq!(ledger.debit("wallet-bri-001", 750_000).unwrap(), 0);
    }

    #[rstest]
    fn test_debit_insufficient_funds_leaves_balance(ledger: InMemoryWalletLedger) {
        let result = ledger.debit("wallet-bri-001", 750_001);

        assert_eq!(
            result,
            Err(TransferError::insufficient_funds(
                "wallet-bri-001",
                750_000,
                750_001
            ))
        );
        assert_eq!(ledger.get("wallet-bri-001").unwrap().balance, 750_000);
    }

    #[rstest]
    #[case::debit(true)]
    #[case::credit(false)]
    fn test_unknown_wallet(ledger: InMemoryWalletLedger, #[case] debit: bool) {
        let result = if debit {
            ledger.debit("wallet-missing", 1)
        } else {
            ledger.credit("wallet-missing", 1)
        };

        assert_eq!(result, Err(TransferError::wallet_not_found("wallet-missing")));
    }

    #[rstest]
    fn test_credit_overflow_rejected(ledger: InMemoryWalletLedger) {
        let result = ledger.credit("wallet-bca-001", u64::MAX);

        assert!(matches!(result, Err(TransferError::BalanceOverflow { .. })));
        assert_eq!(ledger.get("wallet-bca-001").unwrap().balance, 1_000_000);
    }

    #[rstest]
    fn test_owner_and_active(ledger: InMemoryWalletLedger) {
        let mut inactive = Wallet::new("wallet-dlb-009", "DLB", "000", 10, "IDR");
        inactive.active = false;
        ledger.insert(inactive);

        assert_eq!(ledger.owner_of("wallet-bca-001").as_deref(), Some("BCA"));
        assert_eq!(ledger.owner_of("wallet-missing"), None);
        assert!(ledger.is_active("wallet-bca-001"));
        assert!(!ledger.is_active("wallet-dlb-009"));
        assert!(!ledger.is_active("wallet-missing"));
        assert_eq!(ledger.all().len(), 3);
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let ledger = Arc::new(InMemoryWalletLedger::with_wallets([Wallet::new(
            "wallet-bca-002",
            "BCA",
            "0987654321",
            500_000,
            "IDR",
        )]));

        // 16 debits of 40,000 against 500,000: exactly 12 can succeed
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || ledger.debit("wallet-bca-002", 40_000).is_ok())
            })
            .collect();

        let succeeded = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 12);
        assert_eq!(ledger.get("wallet-bca-002").unwrap().balance, 20_000);
    }
}
