//! Thread-safe escrow wallet store
//!
//! `InMemoryEscrowStore` keeps escrow records in a `DashMap` keyed by escrow
//! id, with two secondary indexes: owning transaction and bearer token. The
//! transaction index is claimed first on `create`, which makes "one escrow per
//! transaction" atomic even when two creates race.

use chrono::Duration;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::traits::EscrowStore;
use crate::types::{
    Amount, EscrowId, EscrowToken, EscrowWallet, TransactionId, TransferError,
};

#[derive(Debug, Default)]
pub struct InMemoryEscrowStore {
    escrows: DashMap<EscrowId, EscrowWallet>,
    by_transaction: DashMap<TransactionId, EscrowId>,
    by_token: DashMap<EscrowToken, EscrowId>,
}

impl InMemoryEscrowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.escrows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escrows.is_empty()
    }
}

impl EscrowStore for InMemoryEscrowStore {
    fn create(
        &self,
        transaction_id: TransactionId,
        amount: Amount,
        currency: &str,
        ttl: Duration,
    ) -> Result<EscrowWallet, TransferError> {
        let escrow = EscrowWallet::new(transaction_id, amount, currency, ttl);

        match self.by_transaction.entry(transaction_id) {
            Entry::Occupied(_) => {
                return Err(TransferError::EscrowAlreadyExists {
                    transaction: transaction_id,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(escrow.id);
            }
        }

        self.by_token.insert(escrow.token.clone(), escrow.id);
        self.escrows.insert(escrow.id, escrow.clone());
        Ok(escrow)
    }

    fn get(&self, escrow_id: EscrowId) -> Option<EscrowWallet> {
        self.escrows.get(&escrow_id).map(|escrow| escrow.clone())
    }

    fn find_by_token(&self, token: &EscrowToken) -> Option<EscrowWallet> {
        let escrow_id = *self.by_token.get(token)?;
        self.get(escrow_id)
    }

    fn find_by_transaction(&self, transaction_id: TransactionId) -> Option<EscrowWallet> {
        let escrow_id = *self.by_transaction.get(&transaction_id)?;
        self.get(escrow_id)
    }

    fn update<F, R>(&self, escrow_id: EscrowId, f: F) -> Result<R, TransferError>
    where
        F: FnOnce(&mut EscrowWallet) -> Result<R, TransferError>,
    {
        let mut entry = self
            .escrows
            .get_mut(&escrow_id)
            .ok_or(TransferError::UnknownEscrow { escrow: escrow_id })?;

        let mut working = entry.value().clone();
        let result = f(&mut working)?;
        *entry.value_mut() = working;
        Ok(result)
    }
}
