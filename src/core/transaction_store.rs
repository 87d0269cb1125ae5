//! Thread-safe transaction storage
//!
//! `InMemoryTransactionStore` holds transaction records, including their step
//! logs, in a `DashMap`. The step log only ever grows: `append_step` pushes to
//! the end and nothing in this store edits or removes an existing entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::traits::TransactionStore;
use crate::types::{StepLogEntry, Transaction, TransactionId, TransferError};

#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    transactions: DashMap<TransactionId, Transaction>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn insert(&self, transaction: Transaction) -> Result<(), TransferError> {
        match self.transactions.entry(transaction.id) {
            Entry::Occupied(existing) => Err(TransferError::invalid_state(
                *existing.key(),
                existing.get().status.as_str(),
                "insert",
            )),
            Entry::Vacant(slot) => {
                slot.insert(transaction);
                Ok(())
            }
        }
    }

    fn get(&self, transaction_id: TransactionId) -> Option<Transaction> {
        self.transactions.get(&transaction_id).map(|tx| tx.clone())
    }

    fn update<F, R>(&self, transaction_id: TransactionId, f: F) -> Result<R, TransferError>
    where
        F: FnOnce(&mut Transaction) -> Result<R, TransferError>,
    {
        let mut entry = self
            .transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| TransferError::transaction_not_found(transaction_id))?;

        let mut working = entry.value().clone();
        let result = f(&mut working)?;
        *entry.value_mut() = working;
        Ok(result)
    }

    fn append_step(&self, entry: StepLogEntry) -> Result<(), TransferError> {
        let mut transaction = self
            .transactions
            .get_mut(&entry.transaction_id)
            .ok_or_else(|| TransferError::transaction_not_found(entry.transaction_id))?;

        transaction.steps.push(entry);
        Ok(())
    }

    fn all(&self) -> Vec<Transaction> {
        self.transactions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepKind, StepOutcome, TransactionStatus, TransferRequest};
    use serde_json::json;
    use uuid::Uuid;

    fn transaction() -> Transaction {
        Transaction::new(
            "BCA",
            &TransferRequest {
                to_participant: "BRI".to_string(),
                from_wallet: "wallet-bca-001".to_string(),
                to_wallet: "wallet-bri-001".to_string(),
                amount: 10_000,
                currency: "IDR".to_string(),
                reference: None,
                description: None,
            },
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = InMemoryTransactionStore::new();
        let tx = transaction();
        let id = tx.id;

        store.insert(tx).unwrap();

        assert_eq!(store.get(id).unwrap().status, TransactionStatus::Pending);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = InMemoryTransactionStore::new();
        let tx = transaction();
        store.insert(tx.clone()).unwrap();

        assert!(store.insert(tx).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_missing_transaction() {
        let store = InMemoryTransactionStore::new();
        let id = Uuid::new_v4();

        let result = store.update(id, |_| Ok(()));

        assert_eq!(result, Err(TransferError::transaction_not_found(id)));
    }

    #[test]
    fn test_failed_update_keeps_previous_state() {
        let store = InMemoryTransactionStore::new();
        let tx = transaction();
        let id = tx.id;
        store.insert(tx).unwrap();

        let result = store.update(id, |tx| {
            tx.transition_to(TransactionStatus::Going)?;
            tx.transition_to(TransactionStatus::Completed)
        });

        assert!(result.is_err());
        assert_eq!(store.get(id).unwrap().status, TransactionStatus::Pending);
    }

    #[test]
    fn test_append_step_preserves_order() {
        let store = InMemoryTransactionStore::new();
        let tx = transaction();
        let id = tx.id;
        store.insert(tx).unwrap();

        store
            .append_step(StepLogEntry::success(id, StepKind::Validation, json!({})))
            .unwrap();
        store
            .append_step(StepLogEntry::failure(
                id,
                StepKind::EscrowCreated,
                json!({ "error": "boom" }),
            ))
            .unwrap();

        let steps = store.get(id).unwrap().steps;
        let kinds: Vec<_> = steps.iter().map(|s| (s.kind, s.outcome)).collect();
        assert_eq!(
            kinds,
            vec![
                (StepKind::Validation, StepOutcome::Success),
                (StepKind::EscrowCreated, StepOutcome::Failure),
            ]
        );
    }

    #[test]
    fn test_append_step_for_unknown_transaction() {
        let store = InMemoryTransactionStore::new();
        let entry = StepLogEntry::success(Uuid::new_v4(), StepKind::Validation, json!({}));

        assert!(matches!(
            store.append_step(entry),
            Err(TransferError::TransactionNotFound { .. })
        ));
    }
}
