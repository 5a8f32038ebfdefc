use log::debug;

use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;

/// Pending transactions keyed by id
pub type TransactionMap = BTreeMap<String, Transaction>;

/// Registry of transactions waiting to be mined
///
/// Iteration follows id order. The pool does not stop a sender from queuing
/// several transactions; callers use [`TransactionPool::existing_transaction`]
/// for that.
#[derive(Debug, Default)]
pub struct TransactionPool {
    transactions: RwLock<TransactionMap>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `transaction`, replacing any entry with the same id
    pub fn set(&self, transaction: Transaction) {
        self.transactions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(transaction.id.clone(), transaction);
    }

    /// Replaces the whole pool, e.g. with a peer's pool during synchronisation
    pub fn set_map(&self, transactions: TransactionMap) {
        *self
            .transactions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = transactions;
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        self.transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Snapshot of every pending transaction
    pub fn transaction_map(&self) -> TransactionMap {
        self.transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First pending transaction sent from `address`
    pub fn existing_transaction(&self, address: &Address) -> Option<Transaction> {
        self.transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|transaction| &transaction.input.address == address)
            .cloned()
    }

    /// Pending transactions that pass validation, in pool order
    ///
    /// Invalid entries are logged and skipped, but stay in the pool.
    pub fn valid_transactions(&self) -> Vec<Transaction> {
        self.transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|transaction| transaction.is_valid())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.transactions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Drops every pending transaction that appears in a block of `chain`
    pub fn clear_confirmed(&self, chain: &[Block]) {
        let confirmed: HashSet<&str> = chain
            .iter()
            .flat_map(|block| block.data.iter())
            .map(|transaction| transaction.id.as_str())
            .collect();

        let mut transactions = self
            .transactions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = transactions.len();
        transactions.retain(|id, _| !confirmed.contains(id.as_str()));

        let removed = before - transactions.len();
        if removed > 0 {
            debug!("Removed {} confirmed transactions from the pool", removed);
        }
    }

    pub fn len(&self) -> usize {
        self.transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
