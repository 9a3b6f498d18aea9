//! Transaction cache of a wallet.
//!
//! Transactions are kept per group together with a hash index mapping every known hash to the
//! group holding it. Both keys are only ever changed through [`TransactionLedger::add`] and
//! [`TransactionLedger::remove`], which keep them in sync: a hash is in the index iff exactly one
//! group contains it.

use crate::node::{TransactionData, TransactionGroup};
use crate::store::StoreError;

use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::debug;

/// What `add` did with a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    /// Promoted from an earlier lifecycle stage.
    Moved { from: TransactionGroup },
    /// Already present in the target group.
    Duplicate,
    /// Already known in a later stage; the report is outdated.
    Stale { current: TransactionGroup },
}

#[derive(Debug, Clone, Default)]
pub struct TransactionLedger {
    confirmed: Vec<TransactionData>,
    unconfirmed: Vec<TransactionData>,
    partial: Vec<TransactionData>,
    hash_index: HashMap<String, TransactionGroup>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, group: TransactionGroup) -> &Vec<TransactionData> {
        match group {
            TransactionGroup::Confirmed => &self.confirmed,
            TransactionGroup::Unconfirmed => &self.unconfirmed,
            TransactionGroup::Partial => &self.partial,
        }
    }

    fn group_mut(&mut self, group: TransactionGroup) -> &mut Vec<TransactionData> {
        match group {
            TransactionGroup::Confirmed => &mut self.confirmed,
            TransactionGroup::Unconfirmed => &mut self.unconfirmed,
            TransactionGroup::Partial => &mut self.partial,
        }
    }

    /// Record a transaction reported in `group`.
    pub fn add(&mut self, group: TransactionGroup, transaction: TransactionData) -> AddOutcome {
        let mut outcome = AddOutcome::Inserted;

        if let Some(&current) = self.hash_index.get(&transaction.hash) {
            if current == group {
                return AddOutcome::Duplicate;
            }
            if current.stage() > group.stage() {
                debug!(
                    "Ignoring {} report of {}, already {}",
                    group, transaction.hash, current
                );
                return AddOutcome::Stale { current };
            }
            self.group_mut(current)
                .retain(|known| known.hash != transaction.hash);
            outcome = AddOutcome::Moved { from: current };
        }

        let hash = transaction.hash.clone();
        let target = self.group_mut(group);
        if !target.iter().any(|known| known.hash == hash) {
            target.push(transaction);
        }
        self.hash_index.insert(hash, group);
        outcome
    }

    /// Same as [`add`](Self::add) with the group given by name.
    pub fn add_named(
        &mut self,
        group: &str,
        transaction: TransactionData,
    ) -> Result<AddOutcome, StoreError> {
        Ok(self.add(group.parse()?, transaction))
    }

    /// Forget a transaction of `group`. Returns false if the group does not hold it.
    pub fn remove(&mut self, group: TransactionGroup, hash: &str) -> bool {
        let collection = self.group_mut(group);
        let Some(position) = collection.iter().position(|known| known.hash == hash) else {
            return false;
        };
        collection.remove(position);
        self.hash_index.remove(hash);
        true
    }

    /// Same as [`remove`](Self::remove) with the group given by name.
    pub fn remove_named(&mut self, group: &str, hash: &str) -> Result<bool, StoreError> {
        Ok(self.remove(group.parse()?, hash))
    }

    /// Forget a pending transaction, whichever pending group holds it.
    pub fn remove_pending(&mut self, hash: &str) -> bool {
        let unconfirmed = self.remove(TransactionGroup::Unconfirmed, hash);
        let partial = self.remove(TransactionGroup::Partial, hash);
        unconfirmed || partial
    }

    /// Transactions of `group` in display order: confirmed by height then index, pending by
    /// index, newest first.
    pub fn transactions(&self, group: TransactionGroup) -> Vec<TransactionData> {
        let mut transactions = self.group(group).clone();
        match group {
            TransactionGroup::Confirmed => {
                transactions.sort_by_key(|tx| Reverse((tx.height.unwrap_or(0), tx.index)))
            }
            TransactionGroup::Unconfirmed | TransactionGroup::Partial => {
                transactions.sort_by_key(|tx| Reverse(tx.index))
            }
        }
        transactions
    }

    pub fn group_of(&self, hash: &str) -> Option<TransactionGroup> {
        self.hash_index.get(hash).copied()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hash_index.contains_key(hash)
    }

    pub fn len(&self, group: TransactionGroup) -> usize {
        self.group(group).len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash_index.is_empty()
    }

    /// Every known hash.
    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        self.hash_index.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
