//! Pool entries and their priority ordering.

use crate::crypto::Address;
use crate::transaction::{Transaction, TxId};
use std::cmp::Ordering;

/// A transaction resident in the main pool.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub tx: Transaction,
    pub id: TxId,
    /// Admission time in milliseconds.
    pub added_at: u64,
    pub size: usize,
    pub fee_rate: f64,
    /// Arrival order; breaks fee-rate ties.
    pub sequence: u64,
    /// Ids this transaction superseded through replace-by-fee, oldest first.
    pub replaces: Vec<TxId>,
}

impl PendingTransaction {
    pub fn new(tx: Transaction, added_at: u64, sequence: u64) -> Self {
        let id = tx.id();
        let size = tx.size();
        let fee_rate = tx.fee_rate();
        Self {
            tx,
            id,
            added_at,
            size,
            fee_rate,
            sequence,
            replaces: Vec::new(),
        }
    }

    pub fn sender(&self) -> Address {
        self.tx.sender
    }

    pub fn nonce(&self) -> u64 {
        self.tx.nonce
    }

    pub fn age_secs(&self, now_millis: u64) -> u64 {
        now_millis.saturating_sub(self.added_at) / 1000
    }

    pub(crate) fn priority_key(&self) -> FeeKey {
        FeeKey {
            fee_rate: self.fee_rate,
            sequence: self.sequence,
            id: self.id,
        }
    }
}

/// A transaction waiting for inputs the UTXO set has not seen yet.
#[derive(Debug, Clone)]
pub struct OrphanTransaction {
    pub tx: Transaction,
    pub id: TxId,
    pub added_at: u64,
}

/// Ordering key: highest fee-rate first, then earliest arrival, then id.
/// The last element of a sorted set is therefore the eviction candidate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FeeKey {
    pub fee_rate: f64,
    pub sequence: u64,
    pub id: TxId,
}

impl PartialEq for FeeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FeeKey {}

impl Ord for FeeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fee_rate
            .total_cmp(&self.fee_rate)
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for FeeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
