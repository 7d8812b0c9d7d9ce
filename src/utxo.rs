//! Thread-safe unspent output set.
//!
//! The state lives behind a single `RwLock`. Maps are held in `Arc`s and
//! mutated through `Arc::make_mut`, so a snapshot is a pointer copy and the
//! first write after it pays for the clone.

use crate::blockchain::Sha256Hash;
use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::{OutPoint, Transaction};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

pub const DEFAULT_SCRIPT: &str = "pay-to-address";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub address: Address,
    pub amount: u64,
    pub spent: bool,
    pub script: String,
}

impl Utxo {
    pub fn new(address: Address, amount: u64) -> Self {
        Utxo {
            address,
            amount,
            spent: false,
            script: DEFAULT_SCRIPT.to_string(),
        }
    }
}

/// Why a transaction's inputs cannot be spent against the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Missing(OutPoint),
    Spent(OutPoint),
    NotOwned(OutPoint),
    Overflow,
}

impl From<InputError> for ChainError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::Missing(outpoint) => {
                ChainError::NotFound(format!("Input UTXO {} does not exist", outpoint))
            }
            InputError::Spent(outpoint) => {
                ChainError::DoubleSpendDetected(format!("Input UTXO {} is already spent", outpoint))
            }
            InputError::NotOwned(outpoint) => ChainError::InvalidTransaction(format!(
                "Input UTXO {} is not owned by the sender",
                outpoint
            )),
            InputError::Overflow => {
                ChainError::InvalidTransaction("Input values overflow".to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UtxoState {
    entries: Arc<BTreeMap<OutPoint, Utxo>>,
    by_address: Arc<HashMap<Address, BTreeSet<OutPoint>>>,
}

impl UtxoState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unspent_count(&self) -> usize {
        self.entries.values().filter(|utxo| !utxo.spent).count()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.entries.get(outpoint)
    }

    pub fn add_utxo(&mut self, outpoint: OutPoint, utxo: Utxo) -> Result<(), ChainError> {
        if self.entries.contains_key(&outpoint) {
            return Err(ChainError::Conflict(format!("UTXO {} already exists", outpoint)));
        }
        Arc::make_mut(&mut self.by_address)
            .entry(utxo.address)
            .or_default()
            .insert(outpoint);
        Arc::make_mut(&mut self.entries).insert(outpoint, utxo);
        Ok(())
    }

    /// Flips the spent flag. Returns false if the output is unknown or already spent.
    pub fn mark_spent(&mut self, outpoint: &OutPoint) -> bool {
        match self.entries.get(outpoint) {
            Some(utxo) if !utxo.spent => {}
            _ => return false,
        }
        match Arc::make_mut(&mut self.entries).get_mut(outpoint) {
            Some(utxo) => {
                utxo.spent = true;
                true
            }
            None => false,
        }
    }

    pub fn utxos_for_address(&self, address: &Address) -> Vec<(OutPoint, Utxo)> {
        self.by_address
            .get(address)
            .map(|outpoints| {
                outpoints
                    .iter()
                    .filter_map(|outpoint| {
                        self.entries
                            .get(outpoint)
                            .filter(|utxo| !utxo.spent)
                            .map(|utxo| (*outpoint, utxo.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.by_address
            .get(address)
            .map(|outpoints| {
                outpoints
                    .iter()
                    .filter_map(|outpoint| self.entries.get(outpoint))
                    .filter(|utxo| !utxo.spent)
                    .map(|utxo| utxo.amount)
                    .fold(0u64, u64::saturating_add)
            })
            .unwrap_or(0)
    }

    /// Sums the value of `tx`'s inputs, checking each exists, is unspent and belongs to the sender.
    pub fn resolve_inputs(&self, tx: &Transaction) -> Result<u64, InputError> {
        let mut total = 0u64;
        for input in &tx.inputs {
            let utxo = self.entries.get(input).ok_or(InputError::Missing(*input))?;
            if utxo.spent {
                return Err(InputError::Spent(*input));
            }
            if utxo.address != tx.sender {
                return Err(InputError::NotOwned(*input));
            }
            total = total.checked_add(utxo.amount).ok_or(InputError::Overflow)?;
        }
        Ok(total)
    }

    /// Stable hash over every entry, spent ones included.
    pub fn digest(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update((self.entries.len() as u64).to_le_bytes());
        for (outpoint, utxo) in self.entries.iter() {
            hasher.update(outpoint.txid);
            hasher.update(outpoint.index.to_le_bytes());
            hasher.update(utxo.address);
            hasher.update(utxo.amount.to_le_bytes());
            hasher.update([utxo.spent as u8]);
            hasher.update((utxo.script.len() as u64).to_le_bytes());
            hasher.update(utxo.script.as_bytes());
        }
        hasher.finalize().into()
    }

    pub fn snapshot(&self) -> UtxoSnapshot {
        UtxoSnapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: UtxoSnapshot) {
        *self = snapshot.0;
    }

    pub fn clear(&mut self) {
        *self = UtxoState::default();
    }
}

/// Immutable point-in-time copy of a [`UtxoState`].
#[derive(Debug, Clone, Default)]
pub struct UtxoSnapshot(UtxoState);

impl UtxoSnapshot {
    pub fn digest(&self) -> Sha256Hash {
        self.0.digest()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct UtxoRecord {
    outpoint: OutPoint,
    utxo: Utxo,
}

impl Serialize for UtxoSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.entries.iter().map(|(outpoint, utxo)| UtxoRecord {
            outpoint: *outpoint,
            utxo: utxo.clone(),
        }))
    }
}

impl<'de> Deserialize<'de> for UtxoSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<UtxoRecord>::deserialize(deserializer)?;
        let mut state = UtxoState::new();
        for record in records {
            state
                .add_utxo(record.outpoint, record.utxo)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(UtxoSnapshot(state))
    }
}

/// Locked UTXO store. Reads share the lock; mutations, snapshots and restores are exclusive of writes.
#[derive(Debug, Default)]
pub struct UtxoSet {
    state: RwLock<UtxoState>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_utxo(&self, outpoint: OutPoint, address: Address, amount: u64) -> Result<(), ChainError> {
        self.state.write().add_utxo(outpoint, Utxo::new(address, amount))
    }

    /// The only transition from unspent to spent; exactly one caller wins per output.
    pub fn mark_utxo_spent(&self, outpoint: &OutPoint) -> bool {
        self.state.write().mark_spent(outpoint)
    }

    pub fn get_utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        self.state.read().get(outpoint).cloned()
    }

    pub fn get_utxos_for_address(&self, address: &Address) -> Vec<(OutPoint, Utxo)> {
        self.state.read().utxos_for_address(address)
    }

    pub fn get_balance(&self, address: &Address) -> u64 {
        self.state.read().balance(address)
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    pub fn snapshot(&self) -> UtxoSnapshot {
        self.state.read().snapshot()
    }

    pub fn restore(&self, snapshot: UtxoSnapshot) {
        self.state.write().restore(snapshot);
    }

    pub fn snapshot_digest(&self) -> Sha256Hash {
        self.state.read().digest()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, UtxoState> {
        self.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, UtxoState> {
        self.state.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_string;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn outpoint(tag: &str, index: u32) -> OutPoint {
        OutPoint::new(address_from_string(tag), index)
    }

    #[test]
    fn test_add_and_balance() {
        let set = UtxoSet::new();
        let alice = address_from_string("alice");
        set.add_utxo(outpoint("a", 0), alice, 40).unwrap();
        set.add_utxo(outpoint("a", 1), alice, 2).unwrap();
        assert_eq!(set.get_balance(&alice), 42);
        assert_eq!(set.get_utxos_for_address(&alice).len(), 2);
        assert_eq!(set.get_balance(&address_from_string("bob")), 0);
    }

    #[test]
    fn test_duplicate_outpoint_rejected() {
        let set = UtxoSet::new();
        let alice = address_from_string("alice");
        set.add_utxo(outpoint("a", 0), alice, 1).unwrap();
        assert!(matches!(
            set.add_utxo(outpoint("a", 0), alice, 99),
            Err(ChainError::Conflict(_))
        ));
        assert_eq!(set.get_balance(&alice), 1);
    }

    #[test]
    fn test_spent_entries_are_retained_and_not_respendable() {
        let set = UtxoSet::new();
        let alice = address_from_string("alice");
        let op = outpoint("a", 0);
        set.add_utxo(op, alice, 10).unwrap();

        assert!(set.mark_utxo_spent(&op));
        assert!(!set.mark_utxo_spent(&op));
        assert!(!set.mark_utxo_spent(&outpoint("missing", 0)));

        let retained = set.get_utxo(&op).unwrap();
        assert!(retained.spent);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get_balance(&alice), 0);
        assert!(set.get_utxos_for_address(&alice).is_empty());
    }

    #[test]
    fn test_concurrent_spend_has_one_winner() {
        let set = UtxoSet::new();
        let op = outpoint("contended", 0);
        set.add_utxo(op, address_from_string("alice"), 10).unwrap();
        let winners = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    if set.mark_utxo_spent(&op) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_restore_and_digest() {
        let set = UtxoSet::new();
        let alice = address_from_string("alice");
        set.add_utxo(outpoint("a", 0), alice, 10).unwrap();
        let before = set.snapshot_digest();
        let snapshot = set.snapshot();
        assert_eq!(snapshot.digest(), before);

        set.mark_utxo_spent(&outpoint("a", 0));
        set.add_utxo(outpoint("b", 0), alice, 5).unwrap();
        assert_ne!(set.snapshot_digest(), before);
        // The snapshot is unaffected by later writes.
        assert_eq!(snapshot.digest(), before);

        set.restore(snapshot);
        assert_eq!(set.snapshot_digest(), before);
        assert_eq!(set.get_balance(&alice), 10);
    }

    #[test]
    fn test_digest_is_order_independent() {
        let alice = address_from_string("alice");
        let first = UtxoSet::new();
        first.add_utxo(outpoint("a", 0), alice, 1).unwrap();
        first.add_utxo(outpoint("b", 0), alice, 2).unwrap();
        let second = UtxoSet::new();
        second.add_utxo(outpoint("b", 0), alice, 2).unwrap();
        second.add_utxo(outpoint("a", 0), alice, 1).unwrap();
        assert_eq!(first.snapshot_digest(), second.snapshot_digest());
    }

    #[test]
    fn test_resolve_inputs() {
        let mut state = UtxoState::new();
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");
        state.add_utxo(outpoint("a", 0), Utxo::new(alice, 30)).unwrap();
        state.add_utxo(outpoint("a", 1), Utxo::new(alice, 12)).unwrap();
        state.add_utxo(outpoint("b", 0), Utxo::new(bob, 7)).unwrap();

        let mut tx = Transaction::transfer(alice, bob, 10, 1, 1, 0, vec![outpoint("a", 0), outpoint("a", 1)]);
        assert_eq!(state.resolve_inputs(&tx), Ok(42));

        tx.inputs.push(outpoint("b", 0));
        assert_eq!(state.resolve_inputs(&tx), Err(InputError::NotOwned(outpoint("b", 0))));

        tx.inputs = vec![outpoint("zz", 0)];
        assert_eq!(state.resolve_inputs(&tx), Err(InputError::Missing(outpoint("zz", 0))));

        state.mark_spent(&outpoint("a", 0));
        tx.inputs = vec![outpoint("a", 0)];
        assert_eq!(state.resolve_inputs(&tx), Err(InputError::Spent(outpoint("a", 0))));
    }

    #[test]
    fn test_snapshot_serializes_through_json() {
        let mut state = UtxoState::new();
        let alice = address_from_string("alice");
        state.add_utxo(outpoint("a", 0), Utxo::new(alice, 30)).unwrap();
        state.mark_spent(&outpoint("a", 0));
        state.add_utxo(outpoint("a", 1), Utxo::new(alice, 3)).unwrap();

        let snapshot = state.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: UtxoSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.digest(), snapshot.digest());
    }
}
