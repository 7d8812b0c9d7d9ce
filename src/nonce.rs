//! Per-sender replay protection.
//!
//! Each address has a confirmed nonce (last one committed by a block) and a set
//! of provisional reservations held by pending mempool transactions. The next
//! usable nonce is one past the highest of either.

use crate::blockchain::Sha256Hash;
use crate::crypto::Address;
use crate::error::ChainError;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct NonceState {
    confirmed: Arc<BTreeMap<Address, u64>>,
    reserved: Arc<BTreeMap<Address, BTreeSet<u64>>>,
}

impl NonceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last confirmed nonce; zero for an address that never sent.
    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.confirmed.get(address).copied().unwrap_or(0)
    }

    /// One past the confirmed nonce and the unbroken run of reservations above it.
    /// A reservation stranded behind a gap does not advance the result.
    pub fn get_next_nonce(&self, address: &Address) -> u64 {
        let mut next = self.get_nonce(address).saturating_add(1);
        if let Some(set) = self.reserved.get(address) {
            for reserved in set.range(next..) {
                if *reserved != next {
                    break;
                }
                next = next.saturating_add(1);
            }
        }
        next
    }

    pub fn validate_nonce(&self, address: &Address, proposed: u64) -> bool {
        proposed == self.get_next_nonce(address)
    }

    pub fn reserve_nonce(&mut self, address: Address, nonce: u64) -> Result<(), ChainError> {
        let confirmed = self.get_nonce(&address);
        if nonce <= confirmed {
            return Err(ChainError::Replay {
                address: hex::encode(address),
                expected: confirmed + 1,
                got: nonce,
            });
        }
        let inserted = Arc::make_mut(&mut self.reserved)
            .entry(address)
            .or_default()
            .insert(nonce);
        if !inserted {
            return Err(ChainError::Conflict(format!(
                "Nonce {} already reserved for {}",
                nonce,
                hex::encode(address)
            )));
        }
        Ok(())
    }

    pub fn release_nonce(&mut self, address: &Address, nonce: u64) -> bool {
        if !self
            .reserved
            .get(address)
            .is_some_and(|set| set.contains(&nonce))
        {
            return false;
        }
        let reserved = Arc::make_mut(&mut self.reserved);
        let mut removed = false;
        if let Some(set) = reserved.get_mut(address) {
            removed = set.remove(&nonce);
            if set.is_empty() {
                reserved.remove(address);
            }
        }
        removed
    }

    pub fn reservations(&self, address: &Address) -> Vec<u64> {
        self.reserved
            .get(address)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Commits `nonce` as confirmed and drops reservations it covers.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), ChainError> {
        let confirmed = self.get_nonce(&address);
        if nonce < confirmed {
            return Err(ChainError::Replay {
                address: hex::encode(address),
                expected: confirmed,
                got: nonce,
            });
        }
        Arc::make_mut(&mut self.confirmed).insert(address, nonce);

        if self
            .reserved
            .get(&address)
            .is_some_and(|set| set.iter().next().is_some_and(|lowest| *lowest <= nonce))
        {
            let reserved = Arc::make_mut(&mut self.reserved);
            if let Some(set) = reserved.get_mut(&address) {
                set.retain(|reserved| *reserved > nonce);
                if set.is_empty() {
                    reserved.remove(&address);
                }
            }
        }
        Ok(())
    }

    pub fn clear_reservations(&mut self) {
        self.reserved = Arc::default();
    }

    pub fn clear(&mut self) {
        *self = NonceState::default();
    }

    pub fn digest(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(b"confirmed");
        for (address, nonce) in self.confirmed.iter() {
            hasher.update(address);
            hasher.update(nonce.to_le_bytes());
        }
        hasher.update(b"reserved");
        for (address, nonces) in self.reserved.iter() {
            hasher.update(address);
            hasher.update((nonces.len() as u64).to_le_bytes());
            for nonce in nonces {
                hasher.update(nonce.to_le_bytes());
            }
        }
        hasher.finalize().into()
    }

    /// Digest over confirmed nonces alone, ignoring mempool reservations.
    pub fn confirmed_digest(&self) -> Sha256Hash {
        NonceState {
            confirmed: self.confirmed.clone(),
            reserved: Arc::default(),
        }
        .digest()
    }

    pub fn snapshot(&self) -> NonceSnapshot {
        NonceSnapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: NonceSnapshot) {
        *self = snapshot.0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct NonceSnapshot(NonceState);

impl NonceSnapshot {
    pub fn digest(&self) -> Sha256Hash {
        self.0.digest()
    }

    pub fn confirmed_digest(&self) -> Sha256Hash {
        self.0.confirmed_digest()
    }

    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.0.get_nonce(address)
    }
}

#[derive(Serialize, Deserialize)]
struct NonceRecord {
    address: Address,
    confirmed: u64,
    reserved: Vec<u64>,
}

impl Serialize for NonceSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = &self.0;
        let addresses: BTreeSet<&Address> =
            state.confirmed.keys().chain(state.reserved.keys()).collect();
        serializer.collect_seq(addresses.into_iter().map(|address| NonceRecord {
            address: *address,
            confirmed: state.get_nonce(address),
            reserved: state.reservations(address),
        }))
    }
}

impl<'de> Deserialize<'de> for NonceSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<NonceRecord>::deserialize(deserializer)?;
        let mut state = NonceState::new();
        for record in records {
            if record.confirmed > 0 {
                state
                    .set_nonce(record.address, record.confirmed)
                    .map_err(serde::de::Error::custom)?;
            }
            for nonce in record.reserved {
                state
                    .reserve_nonce(record.address, nonce)
                    .map_err(serde::de::Error::custom)?;
            }
        }
        Ok(NonceSnapshot(state))
    }
}

/// Locked nonce registry.
#[derive(Debug, Default)]
pub struct NonceTracker {
    state: RwLock<NonceState>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.state.read().get_nonce(address)
    }

    pub fn get_next_nonce(&self, address: &Address) -> u64 {
        self.state.read().get_next_nonce(address)
    }

    pub fn reserve_nonce(&self, address: Address, nonce: u64) -> Result<(), ChainError> {
        self.state.write().reserve_nonce(address, nonce)
    }

    pub fn release_nonce(&self, address: &Address, nonce: u64) -> bool {
        self.state.write().release_nonce(address, nonce)
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) -> Result<(), ChainError> {
        self.state.write().set_nonce(address, nonce)
    }

    /// Only the exact next nonce is acceptable; gaps and reuse both fail.
    pub fn validate_nonce(&self, address: &Address, proposed: u64) -> bool {
        self.state.read().validate_nonce(address, proposed)
    }

    pub fn snapshot(&self) -> NonceSnapshot {
        self.state.read().snapshot()
    }

    pub fn restore(&self, snapshot: NonceSnapshot) {
        self.state.write().restore(snapshot);
    }

    pub fn snapshot_digest(&self) -> Sha256Hash {
        self.state.read().digest()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, NonceState> {
        self.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, NonceState> {
        self.state.write()
    }
}
