//! Persistence hook for committed ledger state.
//!
//! After a commit releases the ledger's write locks, the ledger takes a fresh
//! `LedgerSnapshot` under read locks and hands it to its backend. Saves are
//! serialized and ordered by commit sequence, so a backend never sees an older
//! snapshot after a newer one. Storage formats belong to the backend.

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use crate::nonce::NonceSnapshot;
use crate::utxo::UtxoSnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of everything the ledger commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub blocks: Vec<Block>,
    pub difficulty: u32,
    pub issued_supply: u64,
    pub cumulative_work: u128,
    /// Count of commits (blocks applied and reorgs) behind this state.
    pub sequence: u64,
    pub utxos: UtxoSnapshot,
    pub nonces: NonceSnapshot,
}

impl LedgerSnapshot {
    pub fn height(&self) -> Option<u64> {
        self.blocks.last().map(Block::height)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Abstraction for persistence backends. Implementations must tolerate being
/// called from any thread and should not block for long.
pub trait Persistence: Send + Sync {
    fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()>;
    fn load_snapshot(&self) -> Result<Option<LedgerSnapshot>>;
}

/// Keeps the latest snapshot in memory. Useful for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    latest: Mutex<Option<LedgerSnapshot>>,
    saves: AtomicU64,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Persistence for InMemoryPersistence {
    fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        *self.latest.lock() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<LedgerSnapshot>> {
        Ok(self.latest.lock().clone())
    }
}

/// Backend that refuses every write; exercises the ledger's log-and-continue path.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingPersistence;

impl Persistence for FailingPersistence {
    fn save_snapshot(&self, _snapshot: &LedgerSnapshot) -> Result<()> {
        Err(ChainError::Persistence("storage unavailable".to_string()))
    }

    fn load_snapshot(&self) -> Result<Option<LedgerSnapshot>> {
        Ok(None)
    }
}
