//! Transaction mempool
//!
//! Admission runs in three phases: cheap duplicate/ban checks under the pool
//! lock, stateless validation with no lock held, then the stateful pipeline
//! under UTXO (read), nonce (write) and pool (write) locks taken in that order.

pub mod ban;
pub mod entry;
pub mod overview;
pub mod pool;

pub use entry::{OrphanTransaction, PendingTransaction};
pub use overview::{ExpiryReport, MempoolLimits, MempoolOverview, MempoolStats, PendingSummary};
pub use pool::{Admission, PoolState, RejectReason};

use crate::context::LedgerContext;
use crate::nonce::NonceTracker;
use crate::transaction::{validate_guarded, Transaction, TxId};
use crate::utxo::UtxoSet;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use tracing::debug;

/// Admission surface shared by the standalone mempool and the ledger that owns one.
pub trait MempoolAdmission {
    fn submit_transaction(&self, tx: Transaction) -> Result<Admission, RejectReason>;

    fn get_mempool_overview(&self, limit: usize) -> MempoolOverview;

    /// True when the transaction ended up resident in the main pool.
    fn add_transaction(&self, tx: Transaction) -> bool {
        matches!(self.submit_transaction(tx), Ok(admission) if admission.is_resident())
    }
}

pub struct Mempool {
    context: Arc<LedgerContext>,
    utxos: Arc<UtxoSet>,
    nonces: Arc<NonceTracker>,
    pool: RwLock<PoolState>,
}

impl Mempool {
    pub fn new(context: Arc<LedgerContext>, utxos: Arc<UtxoSet>, nonces: Arc<NonceTracker>) -> Self {
        let pool = PoolState::new(context.config.mempool.clone());
        Self {
            context,
            utxos,
            nonces,
            pool: RwLock::new(pool),
        }
    }

    fn now_millis(&self) -> u64 {
        self.context.clock.now_millis()
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Result<Admission, RejectReason> {
        let id = tx.id();
        self.pool.write().pre_check(&tx, &id, self.now_millis())?;

        if tx.is_coinbase() {
            self.pool.write().record_invalid(
                tx.sender,
                "coinbase transactions are not relayed".to_string(),
                self.now_millis(),
            );
            return Err(RejectReason::Invalid(
                "coinbase transactions are not relayed".to_string(),
            ));
        }

        if let Err(err) = validate_guarded(self.context.validator.as_ref(), &tx) {
            debug!(id = %hex::encode(id), error = %err, "transaction failed validation");
            return Err(self
                .pool
                .write()
                .record_invalid(tx.sender, err.to_string(), self.now_millis()));
        }

        let utxos = self.utxos.read();
        let mut nonces = self.nonces.write();
        let mut pool = self.pool.write();
        let admission = pool.admit_validated(tx, &utxos, &mut nonces, self.now_millis())?;
        debug!(id = %hex::encode(id), ?admission, "transaction admitted");
        Ok(admission)
    }

    pub fn add_transaction(&self, tx: Transaction) -> bool {
        MempoolAdmission::add_transaction(self, tx)
    }

    /// Drops a resident transaction and releases its nonce reservation. The
    /// sender's later-nonce entries go with it.
    pub fn remove_transaction(&self, id: &TxId) -> Option<PendingTransaction> {
        let mut nonces = self.nonces.write();
        self.pool.write().remove_with_descendants(id, &mut nonces).into_iter().next()
    }

    pub fn remove_expired(&self) -> ExpiryReport {
        let mut nonces = self.nonces.write();
        self.pool.write().remove_expired(self.now_millis(), &mut nonces)
    }

    /// Re-admits orphans whose inputs have since been created.
    pub fn promote_orphans(&self) -> Vec<TxId> {
        let utxos = self.utxos.read();
        let mut nonces = self.nonces.write();
        self.pool
            .write()
            .promote_orphans(&utxos, &mut nonces, self.now_millis())
    }

    pub fn select_for_block(&self, max: usize) -> Vec<Transaction> {
        let nonces = self.nonces.read();
        self.pool.read().select_for_block(max, &nonces)
    }

    pub fn get_mempool_overview(&self, limit: usize) -> MempoolOverview {
        self.pool.read().overview(limit, self.now_millis())
    }

    pub fn get_transaction(&self, id: &TxId) -> Option<Transaction> {
        self.pool.read().get(id).map(|entry| entry.tx.clone())
    }

    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.pool
            .read()
            .iter_by_priority()
            .map(|entry| entry.tx.clone())
            .collect()
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.pool.read().contains(id)
    }

    pub fn len(&self) -> usize {
        self.pool.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.read().is_empty()
    }

    pub fn orphan_count(&self) -> usize {
        self.pool.read().orphan_count()
    }

    pub fn stats(&self) -> MempoolStats {
        self.pool.read().stats().clone()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PoolState> {
        self.pool.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.pool.write()
    }
}

impl MempoolAdmission for Mempool {
    fn submit_transaction(&self, tx: Transaction) -> Result<Admission, RejectReason> {
        Mempool::submit_transaction(self, tx)
    }

    fn get_mempool_overview(&self, limit: usize) -> MempoolOverview {
        Mempool::get_mempool_overview(self, limit)
    }
}
