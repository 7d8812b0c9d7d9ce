//! Admission-controlled transaction pool.
//!
//! `PoolState` holds no locks of its own. Callers pass in the UTXO and nonce
//! state they already hold so that admission, block application and reorg
//! revalidation all observe one consistent view.

use super::ban::BanList;
use super::entry::{FeeKey, OrphanTransaction, PendingTransaction};
use super::overview::{ExpiryReport, MempoolLimits, MempoolOverview, MempoolStats, PendingSummary};
use crate::config::MempoolConfig;
use crate::crypto::Address;
use crate::error::{ChainError, ErrorKind};
use crate::nonce::NonceState;
use crate::transaction::{validate_guarded, OutPoint, Transaction, TransactionValidator, TxId, COINBASE_SENDER};
use crate::utxo::{InputError, UtxoState};
use lru::LruCache;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};
use std::num::NonZeroUsize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Successful admission outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Resident in the main pool; `evicted` names the low fee-rate entry it displaced.
    Accepted { id: TxId, evicted: Option<TxId> },
    /// Resident in the main pool after superseding conflicting entries.
    Replaced { id: TxId, replaced: Vec<TxId> },
    /// Parked until its inputs appear in the UTXO set.
    Orphaned { id: TxId },
}

impl Admission {
    pub fn id(&self) -> TxId {
        match self {
            Admission::Accepted { id, .. }
            | Admission::Replaced { id, .. }
            | Admission::Orphaned { id } => *id,
        }
    }

    pub fn is_resident(&self) -> bool {
        !matches!(self, Admission::Orphaned { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("transaction already known")]
    Duplicate,
    #[error("sender banned until {until}")]
    SenderBanned { until: u64 },
    #[error("invalid transaction: {0}")]
    Invalid(String),
    #[error("replacement fee-rate {offered:.4} does not exceed {required:.4}")]
    RbfFeeTooLow { offered: f64, required: f64 },
    #[error("sender already has {limit} pending transactions")]
    SenderCapReached { limit: usize },
    #[error("nonce mismatch for {}: expected {expected}, got {got}", hex::encode(.sender))]
    NonceMismatch { sender: Address, expected: u64, got: u64 },
    #[error("inputs unavailable: {0}")]
    InputsUnavailable(String),
    #[error("pool full: fee-rate {offered:.4} does not exceed floor {floor:.4}")]
    PoolFullLowFee { offered: f64, floor: f64 },
}

impl RejectReason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RejectReason::Duplicate | RejectReason::RbfFeeTooLow { .. } => ErrorKind::Conflict,
            RejectReason::SenderCapReached { .. } | RejectReason::PoolFullLowFee { .. } => {
                ErrorKind::Capacity
            }
            RejectReason::NonceMismatch { .. } => ErrorKind::Replay,
            RejectReason::SenderBanned { .. }
            | RejectReason::Invalid(_)
            | RejectReason::InputsUnavailable(_) => ErrorKind::Validation,
        }
    }
}

impl From<RejectReason> for ChainError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::NonceMismatch { sender, expected, got } => ChainError::Replay {
                address: hex::encode(sender),
                expected,
                got,
            },
            other => match other.kind() {
                ErrorKind::Conflict => ChainError::Conflict(other.to_string()),
                ErrorKind::Capacity => ChainError::Capacity(other.to_string()),
                _ => ChainError::InvalidTransaction(other.to_string()),
            },
        }
    }
}

enum InputCheck {
    Ready,
    Missing,
    Unusable(String),
}

fn check_inputs(utxos: &UtxoState, tx: &Transaction) -> InputCheck {
    match utxos.resolve_inputs(tx) {
        Ok(total) => match tx.outputs(total) {
            Ok(_) => InputCheck::Ready,
            Err(e) => InputCheck::Unusable(e.to_string()),
        },
        Err(InputError::Missing(_)) => InputCheck::Missing,
        Err(e) => InputCheck::Unusable(ChainError::from(e).to_string()),
    }
}

pub struct PoolState {
    config: MempoolConfig,
    entries: HashMap<TxId, PendingTransaction>,
    by_priority: BTreeSet<FeeKey>,
    by_input: HashMap<OutPoint, TxId>,
    by_slot: HashMap<(Address, u64), TxId>,
    sender_counts: HashMap<Address, usize>,
    orphans: HashMap<TxId, OrphanTransaction>,
    seen: LruCache<TxId, ()>,
    bans: BanList,
    stats: MempoolStats,
    next_sequence: u64,
}

impl PoolState {
    pub fn new(config: MempoolConfig) -> Self {
        let seen_capacity = NonZeroUsize::new(config.seen_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            bans: BanList::new(
                config.ban_threshold,
                config.ban_window_secs,
                config.ban_duration_secs,
            ),
            config,
            entries: HashMap::new(),
            by_priority: BTreeSet::new(),
            by_input: HashMap::new(),
            by_slot: HashMap::new(),
            sender_counts: HashMap::new(),
            orphans: HashMap::new(),
            seen: LruCache::new(seen_capacity),
            stats: MempoolStats::default(),
            next_sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn contains_orphan(&self, id: &TxId) -> bool {
        self.orphans.contains_key(id)
    }

    pub fn get(&self, id: &TxId) -> Option<&PendingTransaction> {
        self.entries.get(id)
    }

    pub fn sender_count(&self, sender: &Address) -> usize {
        self.sender_counts.get(sender).copied().unwrap_or(0)
    }

    /// Senders the ban list still holds strikes or a ban entry for.
    pub fn tracked_ban_senders(&self) -> usize {
        self.bans.tracked_senders()
    }

    pub fn stats(&self) -> &MempoolStats {
        &self.stats
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// Entries from highest to lowest fee-rate.
    pub fn iter_by_priority(&self) -> impl Iterator<Item = &PendingTransaction> + '_ {
        self.by_priority
            .iter()
            .filter_map(|key| self.entries.get(&key.id))
    }

    /// Lowest fee-rate currently resident.
    pub fn min_fee_rate(&self) -> Option<f64> {
        self.by_priority.iter().next_back().map(|key| key.fee_rate)
    }

    fn is_known(&self, id: &TxId) -> bool {
        self.entries.contains_key(id) || self.orphans.contains_key(id) || self.seen.contains(id)
    }

    /// Duplicate and ban checks, run before the transaction is validated.
    pub fn pre_check(&mut self, tx: &Transaction, id: &TxId, now_millis: u64) -> Result<(), RejectReason> {
        if self.is_known(id) {
            self.stats.duplicate_total += 1;
            return Err(RejectReason::Duplicate);
        }
        if let Some(until) = self.bans.banned_until(&tx.sender, now_millis / 1000) {
            self.stats.banned_total += 1;
            return Err(RejectReason::SenderBanned { until });
        }
        Ok(())
    }

    /// Counts a failed validation against the sender and bans on threshold.
    pub fn record_invalid(&mut self, sender: Address, reason: String, now_millis: u64) -> RejectReason {
        self.stats.invalid_total += 1;
        if sender != COINBASE_SENDER && self.bans.record_invalid(sender, now_millis / 1000) {
            self.stats.bans_issued_total += 1;
            warn!(
                sender = %hex::encode(sender),
                duration_secs = self.config.ban_duration_secs,
                "sender banned after repeated invalid submissions"
            );
        }
        RejectReason::Invalid(reason)
    }

    /// Runs the stateful admission pipeline for an already validated transaction.
    pub fn admit_validated(
        &mut self,
        tx: Transaction,
        utxos: &UtxoState,
        nonces: &mut NonceState,
        now_millis: u64,
    ) -> Result<Admission, RejectReason> {
        let id = tx.id();
        // Another submitter may have raced us between the pre-check and here.
        self.pre_check(&tx, &id, now_millis)?;

        let conflicts = self.conflicts_of(&tx);
        if !conflicts.is_empty() {
            return self.replace_by_fee(tx, id, conflicts, utxos, nonces, now_millis);
        }

        let sender = tx.sender;
        if self.sender_count(&sender) >= self.config.max_per_sender {
            self.stats.sender_cap_total += 1;
            return Err(RejectReason::SenderCapReached {
                limit: self.config.max_per_sender,
            });
        }

        let expected = nonces.get_next_nonce(&sender);
        if tx.nonce != expected {
            self.stats.nonce_rejected_total += 1;
            return Err(RejectReason::NonceMismatch {
                sender,
                expected,
                got: tx.nonce,
            });
        }

        match check_inputs(utxos, &tx) {
            InputCheck::Ready => {}
            InputCheck::Missing => {
                self.insert_orphan(tx, id, now_millis);
                return Ok(Admission::Orphaned { id });
            }
            InputCheck::Unusable(reason) => {
                self.stats.input_rejected_total += 1;
                return Err(RejectReason::InputsUnavailable(reason));
            }
        }

        let fee_rate = tx.fee_rate();
        let mut evicted = None;
        if self.entries.len() >= self.config.max_size {
            // The sender's own entries are ancestors of `tx` and cannot make room for it.
            let lowest = self
                .by_priority
                .iter()
                .rev()
                .find(|key| self.entries.get(&key.id).is_some_and(|entry| entry.sender() != sender))
                .copied();
            let victim = match lowest {
                Some(key) if fee_rate > key.fee_rate => key,
                other => {
                    self.stats.low_fee_total += 1;
                    return Err(RejectReason::PoolFullLowFee {
                        offered: fee_rate,
                        floor: other.map_or(f64::INFINITY, |key| key.fee_rate),
                    });
                }
            };
            let descendants = self.remove_with_descendants(&victim.id, nonces).len().saturating_sub(1);
            self.stats.evicted_low_fee_total += 1;
            self.stats.evicted_descendants_total += descendants as u64;
            debug!(
                evicted = %hex::encode(victim.id),
                fee_rate = victim.fee_rate,
                descendants,
                "evicted lowest fee-rate transaction"
            );
            evicted = Some(victim.id);
        }

        let entry = PendingTransaction::new(tx, now_millis, self.bump_sequence());
        self.insert_entry(entry, nonces)?;
        Ok(Admission::Accepted { id, evicted })
    }

    fn bump_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Resident transactions sharing an input or the (sender, nonce) slot with `tx`.
    fn conflicts_of(&self, tx: &Transaction) -> Vec<TxId> {
        let mut conflicts: BTreeSet<TxId> = tx
            .inputs
            .iter()
            .filter_map(|input| self.by_input.get(input).copied())
            .collect();
        if let Some(id) = self.by_slot.get(&(tx.sender, tx.nonce)) {
            conflicts.insert(*id);
        }
        conflicts.into_iter().collect()
    }

    fn replace_by_fee(
        &mut self,
        tx: Transaction,
        id: TxId,
        conflicts: Vec<TxId>,
        utxos: &UtxoState,
        nonces: &mut NonceState,
        now_millis: u64,
    ) -> Result<Admission, RejectReason> {
        let offered = tx.fee_rate();
        let originals: Vec<&PendingTransaction> =
            conflicts.iter().filter_map(|c| self.entries.get(c)).collect();
        let required = originals
            .iter()
            .map(|entry| entry.fee_rate)
            .fold(f64::MIN, f64::max);
        if offered <= required {
            self.stats.rbf_rejected_total += 1;
            return Err(RejectReason::RbfFeeTooLow { offered, required });
        }

        let own_nonces: Vec<u64> = originals
            .iter()
            .filter(|entry| entry.sender() == tx.sender)
            .map(|entry| entry.nonce())
            .collect();
        let nonce_ok = if own_nonces.is_empty() {
            nonces.validate_nonce(&tx.sender, tx.nonce)
        } else {
            own_nonces.contains(&tx.nonce)
        };
        if !nonce_ok {
            self.stats.nonce_rejected_total += 1;
            let expected = own_nonces
                .iter()
                .min()
                .copied()
                .unwrap_or_else(|| nonces.get_next_nonce(&tx.sender));
            return Err(RejectReason::NonceMismatch {
                sender: tx.sender,
                expected,
                got: tx.nonce,
            });
        }

        let unusable = match check_inputs(utxos, &tx) {
            InputCheck::Ready => None,
            InputCheck::Missing => Some("replacement spends unknown inputs".to_string()),
            InputCheck::Unusable(reason) => Some(reason),
        };
        if let Some(reason) = unusable {
            self.stats.input_rejected_total += 1;
            return Err(RejectReason::InputsUnavailable(reason));
        }

        let remaining = self.sender_count(&tx.sender) - own_nonces.len();
        if remaining >= self.config.max_per_sender {
            self.stats.sender_cap_total += 1;
            return Err(RejectReason::SenderCapReached {
                limit: self.config.max_per_sender,
            });
        }

        let mut lineage = Vec::new();
        for conflict in &conflicts {
            let Some(original) = self.remove_entry(conflict, nonces) else {
                continue;
            };
            // Later nonces stay mineable only behind the slot `tx` takes over.
            if original.nonce() != tx.nonce {
                let dropped = self.remove_descendants(original.sender(), original.nonce(), nonces);
                self.stats.evicted_descendants_total += dropped as u64;
            }
            lineage.extend(original.replaces);
            lineage.push(original.id);
        }
        self.stats.rbf_replaced_total += conflicts.len() as u64;

        let mut entry = PendingTransaction::new(tx, now_millis, self.bump_sequence());
        entry.replaces = lineage;
        self.insert_entry(entry, nonces)?;
        info!(
            id = %hex::encode(id),
            replaced = conflicts.len(),
            fee_rate = offered,
            "replace-by-fee accepted"
        );
        Ok(Admission::Replaced { id, replaced: conflicts })
    }

    fn insert_entry(&mut self, entry: PendingTransaction, nonces: &mut NonceState) -> Result<(), RejectReason> {
        let sender = entry.sender();
        let nonce = entry.nonce();
        if nonces.reserve_nonce(sender, nonce).is_err() {
            self.stats.nonce_rejected_total += 1;
            return Err(RejectReason::NonceMismatch {
                sender,
                expected: nonces.get_next_nonce(&sender),
                got: nonce,
            });
        }

        let id = entry.id;
        for input in &entry.tx.inputs {
            self.by_input.insert(*input, id);
        }
        self.by_slot.insert((sender, nonce), id);
        self.by_priority.insert(entry.priority_key());
        *self.sender_counts.entry(sender).or_insert(0) += 1;
        self.entries.insert(id, entry);
        self.seen.put(id, ());
        self.stats.accepted_total += 1;
        Ok(())
    }

    /// Removes a resident transaction along with its indexes, counter and nonce reservation.
    pub fn remove_entry(&mut self, id: &TxId, nonces: &mut NonceState) -> Option<PendingTransaction> {
        let entry = self.entries.remove(id)?;
        let sender = entry.sender();
        let nonce = entry.nonce();

        self.by_priority.remove(&entry.priority_key());
        for input in &entry.tx.inputs {
            if self.by_input.get(input) == Some(id) {
                self.by_input.remove(input);
            }
        }
        if self.by_slot.get(&(sender, nonce)) == Some(id) {
            self.by_slot.remove(&(sender, nonce));
        }
        if let Some(count) = self.sender_counts.get_mut(&sender) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.sender_counts.remove(&sender);
            }
        }
        nonces.release_nonce(&sender, nonce);
        Some(entry)
    }

    /// Removes `id` and every later-nonce entry of the same sender, which
    /// could never be mined without it. The first element is `id`'s entry.
    pub fn remove_with_descendants(&mut self, id: &TxId, nonces: &mut NonceState) -> Vec<PendingTransaction> {
        let Some(entry) = self.remove_entry(id, nonces) else {
            return Vec::new();
        };
        let (sender, nonce) = (entry.sender(), entry.nonce());
        let mut removed = vec![entry];
        for (_, child) in self.descendants_of(sender, nonce) {
            removed.extend(self.remove_entry(&child, nonces));
        }
        removed
    }

    fn remove_descendants(&mut self, sender: Address, nonce: u64, nonces: &mut NonceState) -> usize {
        let mut removed = 0;
        for (_, child) in self.descendants_of(sender, nonce) {
            if self.remove_entry(&child, nonces).is_some() {
                removed += 1;
            }
        }
        removed
    }

    fn descendants_of(&self, sender: Address, nonce: u64) -> Vec<(u64, TxId)> {
        let mut descendants: Vec<(u64, TxId)> = self
            .entries
            .values()
            .filter(|entry| entry.sender() == sender && entry.nonce() > nonce)
            .map(|entry| (entry.nonce(), entry.id))
            .collect();
        descendants.sort();
        descendants
    }

    fn insert_orphan(&mut self, tx: Transaction, id: TxId, now_millis: u64) {
        if self.orphans.len() >= self.config.max_orphans {
            let oldest = self
                .orphans
                .values()
                .min_by_key(|orphan| (orphan.added_at, orphan.id))
                .map(|orphan| orphan.id);
            if let Some(oldest) = oldest {
                self.orphans.remove(&oldest);
                self.stats.orphans_evicted_total += 1;
            }
        }
        if self.config.max_orphans == 0 {
            return;
        }
        self.orphans.insert(id, OrphanTransaction { tx, id, added_at: now_millis });
        self.stats.orphaned_total += 1;
        debug!(id = %hex::encode(id), "transaction parked as orphan");
    }

    /// Drops entries older than their TTL from both pools and recounts senders from the survivors.
    pub fn remove_expired(&mut self, now_millis: u64, nonces: &mut NonceState) -> ExpiryReport {
        let ttl_ms = self.config.tx_ttl_secs.saturating_mul(1000);
        let expired: Vec<TxId> = self
            .entries
            .values()
            .filter(|entry| now_millis.saturating_sub(entry.added_at) > ttl_ms)
            .map(|entry| entry.id)
            .collect();
        let expired: usize = expired
            .iter()
            .map(|id| self.remove_with_descendants(id, nonces).len())
            .sum();

        let orphan_ttl_ms = self.config.orphan_ttl_secs.saturating_mul(1000);
        let orphans_before = self.orphans.len();
        self.orphans
            .retain(|_, orphan| now_millis.saturating_sub(orphan.added_at) <= orphan_ttl_ms);
        let orphans_expired = orphans_before - self.orphans.len();

        self.rebuild_sender_counts();
        self.bans.prune(now_millis / 1000);
        let report = ExpiryReport {
            expired,
            orphans_expired,
        };
        self.stats.expired_total += (report.expired + report.orphans_expired) as u64;
        if report.expired + report.orphans_expired > 0 {
            info!(
                expired = report.expired,
                orphans_expired = report.orphans_expired,
                "mempool expiry sweep"
            );
        }
        report
    }

    fn rebuild_sender_counts(&mut self) {
        let mut counts: HashMap<Address, usize> = HashMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.sender()).or_insert(0) += 1;
        }
        self.sender_counts = counts;
    }

    /// Reconciles the pool with a freshly committed block.
    pub fn on_block_applied(
        &mut self,
        transactions: &[Transaction],
        utxos: &UtxoState,
        nonces: &mut NonceState,
        now_millis: u64,
    ) {
        for tx in transactions {
            let id = tx.id();
            if self.remove_entry(&id, nonces).is_some() {
                self.stats.confirmed_total += 1;
            }
            self.orphans.remove(&id);
            self.seen.put(id, ());
        }

        let stale: Vec<TxId> = self
            .entries
            .values()
            .filter(|entry| {
                entry.nonce() <= nonces.get_nonce(&entry.sender())
                    || !matches!(check_inputs(utxos, &entry.tx), InputCheck::Ready)
            })
            .map(|entry| entry.id)
            .collect();
        let mut evicted = 0;
        for id in &stale {
            let confirmed = self
                .entries
                .get(id)
                .is_some_and(|entry| entry.nonce() <= nonces.get_nonce(&entry.sender()));
            evicted += if confirmed {
                usize::from(self.remove_entry(id, nonces).is_some())
            } else {
                self.remove_with_descendants(id, nonces).len()
            };
        }
        self.stats.revalidation_evicted_total += evicted as u64;

        self.promote_orphans(utxos, nonces, now_millis);
    }

    /// Re-admits orphans whose inputs now exist. Returns the ids that became resident.
    pub fn promote_orphans(&mut self, utxos: &UtxoState, nonces: &mut NonceState, now_millis: u64) -> Vec<TxId> {
        let mut ready: Vec<(Address, u64, TxId)> = self
            .orphans
            .values()
            .filter(|orphan| !matches!(check_inputs(utxos, &orphan.tx), InputCheck::Missing))
            .map(|orphan| (orphan.tx.sender, orphan.tx.nonce, orphan.id))
            .collect();
        ready.sort();

        let mut promoted = Vec::new();
        for (_, _, id) in ready {
            let Some(orphan) = self.orphans.remove(&id) else {
                continue;
            };
            match self.admit_validated(orphan.tx, utxos, nonces, now_millis) {
                Ok(admission) if admission.is_resident() => {
                    self.stats.orphans_promoted_total += 1;
                    promoted.push(id);
                }
                Ok(_) => {}
                Err(reason) => debug!(id = %hex::encode(id), %reason, "orphan dropped on promotion"),
            }
        }
        promoted
    }

    /// Re-checks every resident transaction against new chain state and
    /// rebuilds nonce reservations from the survivors. A validator error or
    /// panic counts as failure. Returns the number evicted.
    pub fn revalidate(
        &mut self,
        validator: &dyn TransactionValidator,
        utxos: &UtxoState,
        nonces: &mut NonceState,
    ) -> usize {
        nonces.clear_reservations();

        let mut ordered: Vec<(Address, u64, TxId)> = self
            .entries
            .values()
            .map(|entry| (entry.sender(), entry.nonce(), entry.id))
            .collect();
        ordered.sort();

        let mut failed = Vec::new();
        for (sender, nonce, id) in ordered {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let valid = validate_guarded(validator, &entry.tx).is_ok()
                && nonces.validate_nonce(&sender, nonce)
                && matches!(check_inputs(utxos, &entry.tx), InputCheck::Ready);
            if !valid || nonces.reserve_nonce(sender, nonce).is_err() {
                failed.push(id);
            }
        }

        for id in &failed {
            self.remove_entry(id, nonces);
        }
        self.rebuild_sender_counts();
        self.stats.revalidation_evicted_total += failed.len() as u64;
        failed.len()
    }

    /// Picks up to `max` transactions by fee-rate while keeping each sender's
    /// nonces contiguous from its confirmed nonce.
    pub fn select_for_block(&self, max: usize, nonces: &NonceState) -> Vec<Transaction> {
        let mut queues: HashMap<Address, VecDeque<&PendingTransaction>> = HashMap::new();
        for entry in self.entries.values() {
            queues.entry(entry.sender()).or_default().push_back(entry);
        }

        let mut heads = BinaryHeap::new();
        for (sender, queue) in queues.iter_mut() {
            queue.make_contiguous().sort_by_key(|entry| entry.nonce());
            if let Some(front) = queue.front() {
                if front.nonce() == nonces.get_nonce(sender) + 1 {
                    heads.push((Reverse(front.priority_key()), *sender));
                }
            }
        }

        let mut selected = Vec::new();
        while selected.len() < max {
            let Some((_, sender)) = heads.pop() else {
                break;
            };
            let Some(queue) = queues.get_mut(&sender) else {
                continue;
            };
            let Some(taken) = queue.pop_front() else {
                continue;
            };
            selected.push(taken.tx.clone());
            if let Some(next) = queue.front() {
                if next.nonce() == taken.nonce() + 1 {
                    heads.push((Reverse(next.priority_key()), sender));
                }
            }
        }
        selected
    }

    pub fn overview(&self, limit: usize, now_millis: u64) -> MempoolOverview {
        let entries = self
            .iter_by_priority()
            .take(limit)
            .map(|entry| PendingSummary {
                id: hex::encode(entry.id),
                sender: hex::encode(entry.tx.sender),
                recipient: hex::encode(entry.tx.recipient),
                nonce: entry.tx.nonce,
                amount: entry.tx.amount,
                fee: entry.tx.fee,
                fee_rate: entry.fee_rate,
                size: entry.size,
                age_secs: entry.age_secs(now_millis),
                replaces: entry.replaces.iter().map(hex::encode).collect(),
            })
            .collect();

        MempoolOverview {
            pending_count: self.entries.len(),
            orphan_count: self.orphans.len(),
            sender_count: self.sender_counts.len(),
            banned_senders: self.bans.active_bans(now_millis / 1000),
            limits: MempoolLimits {
                max_size: self.config.max_size,
                max_per_sender: self.config.max_per_sender,
                max_orphans: self.config.max_orphans,
                tx_ttl_secs: self.config.tx_ttl_secs,
                orphan_ttl_secs: self.config.orphan_ttl_secs,
            },
            stats: self.stats.clone(),
            entries,
        }
    }
}
