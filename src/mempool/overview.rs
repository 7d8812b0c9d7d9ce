//! Read-only views of the pool for API and monitoring consumers.

use serde::Serialize;

/// Monotonic counters of admission outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MempoolStats {
    pub accepted_total: u64,
    pub duplicate_total: u64,
    pub invalid_total: u64,
    pub banned_total: u64,
    pub bans_issued_total: u64,
    pub low_fee_total: u64,
    pub sender_cap_total: u64,
    pub nonce_rejected_total: u64,
    pub input_rejected_total: u64,
    pub evicted_low_fee_total: u64,
    pub evicted_descendants_total: u64,
    pub rbf_replaced_total: u64,
    pub rbf_rejected_total: u64,
    pub orphaned_total: u64,
    pub orphans_promoted_total: u64,
    pub orphans_evicted_total: u64,
    pub expired_total: u64,
    pub confirmed_total: u64,
    pub revalidation_evicted_total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MempoolLimits {
    pub max_size: usize,
    pub max_per_sender: usize,
    pub max_orphans: usize,
    pub tx_ttl_secs: u64,
    pub orphan_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub nonce: u64,
    pub amount: u64,
    pub fee: u64,
    pub fee_rate: f64,
    pub size: usize,
    pub age_secs: u64,
    pub replaces: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MempoolOverview {
    pub pending_count: usize,
    pub orphan_count: usize,
    pub sender_count: usize,
    pub banned_senders: usize,
    pub limits: MempoolLimits,
    pub stats: MempoolStats,
    /// Highest fee-rate first, at most the requested number.
    pub entries: Vec<PendingSummary>,
}

/// Result of a TTL sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    pub expired: usize,
    pub orphans_expired: usize,
}
