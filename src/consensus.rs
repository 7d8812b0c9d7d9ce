//! Consensus rules: proof-of-work target, difficulty retargeting, block reward
//! schedule and the fork-choice comparison.

use crate::blockchain::{Block, Sha256Hash};
use crate::config::ConsensusConfig;

/// Target a block hash must not exceed for `difficulty` leading zero bits.
pub fn hash_to_target(difficulty: u32) -> [u8; 32] {
    let mut target = [0xFF; 32];
    let leading_zeros = (difficulty / 8).min(32) as usize;
    let partial_bits = difficulty % 8;

    for item in target.iter_mut().take(leading_zeros) {
        *item = 0;
    }
    if leading_zeros < 32 && partial_bits > 0 {
        target[leading_zeros] = 0xFF >> partial_bits;
    }
    target
}

pub fn meets_target(hash: &Sha256Hash, difficulty: u32) -> bool {
    *hash <= hash_to_target(difficulty)
}

/// Expected number of hashes to find a block at `difficulty`.
pub fn block_work(difficulty: u32) -> u128 {
    1u128 << difficulty.min(127)
}

pub fn chain_work(blocks: &[Block]) -> u128 {
    blocks
        .iter()
        .map(|block| block_work(block.header.difficulty))
        .fold(0u128, u128::saturating_add)
}

/// Fork choice: a candidate wins only with strictly more cumulative work.
/// Equal work keeps the current chain.
pub fn is_better_chain(candidate_work: u128, current_work: u128) -> bool {
    candidate_work > current_work
}

/// Subsidy for a block at `height`, halving every `halving_interval` blocks and
/// never pushing issuance past `max_supply`.
pub fn block_reward(height: u64, issued: u64, params: &ConsensusConfig) -> u64 {
    let halvings = height / params.halving_interval;
    let scheduled = if halvings >= 64 {
        0
    } else {
        params.initial_reward >> halvings
    };
    scheduled.min(params.max_supply.saturating_sub(issued))
}

/// Difficulty required for the block that would extend `chain`.
///
/// Every `retarget_interval` blocks the difficulty moves by the log2 of
/// expected/observed time over the last window, bounded by
/// `max_retarget_factor` in either direction.
pub fn next_difficulty(chain: &[Block], params: &ConsensusConfig) -> u32 {
    let Some(tip) = chain.last() else {
        return params.initial_difficulty;
    };
    let next_height = tip.header.height.saturating_add(1);
    let interval = params.retarget_interval.max(1);
    if next_height % interval != 0 || next_height < interval {
        return tip.header.difficulty;
    }

    // Heights are only trusted once linkage is checked; index by position.
    let Some(window_start) = chain
        .len()
        .checked_sub(interval as usize)
        .and_then(|start| chain.get(start))
    else {
        return tip.header.difficulty;
    };
    let gaps = (interval - 1).max(1);
    let expected_ms = gaps
        .saturating_mul(params.target_block_time_secs)
        .saturating_mul(1000)
        .max(1) as f64;
    let actual_ms = tip
        .header
        .timestamp
        .saturating_sub(window_start.header.timestamp)
        .max(1) as f64;

    let factor = params.max_retarget_factor;
    let ratio = (expected_ms / actual_ms).clamp(1.0 / factor, factor);
    let delta = ratio.log2().round() as i64;
    let adjusted = (tip.header.difficulty as i64 + delta)
        .clamp(params.min_difficulty as i64, params.max_difficulty as i64);
    adjusted as u32
}
