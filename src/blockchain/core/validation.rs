use crate::config::ConsensusConfig;
use crate::error::{ChainError, Result};
use crate::transaction::{validate_guarded, TransactionValidator};
use std::collections::{HashMap, HashSet};

use super::chain::Block;

pub fn validate_no_double_spend(block: &Block) -> Result<()> {
    let mut seen_inputs = HashMap::new();
    for tx in &block.transactions {
        let tx_hash = tx.id();
        for input in &tx.inputs {
            if let Some(conflicting_tx_hash) = seen_inputs.insert(*input, tx_hash) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "Double spend detected in block. UTXO {} is spent by both {} and {}",
                    input,
                    hex::encode(conflicting_tx_hash),
                    hex::encode(tx_hash)
                )));
            }
        }
    }
    Ok(())
}

/// Checks that need nothing but the block itself: shape, coinbase placement,
/// Merkle root, intra-block double spends and per-transaction validation.
pub fn validate_block_body(
    block: &Block,
    validator: &dyn TransactionValidator,
    params: &ConsensusConfig,
) -> Result<()> {
    let height = block.header.height;
    if block.transactions.is_empty() {
        return Err(ChainError::InvalidBlock(format!("Block {} has no transactions", height)));
    }
    if block.transactions.len() > params.max_block_transactions {
        return Err(ChainError::InvalidBlock(format!(
            "Block {} carries {} transactions (max: {})",
            height,
            block.transactions.len(),
            params.max_block_transactions
        )));
    }

    let coinbase = block.coinbase().ok_or_else(|| {
        ChainError::InvalidBlock("First transaction in a block must be a Coinbase transaction.".to_string())
    })?;
    if coinbase.nonce != height {
        return Err(ChainError::InvalidBlock(format!(
            "Coinbase nonce {} does not match block height {}",
            coinbase.nonce, height
        )));
    }
    if block.transactions.iter().skip(1).any(|tx| tx.is_coinbase()) {
        return Err(ChainError::InvalidBlock(format!(
            "Block {} contains more than one coinbase",
            height
        )));
    }

    let expected_merkle_root = Block::calculate_merkle_root(&block.transactions);
    if expected_merkle_root != block.header.merkle_root {
        return Err(ChainError::InvalidBlock(format!(
            "Merkle root mismatch. Expected {}, but got {}.",
            hex::encode(expected_merkle_root),
            hex::encode(block.header.merkle_root)
        )));
    }

    let mut ids = HashSet::new();
    for tx in &block.transactions {
        if !ids.insert(tx.id()) {
            return Err(ChainError::InvalidBlock(format!(
                "Transaction {} appears twice in block {}",
                tx.hash_str(),
                height
            )));
        }
    }
    validate_no_double_spend(block)?;

    for tx in &block.transactions {
        validate_guarded(validator, tx)?;
    }
    Ok(())
}

/// Linkage, timestamp window, difficulty schedule and proof-of-work of `block`
/// against its parent (`None` for genesis).
pub fn validate_header(
    block: &Block,
    parent: Option<&Block>,
    expected_difficulty: u32,
    now_millis: u64,
    params: &ConsensusConfig,
) -> Result<()> {
    let header = &block.header;
    match parent {
        Some(parent) => {
            let expected_height = parent.header.height.checked_add(1).ok_or_else(|| {
                ChainError::InvalidBlock(format!("Parent height {} cannot be extended", parent.header.height))
            })?;
            if header.height != expected_height {
                return Err(ChainError::InvalidBlock(format!(
                    "Invalid block height. Expected {}, but got {}.",
                    expected_height, header.height
                )));
            }
            if header.previous_hash != parent.hash() {
                return Err(ChainError::InvalidBlock(format!(
                    "Invalid previous block hash. Expected {}, but got {}.",
                    parent.hash_str(),
                    hex::encode(header.previous_hash)
                )));
            }
            if header.timestamp < parent.header.timestamp {
                return Err(ChainError::InvalidBlock(format!(
                    "Block {} timestamp {} precedes its parent's {}",
                    header.height, header.timestamp, parent.header.timestamp
                )));
            }
        }
        None => {
            if header.height != 0 || header.previous_hash != [0u8; 32] {
                return Err(ChainError::InvalidBlock(
                    "Genesis block can only be applied to an empty chain.".to_string(),
                ));
            }
        }
    }

    let latest_allowed = now_millis.saturating_add(params.max_future_drift_secs.saturating_mul(1000));
    if header.timestamp > latest_allowed {
        return Err(ChainError::InvalidBlock(format!(
            "Block {} timestamp {} is too far in the future",
            header.height, header.timestamp
        )));
    }

    if header.difficulty != expected_difficulty {
        return Err(ChainError::InvalidBlock(format!(
            "Invalid difficulty. Expected {}, but got {}.",
            expected_difficulty, header.difficulty
        )));
    }
    if !block.meets_difficulty() {
        return Err(ChainError::InvalidBlock(
            "Invalid Proof-of-Work: Block hash does not meet difficulty target.".to_string(),
        ));
    }
    Ok(())
}

/// Checks the coinbase claims at most `reward` plus fees. Returns the newly minted amount.
pub fn validate_coinbase_amount(block: &Block, reward: u64) -> Result<u64> {
    let fees = block.total_fees()?;
    let coinbase = block.coinbase().ok_or_else(|| {
        ChainError::InvalidBlock("First transaction in a block must be a Coinbase transaction.".to_string())
    })?;
    let allowed = reward.saturating_add(fees);
    if coinbase.amount > allowed {
        return Err(ChainError::InvalidBlock(format!(
            "Coinbase in block {} claims {} but at most {} is allowed",
            block.header.height, coinbase.amount, allowed
        )));
    }
    Ok(coinbase.amount.saturating_sub(fees))
}
