//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use utxo_ledger::clock::ManualClock;
use utxo_ledger::config::{ConsensusConfig, LedgerConfig, MempoolConfig};
use utxo_ledger::consensus::next_difficulty;
use utxo_ledger::crypto::{Address, KeyPair};
use utxo_ledger::miner::mine_block;
use utxo_ledger::{Block, ChainError, LedgerContext, OutPoint, Transaction};

pub const GENESIS_TS: u64 = 1_672_531_200_000;
pub const BLOCK_SPACING_MS: u64 = 30_000;
pub const SUBSIDY: u64 = 1_000;

/// Low difficulty and a retarget interval long enough that tests never hit it.
pub fn test_config() -> LedgerConfig {
    LedgerConfig {
        consensus: ConsensusConfig {
            initial_difficulty: 3,
            min_difficulty: 1,
            max_difficulty: 16,
            retarget_interval: 10_000,
            ..ConsensusConfig::default()
        },
        ..LedgerConfig::default()
    }
}

pub fn test_config_with_mempool(mempool: MempoolConfig) -> LedgerConfig {
    LedgerConfig {
        mempool,
        ..test_config()
    }
}

/// Clock parked a day after genesis so every test block is in the past.
pub fn test_clock() -> ManualClock {
    ManualClock::new(GENESIS_TS + 86_400_000)
}

pub fn context(config: LedgerConfig, clock: &ManualClock) -> Arc<LedgerContext> {
    LedgerContext::new(config)
        .with_clock(Arc::new(clock.clone()))
        .shared()
}

/// Mines the block extending `chain` with a coinbase to `miner` plus `transactions`.
pub fn next_block(
    context: &LedgerContext,
    chain: &[Block],
    miner: Address,
    transactions: Vec<Transaction>,
) -> Result<Block, ChainError> {
    let parent = chain
        .last()
        .ok_or_else(|| ChainError::NotFound("empty chain".to_string()))?;
    let height = parent.header.height + 1;
    let timestamp = parent.header.timestamp + BLOCK_SPACING_MS;
    let fees: u64 = transactions.iter().map(|tx| tx.fee).sum();

    let mut all = vec![Transaction::coinbase(miner, SUBSIDY + fees, height, timestamp)];
    all.extend(transactions);
    let difficulty = next_difficulty(chain, &context.config.consensus);
    mine_block(Block::new(height, parent.hash(), difficulty, timestamp, all))
}

/// Extends `chain` by `count` empty blocks paying `miner`.
pub fn extend(
    context: &LedgerContext,
    mut chain: Vec<Block>,
    miner: Address,
    count: usize,
) -> Result<Vec<Block>, ChainError> {
    for _ in 0..count {
        let block = next_block(context, &chain, miner, Vec::new())?;
        chain.push(block);
    }
    Ok(chain)
}

pub fn signed_transfer(
    keypair: &KeyPair,
    recipient: Address,
    amount: u64,
    fee: u64,
    nonce: u64,
    inputs: Vec<OutPoint>,
) -> Result<Transaction, ChainError> {
    let mut tx = Transaction::transfer(
        keypair.address(),
        recipient,
        amount,
        fee,
        nonce,
        GENESIS_TS,
        inputs,
    );
    tx.sign(keypair)?;
    Ok(tx)
}

/// Output 0 of the block's coinbase.
pub fn coinbase_output(block: &Block) -> Result<OutPoint, ChainError> {
    let coinbase = block
        .coinbase()
        .ok_or_else(|| ChainError::InvalidBlock("block has no coinbase".to_string()))?;
    Ok(OutPoint::new(coinbase.id(), 0))
}
