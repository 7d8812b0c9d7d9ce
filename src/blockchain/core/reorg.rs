//! Fork choice and chain reorganization.
//!
//! A candidate is fully checked before any lock is taken. The rebuild then
//! replays it from genesis on the live stores under write locks; on failure
//! both stores are restored from snapshots and the chain is left untouched.

use crate::consensus::{chain_work, is_better_chain, next_difficulty};
use crate::context::LedgerContext;
use crate::error::{ChainError, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use super::chain::{Block, Ledger};
use super::state::replay_chain;
use super::validation::{validate_block_body, validate_header};

pub trait ForkChoice {
    /// Replace the current chain with `candidate` if it wins fork choice.
    fn replace_chain(&self, candidate: Vec<Block>) -> Result<()>;

    /// True if `candidate` has strictly more cumulative work than the current chain.
    fn is_better_chain(&self, candidate: &[Block]) -> bool;
}

/// Header, Merkle and transaction checks for every candidate block, in parallel.
/// Each block's difficulty is checked against the schedule implied by its predecessors.
pub fn validate_candidate(context: &LedgerContext, candidate: &[Block], now_millis: u64) -> Result<()> {
    let params = &context.config.consensus;
    let validator = context.validator.as_ref();
    // Every block must sit at the position its height claims.
    if let Some((index, block)) = candidate
        .iter()
        .enumerate()
        .find(|(index, block)| block.header.height != *index as u64)
    {
        return Err(ChainError::InvalidBlock(format!(
            "Candidate block at position {} claims height {}",
            index, block.header.height
        )));
    }
    candidate
        .par_iter()
        .enumerate()
        .try_for_each(|(index, block)| {
            let parent = index.checked_sub(1).map(|i| &candidate[i]);
            let expected_difficulty = next_difficulty(&candidate[..index], params);
            validate_header(block, parent, expected_difficulty, now_millis, params)?;
            validate_block_body(block, validator, params)
        })
}

impl Ledger {
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<()> {
        let candidate_work = chain_work(&candidate);
        let (current_work, genesis_hash) = {
            let chain = self.chain.read();
            (chain.work, chain.genesis_hash())
        };

        if !is_better_chain(candidate_work, current_work) {
            info!(
                candidate_len = candidate.len(),
                candidate_work,
                current_work,
                "reorg rejected: candidate does not carry more work"
            );
            return Err(ChainError::Conflict(format!(
                "Candidate chain work {} does not exceed current work {}",
                candidate_work, current_work
            )));
        }
        if candidate.first().map(Block::hash) != genesis_hash {
            return Err(ChainError::InvalidBlock(
                "Candidate chain does not share our genesis block".to_string(),
            ));
        }

        let now = self.context.clock.now_millis();
        if let Err(err) = validate_candidate(&self.context, &candidate, now) {
            info!(error = %err, "reorg rejected: candidate failed validation");
            return Err(err);
        }

        let mut chain = self.chain.write();
        // The tip may have moved while the candidate was being checked.
        if !is_better_chain(candidate_work, chain.work) {
            return Err(ChainError::Conflict(format!(
                "Candidate chain work {} no longer exceeds current work {}",
                candidate_work, chain.work
            )));
        }

        let mut utxos = self.utxos.write();
        let mut nonces = self.nonces.write();
        let utxo_snapshot = utxos.snapshot();
        let nonce_snapshot = nonces.snapshot();
        utxos.clear();
        nonces.clear();

        let mut rebuilt = match replay_chain(&self.context, &candidate, &mut utxos, &mut nonces) {
            Ok(rebuilt) => rebuilt,
            Err(err) => {
                utxos.restore(utxo_snapshot);
                nonces.restore(nonce_snapshot);
                warn!(error = %err, height = chain.tip().map(Block::height), "reorg rolled back");
                return Err(ChainError::Consistency(format!(
                    "Reorg rebuild failed and was rolled back: {}",
                    err
                )));
            }
        };

        let old_height = chain.tip().map(Block::height);
        rebuilt.sequence = chain.sequence.saturating_add(1);
        *chain = rebuilt;

        let evicted = {
            let mut pool = self.mempool.write();
            let evicted = pool.revalidate(self.context.validator.as_ref(), &utxos, &mut nonces);
            pool.promote_orphans(&utxos, &mut nonces, now);
            evicted
        };

        let new_height = chain.tip().map(Block::height);
        let work = chain.work;
        drop(nonces);
        drop(utxos);
        drop(chain);

        info!(?old_height, ?new_height, work, evicted, "reorg accepted");
        self.persist();
        Ok(())
    }

    pub fn is_better_chain(&self, candidate: &[Block]) -> bool {
        is_better_chain(chain_work(candidate), self.chain.read().work)
    }
}

impl ForkChoice for Ledger {
    fn replace_chain(&self, candidate: Vec<Block>) -> Result<()> {
        Ledger::replace_chain(self, candidate)
    }

    fn is_better_chain(&self, candidate: &[Block]) -> bool {
        Ledger::is_better_chain(self, candidate)
    }
}
