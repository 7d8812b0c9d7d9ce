//! Proof-of-work search

use crate::blockchain::Block;
use crate::consensus::meets_target;
use crate::error::{ChainError, Result};
use tracing::debug;

/// Increments the header nonce until the block hash meets its difficulty.
pub fn mine_block(mut block: Block) -> Result<Block> {
    let difficulty = block.header.difficulty;
    for nonce in 0..=u64::MAX {
        block.header.nonce = nonce;
        if meets_target(&block.hash(), difficulty) {
            debug!(
                height = block.header.height,
                nonce,
                difficulty,
                "found proof of work"
            );
            return Ok(block);
        }
    }
    Err(ChainError::InvalidBlock(format!(
        "Nonce space exhausted at difficulty {}",
        difficulty
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_string;
    use crate::transaction::Transaction;

    #[test]
    fn test_mined_block_meets_target() {
        let coinbase = Transaction::coinbase(address_from_string("miner"), 50, 1, 0);
        let block = Block::new(1, [7u8; 32], 6, 1_000, vec![coinbase]);
        let mined = mine_block(block).unwrap();
        assert!(mined.meets_difficulty());
        assert!(meets_target(&mined.hash(), 6));
    }
}
