//! Merkle tree over ordered transaction ids.
//!
//! Pairs are hashed bottom-up as `SHA-256(left || right)`. When a level has an
//! odd number of nodes the last one is paired with itself. A single-leaf tree
//! has the leaf as its root and an empty proof.

use crate::blockchain::Sha256Hash;
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One step of an inclusion proof, ordered leaf to root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Sha256Hash,
    /// True when the sibling sits to the right of the running hash.
    pub is_right: bool,
}

pub type MerkleProof = Vec<ProofStep>;

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<Sha256Hash>>,
}

fn hash_pair(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

impl MerkleTree {
    pub fn build(leaves: &[Sha256Hash]) -> Self {
        if leaves.is_empty() {
            return MerkleTree { levels: Vec::new() };
        }

        let mut levels = vec![leaves.to_vec()];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [lone] => hash_pair(lone, lone),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }
        MerkleTree { levels }
    }

    /// Root of the tree; all zeros for an empty leaf list.
    pub fn root(&self) -> Sha256Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn generate_proof(&self, txid: &Sha256Hash) -> Result<MerkleProof> {
        let leaves = self.levels.first().ok_or_else(|| {
            ChainError::InvalidTransaction("Cannot build a proof over an empty transaction list".to_string())
        })?;
        let mut index = leaves
            .iter()
            .position(|leaf| leaf == txid)
            .ok_or_else(|| ChainError::NotFound(format!("Transaction {} not in tree", hex::encode(txid))))?;

        let mut proof = Vec::with_capacity(self.levels.len().saturating_sub(1));
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if index % 2 == 0 {
                // A missing right sibling means this node was paired with itself.
                let sibling = level.get(index + 1).unwrap_or(&level[index]);
                ProofStep { sibling: *sibling, is_right: true }
            } else {
                ProofStep { sibling: level[index - 1], is_right: false }
            };
            proof.push(step);
            index /= 2;
        }
        Ok(proof)
    }

    /// Recomputes the path from `txid` and compares against `root`.
    pub fn verify_proof(txid: &Sha256Hash, root: &Sha256Hash, proof: &[ProofStep]) -> bool {
        let computed = proof.iter().fold(*txid, |acc, step| {
            if step.is_right {
                hash_pair(&acc, &step.sibling)
            } else {
                hash_pair(&step.sibling, &acc)
            }
        });
        computed == *root
    }
}

/// Root over `txids` without keeping the tree around.
pub fn merkle_root(txids: &[Sha256Hash]) -> Sha256Hash {
    MerkleTree::build(txids).root()
}
