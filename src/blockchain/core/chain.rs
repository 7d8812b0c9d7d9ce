use crate::consensus::{block_reward, block_work, meets_target, next_difficulty};
use crate::context::LedgerContext;
use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::mempool::{Admission, Mempool, MempoolAdmission, MempoolOverview, RejectReason};
use crate::merkle::{merkle_root, MerkleProof, MerkleTree};
use crate::miner::mine_block;
use crate::nonce::{NonceState, NonceTracker};
use crate::persistence::{InMemoryPersistence, LedgerSnapshot, Persistence};
use crate::transaction::{OutPoint, Transaction, TxId};
use crate::utxo::{Utxo, UtxoSet, UtxoState};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::apply_block_transactions;
use super::validation::{validate_block_body, validate_coinbase_amount, validate_header};

pub type Sha256Hash = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub timestamp: u64,
    pub previous_hash: Sha256Hash,
    pub merkle_root: Sha256Hash,
    pub difficulty: u32,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.previous_hash);
        hasher.update(self.merkle_root);
        hasher.update(self.difficulty.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Unmined block; the header nonce starts at zero.
    pub fn new(
        height: u64,
        previous_hash: Sha256Hash,
        difficulty: u32,
        timestamp: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let merkle_root = Block::calculate_merkle_root(&transactions);
        Block {
            header: BlockHeader {
                height,
                timestamp,
                previous_hash,
                merkle_root,
                difficulty,
                nonce: 0,
            },
            transactions,
        }
    }

    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn txids(&self) -> Vec<TxId> {
        self.transactions.iter().map(Transaction::id).collect()
    }

    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Sha256Hash {
        let ids: Vec<TxId> = transactions.iter().map(Transaction::id).collect();
        merkle_root(&ids)
    }

    pub fn merkle_tree(&self) -> MerkleTree {
        MerkleTree::build(&self.txids())
    }

    pub fn generate_proof(&self, txid: &TxId) -> Result<MerkleProof> {
        if self.transactions.is_empty() {
            return Err(ChainError::InvalidBlock(
                "Cannot prove inclusion in a block without transactions".to_string(),
            ));
        }
        self.merkle_tree().generate_proof(txid)
    }

    pub fn meets_difficulty(&self) -> bool {
        meets_target(&self.hash(), self.header.difficulty)
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Sum of the fees paid by every non-coinbase transaction.
    pub fn total_fees(&self) -> Result<u64> {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .try_fold(0u64, |total, tx| {
                total.checked_add(tx.fee).ok_or_else(|| {
                    ChainError::InvalidBlock(format!(
                        "Fee total overflows in block {}",
                        self.header.height
                    ))
                })
            })
    }
}

/// Apply a block to the ledger's three stores as one atomic step.
pub trait BlockApplier {
    fn apply_block(&self, block: Block) -> Result<()>;
}

/// Accepted block sequence plus the totals derived from it.
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    pub blocks: Vec<Block>,
    /// Difficulty required of the next block.
    pub difficulty: u32,
    pub issued: u64,
    pub work: u128,
    /// Bumped on every commit.
    pub sequence: u64,
}

impl ChainState {
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn genesis_hash(&self) -> Option<Sha256Hash> {
        self.blocks.first().map(Block::hash)
    }

    /// Appends a block whose transactions have already been applied.
    pub(crate) fn push(&mut self, block: Block, minted: u64, context: &LedgerContext) {
        self.work = self.work.saturating_add(block_work(block.header.difficulty));
        self.issued = self.issued.saturating_add(minted);
        self.blocks.push(block);
        self.difficulty = next_difficulty(&self.blocks, &context.config.consensus);
        self.sequence = self.sequence.saturating_add(1);
    }

    pub(crate) fn capture(&self, utxos: &UtxoState, nonces: &NonceState) -> LedgerSnapshot {
        LedgerSnapshot {
            blocks: self.blocks.clone(),
            difficulty: self.difficulty,
            issued_supply: self.issued,
            cumulative_work: self.work,
            sequence: self.sequence,
            utxos: utxos.snapshot(),
            nonces: nonces.snapshot(),
        }
    }
}

/// Subsidy allowed for a block at `height` given the supply issued before it.
pub(crate) fn allowed_reward(context: &LedgerContext, height: u64, issued: u64) -> u64 {
    if height == 0 {
        context.config.genesis.reward
    } else {
        block_reward(height, issued, &context.config.consensus)
    }
}

/// The ledger: block sequence, UTXO set, nonce registry and mempool.
///
/// Locks are always taken chain, then UTXO, then nonce, then mempool.
pub struct Ledger {
    pub(super) context: Arc<LedgerContext>,
    pub(super) chain: RwLock<ChainState>,
    pub(super) utxos: Arc<UtxoSet>,
    pub(super) nonces: Arc<NonceTracker>,
    pub(super) mempool: Mempool,
    pub(super) persistence: Arc<dyn Persistence>,
    /// Sequence of the last snapshot the backend accepted.
    pub(super) persisted: Mutex<u64>,
}

impl Ledger {
    /// Create a ledger holding a freshly mined genesis block paying `genesis_address`.
    pub fn new(context: Arc<LedgerContext>, genesis_address: Address) -> Result<Self> {
        Self::with_persistence(context, genesis_address, Arc::new(InMemoryPersistence::new()))
    }

    pub fn with_persistence(
        context: Arc<LedgerContext>,
        genesis_address: Address,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self> {
        let genesis = Self::create_genesis_block(&context, genesis_address)?;
        let ledger = Self::empty(context, persistence);
        ledger.apply_block(genesis)?;
        Ok(ledger)
    }

    /// Rebuild a ledger by applying `blocks` in order with full validation.
    pub fn from_blocks(context: Arc<LedgerContext>, blocks: Vec<Block>) -> Result<Self> {
        if blocks.is_empty() {
            return Err(ChainError::InvalidBlock("Cannot build a ledger from no blocks".to_string()));
        }
        let ledger = Self::empty(context, Arc::new(InMemoryPersistence::new()));
        for block in blocks {
            ledger.apply_block(block)?;
        }
        Ok(ledger)
    }

    /// Replay a persisted snapshot's blocks and check the rebuilt stores match it.
    pub fn from_snapshot(
        context: Arc<LedgerContext>,
        snapshot: LedgerSnapshot,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self> {
        let mut ledger = Self::from_blocks(context, snapshot.blocks.clone())?;
        if ledger.utxo_digest() != snapshot.utxos.digest() {
            return Err(ChainError::Consistency(
                "UTXO set rebuilt from snapshot blocks does not match the stored set".to_string(),
            ));
        }
        if ledger.nonce_digest() != snapshot.nonces.confirmed_digest() {
            return Err(ChainError::Consistency(
                "Nonces rebuilt from snapshot blocks do not match the stored registry".to_string(),
            ));
        }
        ledger.persistence = persistence;
        let sequence = snapshot.sequence.max(ledger.chain.get_mut().sequence);
        ledger.chain.get_mut().sequence = sequence;
        *ledger.persisted.get_mut() = sequence;
        Ok(ledger)
    }

    fn empty(context: Arc<LedgerContext>, persistence: Arc<dyn Persistence>) -> Self {
        let utxos = Arc::new(UtxoSet::new());
        let nonces = Arc::new(NonceTracker::new());
        let mempool = Mempool::new(context.clone(), utxos.clone(), nonces.clone());
        Ledger {
            chain: RwLock::new(ChainState {
                difficulty: context.config.consensus.initial_difficulty,
                ..ChainState::default()
            }),
            context,
            utxos,
            nonces,
            mempool,
            persistence,
            persisted: Mutex::new(0),
        }
    }

    /// Deterministic for a given address and config: fixed timestamp, mined at the initial difficulty.
    pub fn create_genesis_block(context: &LedgerContext, miner_address: Address) -> Result<Block> {
        let genesis = &context.config.genesis;
        let coinbase = Transaction::coinbase(miner_address, genesis.reward, 0, genesis.timestamp_ms);
        let block = Block::new(
            0,
            [0u8; 32],
            context.config.consensus.initial_difficulty,
            genesis.timestamp_ms,
            vec![coinbase],
        );
        mine_block(block)
    }

    pub fn apply_block(&self, block: Block) -> Result<()> {
        let params = &self.context.config.consensus;
        validate_block_body(&block, self.context.validator.as_ref(), params)?;

        let now = self.context.clock.now_millis();
        let mut chain = self.chain.write();
        validate_header(&block, chain.tip(), chain.difficulty, now, params)?;
        let reward = allowed_reward(&self.context, block.header.height, chain.issued);
        let minted = validate_coinbase_amount(&block, reward)?;

        let mut utxos = self.utxos.write();
        let mut nonces = self.nonces.write();
        let utxo_snapshot = utxos.snapshot();
        let nonce_snapshot = nonces.snapshot();
        if let Err(err) = apply_block_transactions(&block, &mut utxos, &mut nonces) {
            utxos.restore(utxo_snapshot);
            nonces.restore(nonce_snapshot);
            warn!(
                height = block.header.height,
                hash = %block.hash_str(),
                error = %err,
                "block rejected during application"
            );
            return Err(err);
        }

        self.mempool
            .write()
            .on_block_applied(&block.transactions, &utxos, &mut nonces, now);

        let (height, hash, tx_count) = (block.header.height, block.hash_str(), block.transactions.len());
        chain.push(block, minted, &self.context);
        let difficulty = chain.difficulty;
        drop(nonces);
        drop(utxos);
        drop(chain);

        info!(height, hash = %hash, tx_count, next_difficulty = difficulty, "block applied");
        self.persist();
        Ok(())
    }

    /// Hands the current committed state to the backend. Runs with no write
    /// lock held; skips when a save at or past this sequence already happened.
    pub(super) fn persist(&self) {
        let mut persisted = self.persisted.lock();
        let snapshot = self.snapshot();
        if snapshot.sequence <= *persisted {
            debug!(
                sequence = snapshot.sequence,
                persisted = *persisted,
                "snapshot already persisted"
            );
            return;
        }
        match self.persistence.save_snapshot(&snapshot) {
            Ok(()) => *persisted = snapshot.sequence,
            Err(err) => warn!(error = %err, sequence = snapshot.sequence, "failed to persist ledger snapshot"),
        }
    }

    /// Unmined block extending the tip with the best pending transactions and a coinbase
    /// claiming the subsidy plus their fees.
    pub fn build_block_template(&self, miner: Address) -> Result<Block> {
        let params = &self.context.config.consensus;
        let chain = self.chain.read();
        let tip = chain
            .tip()
            .ok_or_else(|| ChainError::NotFound("Chain has no genesis block".to_string()))?;
        let height = tip.header.height + 1;

        let mut transactions = self
            .mempool
            .select_for_block(params.max_block_transactions.saturating_sub(1));
        let fees = transactions
            .iter()
            .try_fold(0u64, |total, tx| total.checked_add(tx.fee))
            .ok_or_else(|| ChainError::InvalidBlock("Template fee total overflows".to_string()))?;
        let reward = allowed_reward(&self.context, height, chain.issued);
        let timestamp = self.context.clock.now_millis().max(tip.header.timestamp);

        let coinbase = Transaction::coinbase(miner, reward.saturating_add(fees), height, timestamp);
        transactions.insert(0, coinbase);
        Ok(Block::new(height, tip.hash(), chain.difficulty, timestamp, transactions))
    }

    pub fn height(&self) -> u64 {
        self.chain.read().tip().map_or(0, Block::height)
    }

    pub fn len(&self) -> usize {
        self.chain.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.read().blocks.is_empty()
    }

    pub fn tip_hash(&self) -> Sha256Hash {
        self.chain.read().tip().map_or([0u8; 32], Block::hash)
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.chain.read().blocks.clone()
    }

    pub fn get_block(&self, height: u64) -> Option<Block> {
        self.chain.read().blocks.get(height as usize).cloned()
    }

    /// Difficulty the next block must carry.
    pub fn difficulty(&self) -> u32 {
        self.chain.read().difficulty
    }

    pub fn cumulative_work(&self) -> u128 {
        self.chain.read().work
    }

    pub fn issued_supply(&self) -> u64 {
        self.chain.read().issued
    }

    pub fn get_block_reward(&self, height: u64) -> u64 {
        allowed_reward(&self.context, height, self.chain.read().issued)
    }

    pub fn get_balance(&self, address: &Address) -> u64 {
        self.utxos.get_balance(address)
    }

    pub fn get_utxos_for_address(&self, address: &Address) -> Vec<(OutPoint, Utxo)> {
        self.utxos.get_utxos_for_address(address)
    }

    pub fn get_utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        self.utxos.get_utxo(outpoint)
    }

    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.nonces.get_nonce(address)
    }

    pub fn get_next_nonce(&self, address: &Address) -> u64 {
        self.nonces.get_next_nonce(address)
    }

    pub fn utxo_digest(&self) -> Sha256Hash {
        self.utxos.snapshot_digest()
    }

    /// Digest of confirmed nonces only; mempool reservations are excluded.
    pub fn nonce_digest(&self) -> Sha256Hash {
        self.nonces.read().confirmed_digest()
    }

    /// Inclusion proof for `txid` in the block at `height`, with that block's Merkle root.
    pub fn merkle_proof(&self, height: u64, txid: &TxId) -> Result<(MerkleProof, Sha256Hash)> {
        let chain = self.chain.read();
        let block = chain
            .blocks
            .get(height as usize)
            .ok_or_else(|| ChainError::NotFound(format!("No block at height {}", height)))?;
        let proof = block.generate_proof(txid)?;
        Ok((proof, block.header.merkle_root))
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let chain = self.chain.read();
        let utxos = self.utxos.read();
        let nonces = self.nonces.read();
        chain.capture(&utxos, &nonces)
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn context(&self) -> &Arc<LedgerContext> {
        &self.context
    }
}

impl BlockApplier for Ledger {
    fn apply_block(&self, block: Block) -> Result<()> {
        Ledger::apply_block(self, block)
    }
}

impl MempoolAdmission for Ledger {
    fn submit_transaction(&self, tx: Transaction) -> std::result::Result<Admission, RejectReason> {
        self.mempool.submit_transaction(tx)
    }

    fn get_mempool_overview(&self, limit: usize) -> MempoolOverview {
        self.mempool.get_mempool_overview(limit)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chain = self.chain.read();
        f.debug_struct("Ledger")
            .field("height", &chain.tip().map(Block::height))
            .field("difficulty", &chain.difficulty)
            .field("issued", &chain.issued)
            .field("work", &chain.work)
            .finish_non_exhaustive()
    }
}
