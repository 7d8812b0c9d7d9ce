//! utxo-ledger - consistency engine for a UTXO-model ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the `Ledger`, atomic block application and reorg
//! - [`transaction`] - Transaction types, canonical encoding and validation
//! - [`mempool`] - Admission-controlled transaction pool
//!
//! ## State
//! - [`utxo`] - Thread-safe unspent output set with snapshots
//! - [`nonce`] - Per-sender replay protection
//! - [`merkle`] - Merkle trees and inclusion proofs
//! - [`persistence`] - Snapshot hand-off after each commit
//!
//! ## Consensus
//! - [`consensus`] - Difficulty, rewards and fork choice
//! - [`miner`] - Proof-of-work search
//!
//! ## Cryptography
//! - [`crypto`] - Signatures and verification (secp256k1)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`context`] - Shared collaborators passed to the core
//! - [`clock`] - Time sources
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// State
// ============================================================================
pub mod merkle;
pub mod nonce;
pub mod persistence;
pub mod utxo;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod clock;
pub mod config;
pub mod context;
pub mod error;

pub use blockchain::{Block, BlockApplier, BlockHeader, ForkChoice, Ledger, Sha256Hash};
pub use context::LedgerContext;
pub use error::{ChainError, ErrorKind, Result};
pub use mempool::{Admission, Mempool, MempoolAdmission, RejectReason};
pub use transaction::{OutPoint, Transaction, TxId};
