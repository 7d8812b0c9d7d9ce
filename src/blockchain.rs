// Thin re-export module: implementation lives in `blockchain/core.rs`, split into
// block types and the ledger, state transitions, validation and reorg.

pub mod core;
pub use core::*;
