// Ledger core, one submodule per responsibility.
pub mod chain;
pub mod reorg;
pub mod state;
pub mod validation;

pub use chain::*;
pub use reorg::*;
pub use state::*;
pub use validation::*;
