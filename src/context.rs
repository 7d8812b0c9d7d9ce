//! Shared collaborators handed to the ledger and mempool at construction

use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::transaction::{SignatureValidator, TransactionValidator};
use std::sync::Arc;

/// Built once per process and passed down by `Arc`; nothing in the core reads globals.
#[derive(Clone)]
pub struct LedgerContext {
    pub config: LedgerConfig,
    pub clock: Arc<dyn Clock>,
    pub validator: Arc<dyn TransactionValidator>,
}

impl LedgerContext {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            validator: Arc::new(SignatureValidator),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn TransactionValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl std::fmt::Debug for LedgerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerContext")
            .field("config", &self.config)
            .field("now_millis", &self.clock.now_millis())
            .finish_non_exhaustive()
    }
}
