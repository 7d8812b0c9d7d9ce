//! Stateless transaction validation and the validator seam consumed by the core
use crate::crypto::address_from_public_key;
use crate::error::{ChainError, Result};
use crate::transaction::types::{Transaction, COINBASE_SENDER, MAX_INPUTS};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

/// External structural/signature check applied before any state is consulted.
pub trait TransactionValidator: Send + Sync {
    fn validate(&self, tx: &Transaction) -> Result<()>;
}

/// Default validator: structure, size, key-to-sender binding and secp256k1 signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureValidator;

impl TransactionValidator for SignatureValidator {
    fn validate(&self, tx: &Transaction) -> Result<()> {
        tx.validate_structure()?;
        if tx.is_coinbase() {
            return Ok(());
        }
        tx.verify_signature()
    }
}

/// Runs `validator`, turning a panic into a validation failure.
pub fn validate_guarded(validator: &dyn TransactionValidator, tx: &Transaction) -> Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| validator.validate(tx))) {
        Ok(result) => result,
        Err(_) => Err(ChainError::InvalidTransaction(format!(
            "Validator aborted while checking {}",
            tx.hash_str()
        ))),
    }
}

impl Transaction {
    pub fn validate_structure(&self) -> Result<()> {
        self.validate_size()?;

        if self.is_coinbase() {
            if self.sender != COINBASE_SENDER {
                return Err(ChainError::InvalidTransaction(
                    "Coinbase sender must be the coinbase sentinel".to_string(),
                ));
            }
            if !self.inputs.is_empty() || self.fee != 0 {
                return Err(ChainError::InvalidTransaction(
                    "Coinbase cannot carry inputs or fees".to_string(),
                ));
            }
            if self.recipient == [0; 32] {
                return Err(ChainError::InvalidTransaction(
                    "Coinbase beneficiary address cannot be empty".to_string(),
                ));
            }
            return Ok(());
        }

        if self.sender == COINBASE_SENDER {
            return Err(ChainError::InvalidTransaction(
                "Sender address cannot be empty".to_string(),
            ));
        }
        if self.recipient == [0; 32] {
            return Err(ChainError::InvalidTransaction(
                "Recipient address cannot be empty".to_string(),
            ));
        }
        if self.sender == self.recipient {
            return Err(ChainError::InvalidTransaction(
                "Sender and recipient cannot be the same".to_string(),
            ));
        }
        if self.amount == 0 {
            return Err(ChainError::InvalidTransaction(
                "Transfer amount must be greater than zero".to_string(),
            ));
        }
        if self.amount.checked_add(self.fee).is_none() {
            return Err(ChainError::InvalidTransaction("amount + fee overflows".to_string()));
        }
        if self.inputs.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Transfer must reference at least one input".to_string(),
            ));
        }
        if self.inputs.len() > MAX_INPUTS {
            return Err(ChainError::InvalidTransaction(format!(
                "Transfer references {} inputs (max: {})",
                self.inputs.len(),
                MAX_INPUTS
            )));
        }
        let mut seen = HashSet::with_capacity(self.inputs.len());
        if let Some(dup) = self.inputs.iter().find(|input| !seen.insert(**input)) {
            return Err(ChainError::DoubleSpendDetected(format!(
                "Input {} referenced twice in one transaction",
                dup
            )));
        }
        Ok(())
    }

    pub fn verify_signature(&self) -> Result<()> {
        let (signature, public_key) = match (&self.signature, &self.public_key) {
            (Some(sig), Some(pk)) => (sig, pk),
            _ => {
                return Err(ChainError::InvalidTransaction(
                    "Transaction not signed".to_string(),
                ))
            }
        };

        if address_from_public_key(public_key) != self.sender {
            return Err(ChainError::InvalidTransaction(format!(
                "Public key does not belong to sender {}",
                hex::encode(self.sender)
            )));
        }

        crate::crypto::verify_signature(public_key, &self.signable_message(), signature)
    }
}
