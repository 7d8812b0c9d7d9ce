//! Transaction types and canonical encoding
use crate::blockchain::Sha256Hash;
use crate::crypto::{Address, KeyPair};
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type TxId = Sha256Hash;

/// Sender used by coinbase transactions. No key hashes to it in practice.
pub const COINBASE_SENDER: Address = [0u8; 32];

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Maximum number of inputs a single transfer may consume.
pub const MAX_INPUTS: usize = 256;

/// Reference to a specific output of a prior transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, index: u32) -> Self {
        OutPoint { txid, index }
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Transfer,
    Coinbase,
}

/// An output produced when a transaction is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub index: u32,
    pub address: Address,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    pub sender: Address,
    pub recipient: Address,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub inputs: Vec<OutPoint>,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        sender: Address,
        recipient: Address,
        amount: u64,
        fee: u64,
        nonce: u64,
        timestamp: u64,
        inputs: Vec<OutPoint>,
    ) -> Self {
        Transaction {
            kind: TransactionKind::Transfer,
            sender,
            recipient,
            amount,
            fee,
            nonce,
            timestamp,
            inputs,
            signature: None,
            public_key: None,
        }
    }

    /// Block reward transaction; `height` doubles as the nonce so ids differ per block.
    pub fn coinbase(recipient: Address, amount: u64, height: u64, timestamp: u64) -> Self {
        Transaction {
            kind: TransactionKind::Coinbase,
            sender: COINBASE_SENDER,
            recipient,
            amount,
            fee: 0,
            nonce: height,
            timestamp,
            inputs: Vec::new(),
            signature: None,
            public_key: None,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.kind == TransactionKind::Coinbase
    }

    /// Fixed-order encoding of every field except the signature material.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(128 + self.inputs.len() * 36);
        match self.kind {
            TransactionKind::Transfer => message.extend_from_slice(b"TRANSFER:"),
            TransactionKind::Coinbase => message.extend_from_slice(b"COINBASE:"),
        }
        message.extend_from_slice(&self.sender);
        message.extend_from_slice(&self.recipient);
        message.extend_from_slice(&self.amount.to_le_bytes());
        message.extend_from_slice(&self.fee.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        message.extend_from_slice(&self.timestamp.to_le_bytes());
        message.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            message.extend_from_slice(&input.txid);
            message.extend_from_slice(&input.index.to_le_bytes());
        }
        message
    }

    pub fn signable_message(&self) -> Vec<u8> {
        self.canonical_bytes()
    }

    pub fn id(&self) -> TxId {
        Sha256::digest(self.canonical_bytes()).into()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.id())
    }

    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        let signature = keypair.sign(&self.signable_message())?;
        self.signature = Some(signature.to_vec());
        self.public_key = Some(keypair.public_key_bytes().to_vec());
        Ok(())
    }

    pub fn attach_signature(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        bincode::serialized_size(self)
            .map(|size| size as usize)
            .unwrap_or(usize::MAX)
    }

    /// Fee per serialized byte.
    pub fn fee_rate(&self) -> f64 {
        self.fee as f64 / self.size().max(1) as f64
    }

    pub fn validate_size(&self) -> Result<()> {
        let size = self.size();
        if size > MAX_TRANSACTION_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                size, MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }

    /// Outputs created when this transaction is applied against inputs worth `input_total`.
    ///
    /// Index 0 pays the recipient; index 1 returns change to the sender when non-zero.
    pub fn outputs(&self, input_total: u64) -> Result<Vec<TxOutput>> {
        let mut outputs = vec![TxOutput {
            index: 0,
            address: self.recipient,
            amount: self.amount,
        }];
        if self.is_coinbase() {
            return Ok(outputs);
        }

        let required = self.amount.checked_add(self.fee).ok_or_else(|| {
            ChainError::InvalidTransaction("amount + fee overflows".to_string())
        })?;
        let change = input_total.checked_sub(required).ok_or_else(|| {
            ChainError::InvalidTransaction(format!(
                "Insufficient input value: inputs hold {} but amount + fee is {}",
                input_total, required
            ))
        })?;
        if change > 0 {
            outputs.push(TxOutput {
                index: 1,
                address: self.sender,
                amount: change,
            });
        }
        Ok(outputs)
    }
}
