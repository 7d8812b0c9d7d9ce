//! secp256k1 signing primitives and address derivation

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// Shared context; creating one is expensive.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// A 32-byte address: SHA-256 of the compressed public key.
pub type Address = [u8; 32];

/// Hashes a label into an address. Handy for fixtures.
pub fn address_from_string(s: &str) -> Address {
    Sha256::digest(s.as_bytes()).into()
}

pub fn address_from_public_key(public_key_bytes: &[u8]) -> Address {
    Sha256::digest(public_key_bytes).into()
}

pub fn address_to_hex(addr: &Address) -> String {
    hex::encode(addr)
}

pub fn address_from_hex(hex_str: &str) -> Result<Address, ChainError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex address: {}", e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        ChainError::CryptoError(format!("Address must be 32 bytes, got {}", bytes.len()))
    })
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Result<Self, ChainError> {
        let secret_key = SecretKey::new(&mut OsRng);
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(ChainError::CryptoError(format!(
                "Secret key must be {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| ChainError::CryptoError(format!("Invalid secret key bytes: {}", e)))?;
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key.serialize())
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs SHA-256(message) and returns the compact signature.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], ChainError> {
        let digest = Sha256::digest(message);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;
        Ok(SECP256K1_CONTEXT
            .sign_ecdsa(&message, &self.secret_key)
            .serialize_compact())
    }
}

/// Verifies a compact ECDSA signature over SHA-256(message).
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;
    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;
    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_hash_of_public_key() {
        let keypair = KeyPair::generate().unwrap();
        assert_eq!(keypair.address(), address_from_public_key(&keypair.public_key_bytes()));
        assert_eq!(address_to_hex(&keypair.address()).len(), 64);
    }

    #[test]
    fn test_signing_and_verification() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"ledger transfer";
        let signature = keypair.sign(message).unwrap();
        assert!(verify_signature(&keypair.public_key_bytes(), message, &signature).is_ok());
    }

    #[test]
    fn test_wrong_key_fails() {
        let signer = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let signature = signer.sign(b"payload").unwrap();
        let result = verify_signature(&other.public_key_bytes(), b"payload", &signature);
        assert_eq!(
            result.unwrap_err().to_string(),
            "Cryptographic error: Signature verification failed"
        );
    }

    #[test]
    fn test_length_checks() {
        let keypair = KeyPair::generate().unwrap();
        let signature = keypair.sign(b"x").unwrap();
        let pubkey = keypair.public_key_bytes();
        assert!(verify_signature(&pubkey[1..], b"x", &signature)
            .unwrap_err()
            .to_string()
            .contains("Public key must be exactly"));
        assert!(verify_signature(&pubkey, b"x", &signature[1..])
            .unwrap_err()
            .to_string()
            .contains("Signature must be exactly"));
        assert!(KeyPair::from_secret_bytes(&[1u8; 31]).is_err());
    }

    #[test]
    fn test_address_hex_round_trip_rejects_short() {
        let addr = address_from_string("alice");
        assert_eq!(address_from_hex(&address_to_hex(&addr)).unwrap(), addr);
        assert!(address_from_hex("abcd").is_err());
    }
}
