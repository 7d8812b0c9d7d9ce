//! Transaction module split into types and validation

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{validate_guarded, SignatureValidator, TransactionValidator};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_string, KeyPair};
    use crate::error::ChainError;

    fn outpoint(tag: &str) -> OutPoint {
        OutPoint::new(address_from_string(tag), 0)
    }

    fn signed_transfer(keypair: &KeyPair, fee: u64) -> Transaction {
        let mut tx = Transaction::transfer(
            keypair.address(),
            address_from_string("recipient"),
            100,
            fee,
            1,
            1_700_000_000_000,
            vec![outpoint("funding")],
        );
        tx.sign(keypair).unwrap();
        tx
    }

    #[test]
    fn test_id_ignores_signature_material() {
        let keypair = KeyPair::generate().unwrap();
        let signed = signed_transfer(&keypair, 5);
        let mut unsigned = signed.clone();
        unsigned.signature = None;
        unsigned.public_key = None;
        assert_eq!(signed.id(), unsigned.id());
        assert_eq!(signed.hash_str().len(), 64);
        assert!(signed.hash_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_id_changes_with_each_field() {
        let keypair = KeyPair::generate().unwrap();
        let base = signed_transfer(&keypair, 5);
        let mut fee = base.clone();
        fee.fee += 1;
        let mut nonce = base.clone();
        nonce.nonce += 1;
        let mut input = base.clone();
        input.inputs[0].index = 1;
        assert_ne!(base.id(), fee.id());
        assert_ne!(base.id(), nonce.id());
        assert_ne!(base.id(), input.id());
    }

    #[test]
    fn test_signature_validator_accepts_signed_transfer() {
        let keypair = KeyPair::generate().unwrap();
        let tx = signed_transfer(&keypair, 5);
        assert!(SignatureValidator.validate(&tx).is_ok());
    }

    #[test]
    fn test_unsigned_transaction_fails() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = signed_transfer(&keypair, 5);
        tx.signature = None;
        assert!(SignatureValidator.validate(&tx).is_err());
    }

    #[test]
    fn test_foreign_key_fails() {
        let owner = KeyPair::generate().unwrap();
        let thief = KeyPair::generate().unwrap();
        let mut tx = signed_transfer(&owner, 5);
        let signature = thief.sign(&tx.signable_message()).unwrap();
        tx.attach_signature(signature.to_vec(), thief.public_key_bytes().to_vec());
        let err = SignatureValidator.validate(&tx).unwrap_err();
        assert!(err.to_string().contains("does not belong to sender"));
    }

    #[test]
    fn test_tampered_amount_fails() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = signed_transfer(&keypair, 5);
        tx.amount = 1_000_000;
        assert!(SignatureValidator.validate(&tx).is_err());
    }

    #[test]
    fn test_duplicate_inputs_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = signed_transfer(&keypair, 5);
        tx.inputs.push(tx.inputs[0]);
        tx.sign(&keypair).unwrap();
        assert!(matches!(
            SignatureValidator.validate(&tx),
            Err(ChainError::DoubleSpendDetected(_))
        ));
    }

    #[test]
    fn test_coinbase_structure() {
        let coinbase = Transaction::coinbase(address_from_string("miner"), 50, 7, 0);
        assert!(coinbase.is_coinbase());
        assert!(SignatureValidator.validate(&coinbase).is_ok());

        let mut with_input = coinbase.clone();
        with_input.inputs.push(outpoint("x"));
        assert!(with_input.validate_structure().is_err());
    }

    #[test]
    fn test_outputs_with_change() {
        let keypair = KeyPair::generate().unwrap();
        let tx = signed_transfer(&keypair, 5);
        let outputs = tx.outputs(150).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].amount, 100);
        assert_eq!(outputs[1].address, keypair.address());
        assert_eq!(outputs[1].amount, 45);

        assert_eq!(tx.outputs(105).unwrap().len(), 1);
        assert!(tx.outputs(104).is_err());
    }

    #[test]
    fn test_fee_rate_scales_with_fee() {
        let keypair = KeyPair::generate().unwrap();
        let low = signed_transfer(&keypair, 100);
        let high = signed_transfer(&keypair, 200);
        assert_eq!(low.size(), high.size());
        assert!((high.fee_rate() - 2.0 * low.fee_rate()).abs() < 1e-9);
    }

    struct PanickingValidator;

    impl TransactionValidator for PanickingValidator {
        fn validate(&self, _tx: &Transaction) -> crate::error::Result<()> {
            panic!("validator bug")
        }
    }

    #[test]
    fn test_guarded_validation_fails_closed() {
        let keypair = KeyPair::generate().unwrap();
        let tx = signed_transfer(&keypair, 5);
        assert!(validate_guarded(&PanickingValidator, &tx).is_err());
    }
}
