//! State transitions: applying confirmed transactions to the UTXO and nonce stores.
//!
//! These functions mutate the stores in place and stop at the first error. The
//! caller holds the write locks and restores its snapshots on failure.

use crate::context::LedgerContext;
use crate::error::{ChainError, Result};
use crate::nonce::NonceState;
use crate::transaction::{OutPoint, Transaction};
use crate::utxo::{Utxo, UtxoState};

use super::chain::{allowed_reward, Block, ChainState};
use super::validation::validate_coinbase_amount;

pub fn apply_transaction(tx: &Transaction, utxos: &mut UtxoState, nonces: &mut NonceState) -> Result<()> {
    let id = tx.id();
    if tx.is_coinbase() {
        for output in tx.outputs(0)? {
            utxos.add_utxo(OutPoint::new(id, output.index), Utxo::new(output.address, output.amount))?;
        }
        return Ok(());
    }

    let expected = nonces.get_nonce(&tx.sender).saturating_add(1);
    if tx.nonce != expected {
        return Err(ChainError::Replay {
            address: hex::encode(tx.sender),
            expected,
            got: tx.nonce,
        });
    }

    let input_total = utxos.resolve_inputs(tx)?;
    let outputs = tx.outputs(input_total)?;
    for input in &tx.inputs {
        if !utxos.mark_spent(input) {
            return Err(ChainError::DoubleSpendDetected(format!(
                "Input {} of {} was spent concurrently",
                input,
                tx.hash_str()
            )));
        }
    }
    for output in outputs {
        utxos.add_utxo(OutPoint::new(id, output.index), Utxo::new(output.address, output.amount))?;
    }
    nonces.set_nonce(tx.sender, tx.nonce)
}

pub fn apply_block_transactions(block: &Block, utxos: &mut UtxoState, nonces: &mut NonceState) -> Result<()> {
    for tx in &block.transactions {
        apply_transaction(tx, utxos, nonces).map_err(|err| {
            ChainError::InvalidBlock(format!(
                "Transaction {} in block {} failed: {}",
                tx.hash_str(),
                block.header.height,
                err
            ))
        })?;
    }
    Ok(())
}

/// Replays `blocks` from genesis onto empty stores, checking each coinbase against
/// the reward schedule. Headers and signatures are assumed already verified.
pub fn replay_chain(
    context: &LedgerContext,
    blocks: &[Block],
    utxos: &mut UtxoState,
    nonces: &mut NonceState,
) -> Result<ChainState> {
    let mut chain = ChainState {
        difficulty: context.config.consensus.initial_difficulty,
        ..ChainState::default()
    };
    for block in blocks {
        let reward = allowed_reward(context, block.header.height, chain.issued);
        let minted = validate_coinbase_amount(block, reward)?;
        apply_block_transactions(block, utxos, nonces)?;
        chain.push(block.clone(), minted, context);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_string;

    #[test]
    fn test_transfer_spends_inputs_and_pays_change() {
        let alice = address_from_string("alice");
        let bob = address_from_string("bob");
        let mut utxos = UtxoState::new();
        let mut nonces = NonceState::new();

        let funding = Transaction::coinbase(alice, 1_000, 1, 0);
        apply_transaction(&funding, &mut utxos, &mut nonces).unwrap();
        let input = OutPoint::new(funding.id(), 0);

        let tx = Transaction::transfer(alice, bob, 600, 10, 1, 0, vec![input]);
        apply_transaction(&tx, &mut utxos, &mut nonces).unwrap();

        assert!(utxos.get(&input).unwrap().spent);
        assert_eq!(utxos.balance(&bob), 600);
        assert_eq!(utxos.balance(&alice), 390);
        assert_eq!(nonces.get_nonce(&alice), 1);
    }

    #[test]
    fn test_replayed_nonce_rejected() {
        let alice = address_from_string("alice");
        let mut utxos = UtxoState::new();
        let mut nonces = NonceState::new();
        let funding = Transaction::coinbase(alice, 1_000, 1, 0);
        apply_transaction(&funding, &mut utxos, &mut nonces).unwrap();

        let tx = Transaction::transfer(
            alice,
            address_from_string("bob"),
            5,
            0,
            2,
            0,
            vec![OutPoint::new(funding.id(), 0)],
        );
        assert!(matches!(
            apply_transaction(&tx, &mut utxos, &mut nonces),
            Err(ChainError::Replay { expected: 1, got: 2, .. })
        ));
    }

    #[test]
    fn test_second_spend_of_same_output_fails() {
        let alice = address_from_string("alice");
        let mut utxos = UtxoState::new();
        let mut nonces = NonceState::new();
        let funding = Transaction::coinbase(alice, 1_000, 1, 0);
        apply_transaction(&funding, &mut utxos, &mut nonces).unwrap();
        let input = OutPoint::new(funding.id(), 0);

        let first = Transaction::transfer(alice, address_from_string("bob"), 5, 0, 1, 0, vec![input]);
        let second = Transaction::transfer(alice, address_from_string("carol"), 5, 0, 2, 0, vec![input]);
        apply_transaction(&first, &mut utxos, &mut nonces).unwrap();
        assert!(matches!(
            apply_transaction(&second, &mut utxos, &mut nonces),
            Err(ChainError::DoubleSpendDetected(_))
        ));
    }
}
