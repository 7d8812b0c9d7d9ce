mod common;

use common::*;
use utxo_ledger::clock::ManualClock;
use utxo_ledger::config::MempoolConfig;
use utxo_ledger::crypto::{Address, KeyPair};
use utxo_ledger::miner::mine_block;
use utxo_ledger::{Admission, ErrorKind, Ledger, MempoolAdmission, OutPoint, RejectReason};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn ledger_with(mempool: MempoolConfig, genesis_owner: &KeyPair) -> Result<(Ledger, ManualClock), Box<dyn std::error::Error>> {
    let clock = test_clock();
    let ledger = Ledger::new(context(test_config_with_mempool(mempool), &clock), genesis_owner.address())?;
    Ok((ledger, clock))
}

/// Mines one empty block per owner; returns each owner's coinbase output.
fn fund(ledger: &Ledger, owners: &[Address]) -> Result<Vec<OutPoint>, Box<dyn std::error::Error>> {
    let mut outputs = Vec::new();
    for owner in owners {
        let block = next_block(ledger.context(), &ledger.blocks(), *owner, Vec::new())?;
        outputs.push(coinbase_output(&block)?);
        ledger.apply_block(block)?;
    }
    Ok(outputs)
}

fn mine_pending(ledger: &Ledger, miner: Address) -> TestResult {
    let template = ledger.build_block_template(miner)?;
    ledger.apply_block(mine_block(template)?)?;
    Ok(())
}

#[test]
fn test_full_pool_evicts_lowest_fee_rate() -> TestResult {
    let owner = KeyPair::generate()?;
    let config = MempoolConfig {
        max_size: 2,
        ..MempoolConfig::default()
    };
    let (ledger, _clock) = ledger_with(config, &owner)?;
    let sink = KeyPair::generate()?.address();
    let (a, b, c) = (KeyPair::generate()?, KeyPair::generate()?, KeyPair::generate()?);
    let funds = fund(&ledger, &[a.address(), b.address(), c.address()])?;

    let tx_a = signed_transfer(&a, sink, 100, 10, 1, vec![funds[0]])?;
    let tx_b = signed_transfer(&b, sink, 100, 5, 1, vec![funds[1]])?;
    let tx_c = signed_transfer(&c, sink, 100, 8, 1, vec![funds[2]])?;

    assert!(matches!(ledger.submit_transaction(tx_a.clone())?, Admission::Accepted { evicted: None, .. }));
    assert!(matches!(ledger.submit_transaction(tx_b.clone())?, Admission::Accepted { evicted: None, .. }));
    match ledger.submit_transaction(tx_c.clone())? {
        Admission::Accepted { id, evicted } => {
            assert_eq!(id, tx_c.id());
            assert_eq!(evicted, Some(tx_b.id()));
        }
        other => panic!("unexpected admission {:?}", other),
    }
    assert_eq!(ledger.mempool().len(), 2);
    assert!(!ledger.mempool().contains(&tx_b.id()));
    assert_eq!(ledger.get_next_nonce(&b.address()), 1);

    let cheap = signed_transfer(&b, sink, 150, 3, 1, vec![funds[1]])?;
    let reason = ledger.submit_transaction(cheap).unwrap_err();
    assert!(matches!(reason, RejectReason::PoolFullLowFee { .. }));
    assert_eq!(reason.kind(), ErrorKind::Capacity);

    let overview = ledger.get_mempool_overview(10);
    assert_eq!(overview.pending_count, 2);
    assert_eq!(overview.entries[0].id, tx_a.hash_str());
    assert_eq!(overview.entries[1].id, tx_c.hash_str());
    assert_eq!(overview.stats.evicted_low_fee_total, 1);
    Ok(())
}

#[test]
fn test_replace_by_fee_requires_strictly_higher_rate() -> TestResult {
    let alice = KeyPair::generate()?;
    let (ledger, _clock) = ledger_with(MempoolConfig::default(), &alice)?;
    let bob = KeyPair::generate()?.address();
    let funding = coinbase_output(&ledger.blocks()[0])?;

    let original = signed_transfer(&alice, bob, 100, 10, 1, vec![funding])?;
    ledger.submit_transaction(original.clone())?;

    let bumped = signed_transfer(&alice, bob, 200, 30, 1, vec![funding])?;
    match ledger.submit_transaction(bumped.clone())? {
        Admission::Replaced { id, replaced } => {
            assert_eq!(id, bumped.id());
            assert_eq!(replaced, vec![original.id()]);
        }
        other => panic!("unexpected admission {:?}", other),
    }
    assert!(!ledger.mempool().contains(&original.id()));
    assert!(ledger.mempool().contains(&bumped.id()));
    assert_eq!(ledger.get_next_nonce(&alice.address()), 2);

    let overview = ledger.get_mempool_overview(5);
    assert_eq!(overview.entries[0].replaces, vec![original.hash_str()]);

    let same_rate = signed_transfer(&alice, bob, 300, 30, 1, vec![funding])?;
    let reason = ledger.submit_transaction(same_rate).unwrap_err();
    assert!(matches!(reason, RejectReason::RbfFeeTooLow { .. }));
    assert_eq!(reason.kind(), ErrorKind::Conflict);
    assert_eq!(ledger.mempool().len(), 1);
    Ok(())
}

#[test]
fn test_duplicate_and_nonce_gap_rejected() -> TestResult {
    let alice = KeyPair::generate()?;
    let (ledger, _clock) = ledger_with(MempoolConfig::default(), &alice)?;
    let bob = KeyPair::generate()?.address();
    let funding = coinbase_output(&ledger.blocks()[0])?;

    let tx = signed_transfer(&alice, bob, 100, 10, 1, vec![funding])?;
    ledger.submit_transaction(tx.clone())?;
    assert_eq!(ledger.submit_transaction(tx).unwrap_err(), RejectReason::Duplicate);

    let extra = fund(&ledger, &[alice.address()])?;
    let gapped = signed_transfer(&alice, bob, 100, 10, 5, vec![extra[0]])?;
    let reason = ledger.submit_transaction(gapped).unwrap_err();
    assert_eq!(
        reason,
        RejectReason::NonceMismatch {
            sender: alice.address(),
            expected: 2,
            got: 5
        }
    );
    assert_eq!(reason.kind(), ErrorKind::Replay);
    Ok(())
}

#[test]
fn test_sender_cap_enforced_across_nonces() -> TestResult {
    let alice = KeyPair::generate()?;
    let config = MempoolConfig {
        max_per_sender: 2,
        ..MempoolConfig::default()
    };
    let (ledger, _clock) = ledger_with(config, &alice)?;
    let bob = KeyPair::generate()?.address();
    let mut inputs = vec![coinbase_output(&ledger.blocks()[0])?];
    inputs.extend(fund(&ledger, &[alice.address(), alice.address()])?);

    for (nonce, input) in (1..=2).zip(&inputs) {
        ledger.submit_transaction(signed_transfer(&alice, bob, 100, 10, nonce, vec![*input])?)?;
    }
    let third = signed_transfer(&alice, bob, 100, 10, 3, vec![inputs[2]])?;
    assert_eq!(
        ledger.submit_transaction(third).unwrap_err(),
        RejectReason::SenderCapReached { limit: 2 }
    );
    Ok(())
}

#[test]
fn test_repeat_offender_banned_until_window_lapses() -> TestResult {
    let alice = KeyPair::generate()?;
    let (ledger, clock) = ledger_with(MempoolConfig::default(), &alice)?;
    let mallory = KeyPair::generate()?;
    let eve = KeyPair::generate()?;
    let bob = KeyPair::generate()?.address();

    for amount in 1..=3 {
        let mut forged = utxo_ledger::Transaction::transfer(
            mallory.address(),
            bob,
            amount,
            1,
            1,
            GENESIS_TS,
            vec![OutPoint::new([4u8; 32], 0)],
        );
        forged.sign(&eve)?;
        assert!(matches!(
            ledger.submit_transaction(forged).unwrap_err(),
            RejectReason::Invalid(_)
        ));
    }

    let honest = signed_transfer(&mallory, bob, 10, 1, 1, vec![OutPoint::new([5u8; 32], 0)])?;
    let reason = ledger.submit_transaction(honest.clone()).unwrap_err();
    assert!(matches!(reason, RejectReason::SenderBanned { .. }));
    assert_eq!(ledger.get_mempool_overview(0).banned_senders, 1);

    clock.advance_secs(301);
    let admission = ledger.submit_transaction(honest)?;
    assert!(matches!(admission, Admission::Orphaned { .. }));
    assert_eq!(ledger.get_mempool_overview(0).banned_senders, 0);
    Ok(())
}

#[test]
fn test_orphan_promoted_once_parent_confirms() -> TestResult {
    let alice = KeyPair::generate()?;
    let bob = KeyPair::generate()?;
    let carol = KeyPair::generate()?.address();
    let miner = KeyPair::generate()?.address();
    let (ledger, _clock) = ledger_with(MempoolConfig::default(), &alice)?;
    let funding = coinbase_output(&ledger.blocks()[0])?;

    let parent = signed_transfer(&alice, bob.address(), 5_000, 10, 1, vec![funding])?;
    let child = signed_transfer(&bob, carol, 1_000, 10, 1, vec![OutPoint::new(parent.id(), 0)])?;
    ledger.submit_transaction(parent.clone())?;
    assert!(matches!(ledger.submit_transaction(child.clone())?, Admission::Orphaned { .. }));
    assert_eq!(ledger.mempool().orphan_count(), 1);
    assert!(!ledger.mempool().contains(&child.id()));

    mine_pending(&ledger, miner)?;
    assert_eq!(ledger.mempool().orphan_count(), 0);
    assert!(ledger.mempool().contains(&child.id()));

    mine_pending(&ledger, miner)?;
    assert!(ledger.mempool().is_empty());
    assert_eq!(ledger.get_balance(&carol), 1_000);
    assert_eq!(ledger.get_balance(&bob.address()), 5_000 - 1_010);
    Ok(())
}

#[test]
fn test_expired_transactions_release_their_nonce() -> TestResult {
    let alice = KeyPair::generate()?;
    let (ledger, clock) = ledger_with(MempoolConfig::default(), &alice)?;
    let bob = KeyPair::generate()?.address();
    let funding = coinbase_output(&ledger.blocks()[0])?;

    ledger.submit_transaction(signed_transfer(&alice, bob, 100, 10, 1, vec![funding])?)?;
    assert_eq!(ledger.get_next_nonce(&alice.address()), 2);

    clock.advance_secs(ledger.context().config.mempool.tx_ttl_secs + 1);
    let report = ledger.mempool().remove_expired();
    assert_eq!(report.expired, 1);
    assert!(ledger.mempool().is_empty());
    assert_eq!(ledger.get_next_nonce(&alice.address()), 1);
    Ok(())
}

#[test]
fn test_add_transaction_reports_acceptance() -> TestResult {
    let alice = KeyPair::generate()?;
    let (ledger, _clock) = ledger_with(MempoolConfig::default(), &alice)?;
    let bob = KeyPair::generate()?.address();
    let funding = coinbase_output(&ledger.blocks()[0])?;

    let overspend = signed_transfer(&alice, bob, 2_000_000, 10, 1, vec![funding])?;
    assert!(!ledger.add_transaction(overspend));
    assert!(ledger.add_transaction(signed_transfer(&alice, bob, 100, 10, 1, vec![funding])?));
    assert_eq!(ledger.mempool().len(), 1);
    Ok(())
}

#[test]
fn test_eviction_keeps_newcomers_ancestor_mineable() -> TestResult {
    let owner = KeyPair::generate()?;
    let config = MempoolConfig {
        max_size: 2,
        ..MempoolConfig::default()
    };
    let (ledger, _clock) = ledger_with(config, &owner)?;
    let sink = KeyPair::generate()?.address();
    let miner = KeyPair::generate()?.address();
    let (a, b) = (KeyPair::generate()?, KeyPair::generate()?);
    let funds = fund(&ledger, &[a.address(), a.address(), b.address()])?;

    let a1 = signed_transfer(&a, sink, 100, 1, 1, vec![funds[0]])?;
    let b1 = signed_transfer(&b, sink, 100, 100, 1, vec![funds[2]])?;
    let a2 = signed_transfer(&a, sink, 100, 500, 2, vec![funds[1]])?;
    ledger.submit_transaction(a1.clone())?;
    ledger.submit_transaction(b1.clone())?;
    match ledger.submit_transaction(a2.clone())? {
        Admission::Accepted { evicted, .. } => assert_eq!(evicted, Some(b1.id())),
        other => panic!("unexpected admission {:?}", other),
    }
    assert!(ledger.mempool().contains(&a1.id()));
    assert_eq!(ledger.get_next_nonce(&b.address()), 1);

    mine_pending(&ledger, miner)?;
    assert!(ledger.mempool().is_empty());
    assert_eq!(ledger.get_nonce(&a.address()), 2);
    assert_eq!(ledger.get_balance(&sink), 200);
    Ok(())
}
