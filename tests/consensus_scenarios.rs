//! Integration tests for block ingestion, fork switching and finalization

use std::sync::Arc;

use chaincore::blockchain::{
    Block, BlockRoundData, BlockValidator, Sha256Hash, StructuralValidator, Verdict,
};
use chaincore::config::ConsensusConfig;
use chaincore::consensus::{BlockOutcome, ConsensusManager, TxOutcome};
use chaincore::crypto::{address_from_string, Address, KeyPair};
use chaincore::error::LedgerError;
use chaincore::ledger::{BalanceLedger, Ledger};
use chaincore::persistence::{Database, HeightSource, InMemoryPersistence};
use chaincore::sync::{BlockRequest, ChannelRequester};
use chaincore::transaction::{signed_transfer, Transaction, TransferTx, TxHash, TxStatus};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerEvent {
    Apply(TxHash),
    Revert(TxHash),
}

/// Balance ledger that remembers the order of every call.
#[derive(Default)]
struct RecordingLedger {
    inner: BalanceLedger,
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingLedger {
    fn funded(balances: impl IntoIterator<Item = (Address, u64)>) -> Self {
        Self {
            inner: BalanceLedger::with_balances(balances),
            events: Mutex::new(Vec::new()),
        }
    }

    fn events_for(&self, hash: &TxHash) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| match e {
                LedgerEvent::Apply(h) | LedgerEvent::Revert(h) => h == hash,
            })
            .copied()
            .collect()
    }

    fn applied_order(&self) -> Vec<TxHash> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Apply(h) => Some(*h),
                LedgerEvent::Revert(_) => None,
            })
            .collect()
    }
}

impl Ledger for RecordingLedger {
    fn apply(&self, tx: &Transaction) -> Result<(), LedgerError> {
        self.inner.apply(tx)?;
        self.events.lock().push(LedgerEvent::Apply(tx.hash()));
        Ok(())
    }

    fn revert(&self, tx: &Transaction) -> Result<(), LedgerError> {
        self.inner.revert(tx)?;
        self.events.lock().push(LedgerEvent::Revert(tx.hash()));
        Ok(())
    }
}

/// Structural checks, plus a list of blocks and transactions to report as
/// orphans.
#[derive(Default)]
struct ScriptedValidator {
    orphan_blocks: Vec<Sha256Hash>,
    orphan_txs: Vec<TxHash>,
}

impl BlockValidator for ScriptedValidator {
    fn verify_block(&self, block: &Block) -> Verdict {
        if self.orphan_blocks.contains(&block.hash()) {
            return Verdict::Orphan("unknown round data".to_string());
        }
        StructuralValidator.verify_block(block)
    }

    fn verify_transaction(&self, tx: &Transaction) -> Verdict {
        if self.orphan_txs.contains(&tx.hash()) {
            return Verdict::Orphan("funding transaction unknown".to_string());
        }
        StructuralValidator.verify_transaction(tx)
    }
}

fn manager_with(
    ledger: Arc<dyn Ledger>,
    validator: Arc<dyn BlockValidator>,
    heights: Arc<dyn HeightSource>,
    finality_depth: u64,
) -> Result<(ConsensusManager, UnboundedReceiver<BlockRequest>), Box<dyn std::error::Error>> {
    let (requester, rx) = ChannelRequester::new();
    let manager = ConsensusManager::new(
        ConsensusConfig {
            finality_depth,
            ..ConsensusConfig::default()
        },
        validator,
        ledger,
        heights,
        Arc::new(requester),
    )?;
    Ok((manager, rx))
}

fn manager(
    ledger: Arc<dyn Ledger>,
) -> Result<(ConsensusManager, UnboundedReceiver<BlockRequest>), Box<dyn std::error::Error>> {
    manager_with(
        ledger,
        Arc::new(StructuralValidator),
        Arc::new(InMemoryPersistence::new()),
        6,
    )
}

/// Block with a coinbase for `producer` followed by `txs`.
fn make_block(height: u64, previous_hash: Sha256Hash, producer: &str, txs: Vec<Transaction>) -> Block {
    let producer = address_from_string(producer);
    let mut transactions = vec![Transaction::coinbase(producer, 50, height)];
    transactions.extend(txs);
    Block::new(
        height,
        previous_hash,
        producer,
        BlockRoundData {
            round_index: height,
            packing_index: 1,
            round_start_time: 0,
        },
        transactions,
    )
}

fn drain(rx: &mut UnboundedReceiver<BlockRequest>) -> Vec<BlockRequest> {
    let mut requests = Vec::new();
    while let Ok(request) = rx.try_recv() {
        requests.push(request);
    }
    requests
}

#[test]
fn test_orphans_cascade_once_parent_arrives() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(RecordingLedger::default());
    let (manager, mut rx) = manager(ledger.clone())?;

    let b1 = make_block(1, [0; 32], "p", vec![]);
    let b2 = make_block(2, b1.hash(), "p", vec![]);
    let b3 = make_block(3, b2.hash(), "p", vec![]);

    assert_eq!(
        manager.submit_block(b2.clone(), true, Some("peer-a")),
        BlockOutcome::Orphaned {
            missing_parent: b1.hash(),
            requested: true
        }
    );
    assert_eq!(
        manager.submit_block(b3.clone(), true, Some("peer-a")),
        BlockOutcome::Orphaned {
            missing_parent: b2.hash(),
            requested: false
        }
    );
    assert_eq!(manager.stats().pending_blocks, 2);

    let requests = drain(&mut rx);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].wanted, b1.hash());
    assert_eq!(requests[0].hint_peer.as_deref(), Some("peer-a"));

    assert_eq!(manager.submit_block(b1.clone(), true, None), BlockOutcome::Approved);

    let expected: Vec<TxHash> = [&b1, &b2, &b3]
        .iter()
        .map(|b| b.transactions[0].hash())
        .collect();
    assert_eq!(ledger.applied_order(), expected);
    assert!(manager.pending_buffer().is_empty());
    assert_eq!(manager.get_highest_block().map(|b| b.hash()), Some(b3.hash()));
    assert_eq!(manager.stats().outstanding_requests, 0);
    assert!(drain(&mut rx).is_empty());

    Ok(())
}

#[test]
fn test_interleaved_fork_settles_on_longer_branch() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(RecordingLedger::default());
    let (manager, _rx) = manager(ledger.clone())?;

    let h1 = make_block(1, [0; 32], "genesis", vec![]);
    let a2 = make_block(2, h1.hash(), "alpha", vec![]);
    let a3 = make_block(3, a2.hash(), "alpha", vec![]);
    let b2 = make_block(2, h1.hash(), "beta", vec![]);
    let b3 = make_block(3, b2.hash(), "beta", vec![]);
    let b4 = make_block(4, b3.hash(), "beta", vec![]);

    assert_eq!(manager.submit_block(h1.clone(), true, None), BlockOutcome::Approved);
    assert_eq!(manager.submit_block(a2.clone(), true, None), BlockOutcome::Approved);
    assert_eq!(manager.submit_block(b2.clone(), true, None), BlockOutcome::Contested);
    assert_eq!(manager.submit_block(a3.clone(), true, None), BlockOutcome::Approved);
    assert_eq!(manager.submit_block(b3.clone(), true, None), BlockOutcome::Contested);
    assert!(manager.is_bifurcating(3));
    assert_eq!(manager.stats().approved_height, Some(1));

    assert_eq!(manager.submit_block(b4.clone(), true, None), BlockOutcome::Approved);

    let approved: Vec<Sha256Hash> = manager.approved_chain().iter().map(|d| d.hash).collect();
    assert_eq!(approved, vec![h1.hash(), b2.hash(), b3.hash(), b4.hash()]);
    assert_eq!(manager.get_highest_block().map(|b| b.hash()), Some(b4.hash()));
    assert_eq!(manager.best_block().map(|b| b.hash()), Some(b4.hash()));
    assert_eq!(ledger.inner.balance(&address_from_string("alpha")), 0);
    assert_eq!(ledger.inner.balance(&address_from_string("beta")), 150);
    assert_eq!(ledger.inner.balance(&address_from_string("genesis")), 50);
    assert_eq!(ledger.inner.applied_count(), 4);

    let losing = manager.get_block(&a3.hash()).ok_or("losing block kept")?;
    assert!(losing.transactions.iter().all(|tx| tx.status == TxStatus::Cached));

    Ok(())
}

#[test]
fn test_branch_switch_reverts_shared_transfer_once() -> Result<(), Box<dyn std::error::Error>> {
    let alice = KeyPair::generate()?;
    let bob = address_from_string("bob");
    let ledger = Arc::new(RecordingLedger::funded([(alice.address(), 100)]));
    let (manager, _rx) = manager(ledger.clone())?;

    let pay = signed_transfer(&alice, bob, 40, 2, 0)?;
    let h1 = make_block(1, [0; 32], "genesis", vec![]);
    let a2 = make_block(2, h1.hash(), "alpha", vec![pay.clone()]);
    let a3 = make_block(3, a2.hash(), "alpha", vec![]);
    let b2 = make_block(2, h1.hash(), "beta", vec![pay.clone()]);
    let b3 = make_block(3, b2.hash(), "beta", vec![]);
    let b4 = make_block(4, b3.hash(), "beta", vec![]);

    for block in [h1, a2.clone(), a3, b2.clone()] {
        manager.submit_block(block, true, None);
    }
    assert_eq!(ledger.inner.balance(&bob), 40);
    assert_eq!(ledger.events_for(&pay.hash()), vec![LedgerEvent::Apply(pay.hash())]);

    assert_eq!(manager.submit_block(b3, true, None), BlockOutcome::Contested);
    assert_eq!(ledger.inner.balance(&bob), 0);
    assert_eq!(ledger.inner.balance(&alice.address()), 100);
    assert!(manager.tx_caches().received.contains(&pay.hash()));

    assert_eq!(manager.submit_block(b4, true, None), BlockOutcome::Approved);
    assert_eq!(
        ledger.events_for(&pay.hash()),
        vec![
            LedgerEvent::Apply(pay.hash()),
            LedgerEvent::Revert(pay.hash()),
            LedgerEvent::Apply(pay.hash()),
        ]
    );
    assert_eq!(ledger.inner.balance(&bob), 40);
    assert_eq!(ledger.inner.balance(&alice.address()), 58);
    assert!(!manager.tx_caches().received.contains(&pay.hash()));

    let stored = manager.get_block(&b2.hash()).ok_or("winning block stored")?;
    assert_eq!(stored.transactions[1].status, TxStatus::Agreed);
    let dropped = manager.get_block(&a2.hash()).ok_or("losing block stored")?;
    assert_eq!(dropped.transactions[1].status, TxStatus::Cached);

    Ok(())
}

#[test]
fn test_stale_boundary() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _rx) = manager(Arc::new(BalanceLedger::new()))?;
    manager.set_stored_height(5);

    let at_stored = make_block(5, [1; 32], "p", vec![]);
    assert_eq!(
        manager.submit_block(at_stored, true, None),
        BlockOutcome::Stale {
            height: 5,
            stored_height: 5
        }
    );

    let next = make_block(6, [1; 32], "p", vec![]);
    assert_eq!(manager.submit_block(next.clone(), true, None), BlockOutcome::Approved);
    assert!(manager.confirmed_store().contains(&next.hash()));

    Ok(())
}

#[test]
fn test_resubmission_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(BalanceLedger::new());
    let (manager, mut rx) = manager(ledger.clone())?;

    let b1 = make_block(1, [0; 32], "p", vec![]);
    let b2 = make_block(2, b1.hash(), "p", vec![]);
    manager.submit_block(b1.clone(), true, None);
    manager.submit_block(b2.clone(), true, None);
    let before = manager.stats();

    assert_eq!(manager.submit_block(b1, true, None), BlockOutcome::Duplicate);
    assert_eq!(manager.submit_block(b2, false, None), BlockOutcome::Duplicate);
    assert_eq!(manager.stats(), before);
    assert_eq!(ledger.applied_count(), 2);
    assert!(drain(&mut rx).is_empty());

    Ok(())
}

#[test]
fn test_mid_block_failure_rolls_back_prefix() -> Result<(), Box<dyn std::error::Error>> {
    let alice = KeyPair::generate()?;
    let broke = KeyPair::generate()?;
    let carol = address_from_string("carol");
    let ledger = Arc::new(BalanceLedger::with_balances([(alice.address(), 100)]));
    let (manager, _rx) = manager(ledger.clone())?;

    let b1 = make_block(1, [0; 32], "genesis", vec![]);
    manager.submit_block(b1.clone(), true, None);

    let txs = vec![
        signed_transfer(&alice, carol, 10, 0, 0)?,
        signed_transfer(&broke, carol, 10, 0, 0)?,
        signed_transfer(&alice, carol, 5, 0, 1)?,
        signed_transfer(&alice, carol, 5, 0, 2)?,
    ];
    let b2 = make_block(2, b1.hash(), "producer", txs.clone());
    assert_eq!(b2.transactions.len(), 5);

    let outcome = manager.submit_block(b2.clone(), true, None);
    match outcome {
        BlockOutcome::ApprovalFailed(reason) => assert!(reason.contains("index 2")),
        other => panic!("expected approval failure, got {:?}", other),
    }

    assert_eq!(ledger.balance(&address_from_string("producer")), 0);
    assert_eq!(ledger.balance(&alice.address()), 100);
    assert_eq!(ledger.balance(&carol), 0);
    assert!(!ledger.is_applied(&txs[0].hash()));
    assert!(!manager.confirmed_store().contains(&b2.hash()));
    assert!(manager.pending_buffer().contains(&b2.hash()));
    assert!(!manager.tx_caches().confirming.contains(&txs[0].hash()));
    assert_eq!(manager.get_highest_block().map(|b| b.hash()), Some(b1.hash()));

    // Still failing on redelivery, and still parked.
    assert!(matches!(
        manager.submit_block(b2.clone(), true, None),
        BlockOutcome::ApprovalFailed(_)
    ));
    assert_eq!(manager.stats().pending_blocks, 1);

    Ok(())
}

#[test]
fn test_validator_orphan_verdict_buffers_block() -> Result<(), Box<dyn std::error::Error>> {
    let b1 = make_block(1, [0; 32], "p", vec![]);
    let validator = ScriptedValidator {
        orphan_blocks: vec![b1.hash()],
        orphan_txs: vec![],
    };
    let (manager, mut rx) = manager_with(
        Arc::new(BalanceLedger::new()),
        Arc::new(validator),
        Arc::new(InMemoryPersistence::new()),
        6,
    )?;

    assert!(matches!(
        manager.submit_block(b1.clone(), true, None),
        BlockOutcome::Orphaned { requested: false, .. }
    ));
    assert!(manager.pending_buffer().contains(&b1.hash()));
    assert!(!manager.confirmed_store().contains(&b1.hash()));
    assert!(drain(&mut rx).is_empty());

    // Trusted delivery skips the validator.
    assert_eq!(manager.submit_block(b1.clone(), false, None), BlockOutcome::Approved);
    assert!(!manager.pending_buffer().contains(&b1.hash()));

    Ok(())
}

#[test]
fn test_invalid_block_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(BalanceLedger::new());
    let (manager, _rx) = manager(ledger.clone())?;

    let mut bad = make_block(1, [0; 32], "p", vec![]);
    bad.header.merkle_root = [9; 32];
    assert!(matches!(
        manager.submit_block(bad.clone(), true, None),
        BlockOutcome::Invalid(_)
    ));
    assert!(manager.get_block(&bad.hash()).is_none());
    assert_eq!(ledger.applied_count(), 0);

    Ok(())
}

#[test]
fn test_parent_requests_are_deduplicated() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, mut rx) = manager(Arc::new(BalanceLedger::new()))?;

    let b1 = make_block(1, [0; 32], "p", vec![]);
    let anchor = make_block(2, b1.hash(), "p", vec![]);
    manager.submit_block(b1, true, None);
    manager.submit_block(anchor, true, None);

    let missing = [42; 32];
    let x = make_block(8, missing, "x", vec![]);
    let y = make_block(8, missing, "y", vec![]);
    assert!(matches!(
        manager.submit_block(x, true, Some("peer-x")),
        BlockOutcome::Orphaned { requested: true, .. }
    ));
    assert!(matches!(
        manager.submit_block(y, true, Some("peer-y")),
        BlockOutcome::Orphaned { requested: false, .. }
    ));

    let requests = drain(&mut rx);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].wanted, missing);
    assert_eq!(manager.stats().outstanding_requests, 1);

    manager.clear();
    assert_eq!(manager.stats().outstanding_requests, 0);

    Ok(())
}

#[test]
fn test_receive_transaction_routing() -> Result<(), Box<dyn std::error::Error>> {
    let alice = KeyPair::generate()?;
    let funded_later = signed_transfer(&alice, address_from_string("bob"), 3, 0, 7)?;
    let validator = ScriptedValidator {
        orphan_blocks: vec![],
        orphan_txs: vec![funded_later.hash()],
    };
    let (manager, _rx) = manager_with(
        Arc::new(BalanceLedger::new()),
        Arc::new(validator),
        Arc::new(InMemoryPersistence::new()),
        6,
    )?;

    let good = signed_transfer(&alice, address_from_string("bob"), 5, 1, 0)?;
    assert_eq!(manager.receive_transaction(good.clone()), TxOutcome::Staged);
    assert_eq!(manager.receive_transaction(good), TxOutcome::Known);

    let unsigned = Transaction::transfer(TransferTx::new(
        alice.address(),
        address_from_string("bob"),
        5,
        1,
        1,
    ));
    assert!(matches!(
        manager.receive_transaction(unsigned),
        TxOutcome::Invalid(_)
    ));

    assert!(matches!(
        manager.receive_transaction(funded_later.clone()),
        TxOutcome::Orphaned(_)
    ));
    assert!(manager.tx_caches().orphan.contains(&funded_later.hash()));

    let stats = manager.stats();
    assert_eq!(stats.received_txs, 1);
    assert_eq!(stats.orphan_txs, 1);

    Ok(())
}

#[test]
fn test_approval_purges_staged_transactions() -> Result<(), Box<dyn std::error::Error>> {
    let alice = KeyPair::generate()?;
    let ledger = Arc::new(BalanceLedger::with_balances([(alice.address(), 50)]));
    let (manager, _rx) = manager(ledger)?;

    let pay = signed_transfer(&alice, address_from_string("bob"), 5, 1, 0)?;
    assert_eq!(manager.receive_transaction(pay.clone()), TxOutcome::Staged);

    let b1 = make_block(1, [0; 32], "p", vec![pay.clone()]);
    assert_eq!(manager.submit_block(b1, true, None), BlockOutcome::Approved);
    assert!(!manager.tx_caches().received.contains(&pay.hash()));
    let agreed = manager
        .tx_caches()
        .confirming
        .get(&pay.hash())
        .ok_or("transfer confirming")?;
    assert_eq!(agreed.status, TxStatus::Agreed);
    assert_eq!(agreed.block_height, Some(1));
    assert_eq!(agreed.index, Some(1));
    assert_eq!(manager.receive_transaction(pay), TxOutcome::Known);

    Ok(())
}

#[test]
fn test_concurrent_submission_keeps_ledger_consistent() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(BalanceLedger::new());
    let (manager, _rx) = manager(ledger.clone())?;
    let manager = Arc::new(manager);

    let root = make_block(1, [0; 32], "root", vec![]);
    manager.submit_block(root.clone(), true, None);

    let producers: Vec<String> = (0..8).map(|i| format!("producer-{}", i)).collect();
    let branches: Vec<(Block, Block)> = producers
        .iter()
        .map(|name| {
            let tip = make_block(2, root.hash(), name, vec![]);
            let next = make_block(3, tip.hash(), name, vec![]);
            (tip, next)
        })
        .collect();

    let handles: Vec<_> = branches
        .iter()
        .cloned()
        .map(|(tip, next)| {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                manager.submit_block(next, true, None);
                manager.submit_block(tip, true, None);
            })
        })
        .collect();
    for handle in handles {
        handle.join().map_err(|_| "submitter panicked")?;
    }

    // Eight branches of equal height: nothing above the root may be applied.
    assert!(manager.is_bifurcating(3));
    assert_eq!(manager.approved_chain().len(), 1);
    assert_eq!(ledger.applied_count(), 1);

    let (_, winner_tip) = &branches[3];
    let decider = make_block(4, winner_tip.hash(), "decider", vec![]);
    assert_eq!(manager.submit_block(decider.clone(), true, None), BlockOutcome::Approved);

    let approved = manager.approved_chain();
    assert_eq!(approved.len(), 4);
    assert_eq!(ledger.applied_count(), 4);
    for digest in &approved {
        let block = manager.get_block(&digest.hash).ok_or("approved block stored")?;
        assert!(block
            .transactions
            .iter()
            .all(|tx| ledger.is_applied(&tx.hash()) && tx.status == TxStatus::Agreed));
    }
    for (i, name) in producers.iter().enumerate() {
        let expected = if i == 3 { 100 } else { 0 };
        assert_eq!(ledger.balance(&address_from_string(name)), expected);
    }

    Ok(())
}

#[test]
fn test_finalized_height_survives_restart() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("chain.db");
    let path = path.to_str().ok_or("utf-8 path")?;

    let mut chain = Vec::new();
    let mut prev = [0; 32];
    for height in 1..=6 {
        let block = make_block(height, prev, "p", vec![]);
        prev = block.hash();
        chain.push(block);
    }

    {
        let db = Arc::new(Database::open(path)?);
        let (manager, _rx) = manager_with(
            Arc::new(BalanceLedger::new()),
            Arc::new(StructuralValidator),
            db.clone(),
            3,
        )?;
        for block in &chain {
            manager.submit_block(block.clone(), true, None);
        }

        let finalized = manager.take_finalized();
        assert_eq!(finalized.len(), 3);
        assert!(finalized
            .iter()
            .flat_map(|b| &b.transactions)
            .all(|tx| tx.status == TxStatus::Confirmed));
        let last = finalized.last().ok_or("finalized block")?;
        db.record_height(last.height(), last.hash())?;
        assert_eq!(manager.stored_height(), 3);
        assert_eq!(manager.stats().confirmed_blocks, 3);
    }

    let db = Arc::new(Database::open(path)?);
    let (manager, _rx) = manager_with(
        Arc::new(BalanceLedger::new()),
        Arc::new(StructuralValidator),
        db,
        3,
    )?;
    assert!(matches!(
        manager.submit_block(chain[2].clone(), true, None),
        BlockOutcome::Stale { stored_height: 3, .. }
    ));
    assert_eq!(manager.stored_height(), 3);

    // Only a child of the persisted hash may start the new tracked chain.
    let impostor = make_block(4, [7; 32], "x", vec![]);
    assert!(matches!(
        manager.submit_block(impostor, true, None),
        BlockOutcome::Invalid(_)
    ));
    assert_eq!(manager.stats().pending_blocks, 0);
    assert_eq!(
        manager.submit_block(chain[3].clone(), true, None),
        BlockOutcome::Approved
    );

    Ok(())
}


#[test]
fn test_siblings_share_first_parent_above_unknown_stored_hash() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, mut rx) = manager_with(
        Arc::new(BalanceLedger::new()),
        Arc::new(StructuralValidator),
        Arc::new(InMemoryPersistence::at_height(10)),
        6,
    )?;

    let x = make_block(11, [1; 32], "x", vec![]);
    let y = make_block(11, [1; 32], "y", vec![]);
    let z = make_block(11, [99; 32], "z", vec![]);

    assert_eq!(manager.submit_block(x.clone(), true, Some("peer")), BlockOutcome::Approved);
    assert_eq!(manager.submit_block(y.clone(), true, Some("peer")), BlockOutcome::Contested);
    assert!(manager.is_bifurcating(11));

    // z's parent would sit at the stored height and can never be delivered.
    assert!(matches!(
        manager.submit_block(z.clone(), true, Some("peer")),
        BlockOutcome::Invalid(_)
    ));
    assert!(manager.get_block(&z.hash()).is_none());
    assert_eq!(manager.stats().outstanding_requests, 0);
    assert!(drain(&mut rx).is_empty());

    // Once nothing is tracked above the stored height, any parent may start over.
    assert!(manager.remove_block(&x.hash()));
    assert!(manager.remove_block(&y.hash()));
    assert_eq!(manager.submit_block(z, true, None), BlockOutcome::Approved);

    Ok(())
}

#[test]
fn test_finalization_passes_abandoned_fork() -> Result<(), Box<dyn std::error::Error>> {
    let heights = Arc::new(InMemoryPersistence::new());
    let ledger = Arc::new(BalanceLedger::new());
    let (manager, _rx) = manager_with(ledger.clone(), Arc::new(StructuralValidator), heights.clone(), 3)?;

    let h1 = make_block(1, [0; 32], "genesis", vec![]);
    let a2 = make_block(2, h1.hash(), "alpha", vec![]);
    manager.submit_block(h1.clone(), true, None);
    manager.submit_block(a2.clone(), true, None);

    let mut prev = h1.hash();
    let mut main = vec![h1];
    for height in 2..=12 {
        let block = make_block(height, prev, "beta", vec![]);
        prev = block.hash();
        main.push(block.clone());
        manager.submit_block(block, true, None);
    }

    let finalized = manager.take_finalized();
    let hashes: Vec<Sha256Hash> = finalized.iter().map(Block::hash).collect();
    let expected: Vec<Sha256Hash> = main[..9].iter().map(Block::hash).collect();
    assert_eq!(hashes, expected);
    let last = finalized.last().ok_or("finalized block")?;
    heights.record_height(last.height(), last.hash())?;

    assert_eq!(manager.stored_height(), 9);
    assert!(manager.get_block(&a2.hash()).is_none());
    assert_eq!(ledger.balance(&address_from_string("alpha")), 0);
    let stats = manager.stats();
    assert_eq!(stats.branches, 1);
    assert_eq!(stats.confirmed_blocks, 3);
    assert_eq!(stats.approved_height, Some(12));

    // The abandoned branch cannot come back below the new stored height.
    let a3 = make_block(3, a2.hash(), "alpha", vec![]);
    assert!(matches!(
        manager.submit_block(a3, true, None),
        BlockOutcome::Stale { stored_height: 9, .. }
    ));

    Ok(())
}
