//! Fork-aware block ingestion.
//!
//! [`ConsensusManager`] owns every block that is not yet final. Blocks are
//! attached to a tracked branch (or buffered as orphans), and the ledger is
//! kept in step with the unique longest branch: when it changes, blocks on the
//! losing side are rolled back and blocks on the winning side approved, in
//! height order. While two branches tie, the contested blocks stay unapplied.
//!
//! All mutations run under one ingest lock. Queries only take the short-lived
//! locks of the individual stores, including the approved path, so they never
//! wait behind a submission.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::bifurcation::BranchTracker;
use crate::block_store::{ConfirmedBlockStore, PendingBlockBuffer, Watermark};
use crate::blockchain::{
    short_hash, Block, BlockHeader, BlockValidator, HeaderDigest, Sha256Hash, Verdict,
};
use crate::cache::TxStagingCaches;
use crate::config::ConsensusConfig;
use crate::error::ChainError;
use crate::ledger::Ledger;
use crate::persistence::HeightSource;
use crate::sync::{BlockRequest, BlockRequester, ParentRequests};
use crate::transaction::{Transaction, TxHash, TxStatus};

/// What happened to a submitted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Header and body disagree; nothing was stored.
    Malformed(String),
    /// At or below the persisted height.
    Stale { height: u64, stored_height: u64 },
    /// Already attached to a tracked branch.
    Duplicate,
    /// Rejected by the validator.
    Invalid(String),
    /// Buffered until its parent shows up.
    Orphaned {
        missing_parent: Sha256Hash,
        /// Whether this submission sent a request for the parent.
        requested: bool,
    },
    /// A transaction (of this block or an ancestor) could not be applied; the
    /// block went back to the pending buffer.
    ApprovalFailed(String),
    /// On the unique longest branch with its effects applied.
    Approved,
    /// Attached, but the longest height is tied so the contested blocks
    /// stay unapplied.
    Contested,
    /// Attached to a branch that is currently not the longest.
    Attached,
}

impl BlockOutcome {
    /// True if the block now sits on a tracked branch.
    pub fn is_attached(&self) -> bool {
        matches!(
            self,
            BlockOutcome::Approved | BlockOutcome::Contested | BlockOutcome::Attached
        )
    }
}

/// What happened to a loose transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Staged,
    Orphaned(String),
    Invalid(String),
    /// Already known, either staged or applied in a tracked block.
    Known,
}

/// Snapshot of the manager's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConsensusStats {
    pub stored_height: u64,
    pub best_height: Option<u64>,
    pub approved_height: Option<u64>,
    pub branches: usize,
    pub confirmed_blocks: usize,
    pub pending_blocks: usize,
    pub confirming_txs: usize,
    pub received_txs: usize,
    pub orphan_txs: usize,
    pub outstanding_requests: usize,
}

#[derive(Default)]
struct IngestState {
    /// Hash at the stored height, once known.
    anchor: Option<(u64, Sha256Hash)>,
}

struct Submission {
    block: Block,
    verify: bool,
    source_peer: Option<String>,
}

pub struct ConsensusManager {
    config: ConsensusConfig,
    validator: Arc<dyn BlockValidator>,
    ledger: Arc<dyn Ledger>,
    heights: Arc<dyn HeightSource>,
    requester: Arc<dyn BlockRequester>,
    tracker: RwLock<BranchTracker>,
    confirmed: ConfirmedBlockStore,
    pending: PendingBlockBuffer,
    txs: TxStagingCaches,
    best: RwLock<Option<HeaderDigest>>,
    /// Approved blocks, lowest first. Always a contiguous path on one branch.
    /// Only written under the ingest lock.
    applied: RwLock<Vec<HeaderDigest>>,
    requests: Mutex<ParentRequests>,
    stored_height: AtomicU64,
    height_seeded: AtomicBool,
    ingest: Mutex<IngestState>,
}

impl ConsensusManager {
    pub fn new(
        config: ConsensusConfig,
        validator: Arc<dyn BlockValidator>,
        ledger: Arc<dyn Ledger>,
        heights: Arc<dyn HeightSource>,
        requester: Arc<dyn BlockRequester>,
    ) -> Result<Self, ChainError> {
        config.validate()?;
        Ok(Self {
            pending: PendingBlockBuffer::new(config.pending_block_capacity),
            txs: TxStagingCaches::new(config.received_tx_capacity, config.orphan_tx_capacity),
            config,
            validator,
            ledger,
            heights,
            requester,
            tracker: RwLock::new(BranchTracker::new()),
            confirmed: ConfirmedBlockStore::new(),
            best: RwLock::new(None),
            applied: RwLock::new(Vec::new()),
            requests: Mutex::new(ParentRequests::new()),
            stored_height: AtomicU64::new(0),
            height_seeded: AtomicBool::new(false),
            ingest: Mutex::new(IngestState::default()),
        })
    }

    /// Ingests one block and any buffered descendants it releases.
    ///
    /// Returns the outcome for `block` itself; released descendants are
    /// processed in the same call and only logged.
    pub fn submit_block(
        &self,
        block: Block,
        verify: bool,
        source_peer: Option<&str>,
    ) -> BlockOutcome {
        let mut state = self.ingest.lock();
        let mut queue = VecDeque::from([Submission {
            block,
            verify,
            source_peer: source_peer.map(str::to_owned),
        }]);

        let mut first = None;
        while let Some(next) = queue.pop_front() {
            let height = next.block.height();
            let hash = next.block.hash();
            let outcome = self.ingest_one(&mut state, next, &mut queue);
            debug!(height, hash = %short_hash(&hash), ?outcome, "block processed");
            if first.is_none() {
                first = Some(outcome);
            }
        }
        first.unwrap_or(BlockOutcome::Duplicate)
    }

    fn ingest_one(
        &self,
        state: &mut IngestState,
        submission: Submission,
        queue: &mut VecDeque<Submission>,
    ) -> BlockOutcome {
        let Submission {
            mut block,
            verify,
            source_peer,
        } = submission;

        if block.transactions.is_empty()
            || block.header.tx_count as usize != block.transactions.len()
        {
            warn!(
                height = block.height(),
                declared = block.header.tx_count,
                actual = block.transactions.len(),
                "dropping malformed block"
            );
            return BlockOutcome::Malformed(format!(
                "header declares {} transactions, body has {}",
                block.header.tx_count,
                block.transactions.len()
            ));
        }

        let stored_height = self.seed_stored_height(state);
        let height = block.height();
        let hash = block.hash();
        if height <= stored_height {
            info!(
                height,
                stored_height,
                hash = %short_hash(&hash),
                "discarding block at or below stored height"
            );
            return BlockOutcome::Stale {
                height,
                stored_height,
            };
        }
        if self.confirmed.contains(&hash) {
            return BlockOutcome::Duplicate;
        }
        self.requests.lock().resolve(&hash);

        // Staging metadata is local; never trust what arrived on the wire.
        for tx in &mut block.transactions {
            tx.status = TxStatus::Cached;
            tx.block_height = None;
            tx.index = None;
        }

        if verify {
            match self.validator.verify_block(&block) {
                Verdict::Valid => {}
                Verdict::Invalid(reason) => {
                    debug!(height, hash = %short_hash(&hash), %reason, "block failed verification");
                    self.pending.remove(&hash);
                    return BlockOutcome::Invalid(reason);
                }
                Verdict::Orphan(reason) => {
                    debug!(height, hash = %short_hash(&hash), %reason, "block depends on unknown data");
                    let missing_parent = block.previous_hash();
                    self.buffer_pending(block);
                    return BlockOutcome::Orphaned {
                        missing_parent,
                        requested: false,
                    };
                }
            }
        }

        if let Some(parent) = self.confirmed.header(&block.previous_hash()) {
            if parent.height + 1 != height {
                debug!(height, parent_height = parent.height, "block height does not follow its parent");
                self.pending.remove(&hash);
                return BlockOutcome::Invalid(format!(
                    "height {} does not follow parent at height {}",
                    height, parent.height
                ));
            }
        }

        let watermark = self.watermark(state, stored_height);
        if !self.confirmed.cache_block(&block, watermark) {
            if height == stored_height + 1 {
                // The parent would sit at the stored height; nobody can deliver it.
                debug!(height, parent = %short_hash(&block.previous_hash()), "block does not extend the stored chain");
                self.pending.remove(&hash);
                return BlockOutcome::Invalid(format!(
                    "parent {} is not the block at stored height {}",
                    short_hash(&block.previous_hash()),
                    stored_height
                ));
            }
            return self.buffer_orphan(block, source_peer);
        }
        self.pending.remove(&hash);

        let improved = self.tracker.write().add_header(&block.header);
        if improved {
            *self.best.write() = Some(block.header.digest());
            debug!(height, hash = %short_hash(&hash), "new best block");
        }

        let failure = self.reconcile();
        let outcome = match failure {
            Some((failed, reason)) if failed == hash || !self.confirmed.contains(&hash) => {
                BlockOutcome::ApprovalFailed(reason)
            }
            _ if self.is_approved(&hash) => BlockOutcome::Approved,
            _ if self.tracker.read().unique_longest().is_none() => BlockOutcome::Contested,
            _ => BlockOutcome::Attached,
        };

        if self.confirmed.contains(&hash) {
            let children = self.pending.take_children(&hash);
            if !children.is_empty() {
                debug!(
                    count = children.len(),
                    parent = %short_hash(&hash),
                    "releasing buffered children"
                );
            }
            queue.extend(children.into_iter().map(|block| Submission {
                block,
                verify: true,
                source_peer: None,
            }));
        }
        outcome
    }

    fn buffer_orphan(&self, block: Block, source_peer: Option<String>) -> BlockOutcome {
        let height = block.height();
        let missing_parent = block.previous_hash();
        self.buffer_pending(block);

        let parent_known =
            self.pending.contains(&missing_parent) || self.confirmed.contains(&missing_parent);
        let requested = !parent_known && self.requests.lock().begin(missing_parent);
        if requested {
            info!(
                height,
                parent = %short_hash(&missing_parent),
                peer = source_peer.as_deref().unwrap_or("-"),
                "requesting missing parent"
            );
            self.requester.request_block(BlockRequest {
                wanted: missing_parent,
                hint_peer: source_peer,
            });
        }
        BlockOutcome::Orphaned {
            missing_parent,
            requested,
        }
    }

    fn buffer_pending(&self, block: Block) {
        if let Some(evicted) = self.pending.cache_block(block) {
            warn!(
                height = evicted.height(),
                hash = %short_hash(&evicted.hash()),
                "pending buffer full, dropped oldest block"
            );
        }
    }

    fn seed_stored_height(&self, state: &mut IngestState) -> u64 {
        if !self.height_seeded.load(Ordering::Acquire)
            && self.stored_height.load(Ordering::Acquire) == 0
        {
            match self.heights.local_saved_height() {
                Ok(height) => {
                    self.stored_height.store(height, Ordering::Release);
                    match self.heights.local_saved_hash() {
                        Ok(Some(hash)) => state.anchor = Some((height, hash)),
                        Ok(None) => {}
                        Err(e) => warn!("Failed to read stored hash: {}", e),
                    }
                    debug!(height, "seeded stored height");
                }
                Err(e) => warn!("Failed to read stored height: {}. Assuming 0.", e),
            }
            self.height_seeded.store(true, Ordering::Release);
        }
        self.stored_height.load(Ordering::Acquire)
    }

    /// Where a block without a confirmed parent may attach. When the stored
    /// hash is unknown, the parent of the tracked blocks at `stored_height + 1`
    /// stands in for it, so only siblings of the first such block attach.
    fn watermark(&self, state: &IngestState, stored_height: u64) -> Watermark {
        let known = state
            .anchor
            .filter(|(height, _)| *height == stored_height)
            .map(|(_, hash)| hash);
        let hash = known.or_else(|| {
            let roots = self.tracker.read().all_hash_list(stored_height + 1);
            roots
                .iter()
                .find_map(|root| self.confirmed.header(root))
                .map(|header| header.previous_hash)
        });
        Watermark {
            height: stored_height,
            hash,
        }
    }

    /// Moves the ledger onto the unique longest branch, or backs it off a
    /// contested height. Returns the first approval failure, if any.
    /// Callers hold the ingest lock.
    fn reconcile(&self) -> Option<(Sha256Hash, String)> {
        let mut failure = None;
        loop {
            let target = {
                let tracker = self.tracker.read();
                tracker.unique_longest().map(|c| c.digests().to_vec())
            };
            let Some(branch) = target else {
                self.rollback_contested();
                return failure;
            };

            while let Some(last) = self.applied_tip() {
                if branch.iter().any(|d| d.hash == last.hash) {
                    break;
                }
                self.rollback_block();
            }

            let start = match self.applied_tip() {
                Some(last) => branch
                    .iter()
                    .position(|d| d.hash == last.hash)
                    .map_or(0, |p| p + 1),
                None => 0,
            };

            let mut failed = None;
            for digest in &branch[start..] {
                if let Err(reason) = self.approve_block(digest) {
                    failed = Some((digest.hash, reason));
                    break;
                }
                self.applied.write().push(*digest);
            }

            match failed {
                Some((hash, reason)) => {
                    self.quarantine(&hash);
                    if failure.is_none() {
                        failure = Some((hash, reason));
                    }
                }
                None => return failure,
            }
        }
    }

    /// Applies every still-cached transaction of a confirmed block, in order.
    /// On failure the transactions already applied are reverted.
    fn approve_block(&self, digest: &HeaderDigest) -> Result<(), String> {
        let mut block = self
            .confirmed
            .get(&digest.hash)
            .ok_or_else(|| format!("block {} missing from store", short_hash(&digest.hash)))?;
        let height = block.height();

        for i in 0..block.transactions.len() {
            let (done, rest) = block.transactions.split_at_mut(i);
            let tx = &mut rest[0];
            tx.block_height = Some(height);
            tx.index = Some(i as u32);
            if tx.status != TxStatus::Cached {
                continue;
            }

            if let Err(reason) = self.apply_transaction(tx) {
                let tx_hash = tx.hash();
                self.revert_transactions(done);
                warn!(
                    height,
                    hash = %short_hash(&digest.hash),
                    index = i,
                    tx = %short_hash(&tx_hash),
                    %reason,
                    "block approval failed"
                );
                return Err(format!(
                    "transaction {} at index {}: {}",
                    hex::encode(tx_hash),
                    i,
                    reason
                ));
            }
            tx.status = TxStatus::Agreed;
            self.txs.confirming.put(tx.hash(), tx.clone());
        }

        self.txs.purge_staged(&block.tx_hashes());
        self.confirmed.replace(block);
        info!(height, hash = %short_hash(&digest.hash), "approved block");
        Ok(())
    }

    fn apply_transaction(&self, tx: &Transaction) -> Result<(), String> {
        let tx_hash = tx.hash();
        if self.txs.confirming.contains(&tx_hash) {
            return Err("already agreed in another block".to_string());
        }
        match self.validator.verify_transaction(tx) {
            Verdict::Valid => self.ledger.apply(tx).map_err(|e| e.to_string()),
            Verdict::Orphan(reason) | Verdict::Invalid(reason) => Err(reason),
        }
    }

    /// Reverts agreed transactions in reverse order and returns their hashes.
    fn revert_transactions(&self, txs: &mut [Transaction]) -> Vec<TxHash> {
        let mut reverted = Vec::new();
        for tx in txs.iter_mut().rev() {
            if tx.status != TxStatus::Agreed {
                continue;
            }
            let tx_hash = tx.hash();
            if let Err(e) = self.ledger.revert(tx) {
                error!(tx = %short_hash(&tx_hash), "Failed to revert transaction: {}", e);
            }
            tx.status = TxStatus::Cached;
            reverted.push(tx_hash);
        }
        self.txs.confirming.remove_many(&reverted);
        reverted
    }

    /// Reverts the highest approved block. Its transfers go back to the
    /// mempool.
    fn rollback_block(&self) {
        let Some(digest) = self.applied.write().pop() else {
            return;
        };
        let Some(mut block) = self.confirmed.get(&digest.hash) else {
            warn!(height = digest.height, "approved block missing during rollback");
            return;
        };

        self.revert_transactions(&mut block.transactions);
        for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
            let mut staged = tx.clone();
            staged.block_height = None;
            staged.index = None;
            self.txs.received.put(staged.hash(), staged);
        }
        self.confirmed.replace(block);
        info!(height = digest.height, hash = %short_hash(&digest.hash), "rolled back block");
    }

    /// Backs off approved blocks while their heights are contested.
    fn rollback_contested(&self) {
        loop {
            let Some(last) = self.applied_tip() else {
                return;
            };
            let keep = {
                let tracker = self.tracker.read();
                tracker.contains(&last.hash) && !tracker.processing(last.height)
            };
            if keep {
                return;
            }
            self.rollback_block();
        }
    }

    fn applied_tip(&self) -> Option<HeaderDigest> {
        self.applied.read().last().copied()
    }

    /// Pulls a block whose approval failed, with everything built on it, out
    /// of the branches and back into the pending buffer.
    fn quarantine(&self, hash: &Sha256Hash) {
        let removed = self.tracker.write().remove_hash(hash);
        for removed_hash in &removed {
            if let Some(block) = self.confirmed.remove(removed_hash) {
                self.buffer_pending(block);
            }
        }
        self.refresh_best();
        debug!(hash = %short_hash(hash), removed = removed.len(), "quarantined block");
    }

    fn refresh_best(&self) {
        let tip = {
            let tracker = self.tracker.read();
            tracker.longest_chain().and_then(|c| c.tip().copied())
        };
        *self.best.write() = tip;
    }

    /// Validates a loose transaction and stages it in the mempool or the
    /// orphan pool.
    pub fn receive_transaction(&self, mut tx: Transaction) -> TxOutcome {
        let _state = self.ingest.lock();
        let tx_hash = tx.hash();
        if self.txs.confirming.contains(&tx_hash) || self.txs.received.contains(&tx_hash) {
            return TxOutcome::Known;
        }

        tx.status = TxStatus::Cached;
        tx.block_height = None;
        tx.index = None;
        match self.validator.verify_transaction(&tx) {
            Verdict::Valid => {
                self.txs.orphan.remove(&tx_hash);
                self.txs.received.put(tx_hash, tx);
                TxOutcome::Staged
            }
            Verdict::Orphan(reason) => {
                debug!(tx = %short_hash(&tx_hash), %reason, "orphan transaction");
                self.txs.orphan.put(tx_hash, tx);
                TxOutcome::Orphaned(reason)
            }
            Verdict::Invalid(reason) => {
                debug!(tx = %short_hash(&tx_hash), %reason, "rejected transaction");
                TxOutcome::Invalid(reason)
            }
        }
    }

    /// Hands out approved blocks that are `finality_depth` below the longest
    /// tip and uncontested, lowest first, and forgets everything they settle.
    ///
    /// Branches whose tip trails the longest tip by `finality_depth` or more
    /// are dropped first, so a dead fork cannot hold finalization back.
    ///
    /// The caller persists the returned blocks; the stored height is advanced
    /// here.
    pub fn take_finalized(&self) -> Vec<Block> {
        let mut state = self.ingest.lock();
        self.drop_stale_branches();

        let (tip_height, settled) = {
            let tracker = self.tracker.read();
            let Some(tip_height) = tracker.longest_chain().map(|c| c.tip_height()) else {
                return Vec::new();
            };
            let limit = tip_height.saturating_sub(self.config.finality_depth);
            let settled = self
                .applied
                .read()
                .iter()
                .take_while(|d| d.height <= limit && !tracker.processing(d.height))
                .count();
            (tip_height, settled)
        };
        if settled == 0 {
            return Vec::new();
        }

        let digests: Vec<HeaderDigest> = self.applied.write().drain(..settled).collect();
        let mut finalized = Vec::with_capacity(digests.len());
        for digest in &digests {
            let Some(mut block) = self.confirmed.remove(&digest.hash) else {
                error!(height = digest.height, "approved block missing at finalization");
                continue;
            };
            for tx in &mut block.transactions {
                tx.status = TxStatus::Confirmed;
            }
            self.txs.confirming.remove_many(&block.tx_hashes());
            finalized.push(block);
        }

        let Some(anchor) = digests.last().copied() else {
            return finalized;
        };
        let dropped = self.tracker.write().prune_below(&anchor);
        for hash in &dropped {
            self.confirmed.remove(hash);
        }
        for digest in self.pending.digests() {
            if digest.height <= anchor.height {
                self.pending.remove(&digest.hash);
            }
        }

        self.stored_height.store(anchor.height, Ordering::Release);
        self.height_seeded.store(true, Ordering::Release);
        state.anchor = Some((anchor.height, anchor.hash));
        self.refresh_best();

        info!(
            count = finalized.len(),
            height = anchor.height,
            tip_height,
            pruned = dropped.len(),
            "finalized blocks"
        );
        finalized
    }

    fn drop_stale_branches(&self) {
        let dropped = self
            .tracker
            .write()
            .drop_trailing(self.config.finality_depth);
        if dropped.is_empty() {
            return;
        }
        for hash in &dropped {
            self.confirmed.remove(hash);
        }
        self.refresh_best();
        info!(
            dropped = dropped.len(),
            depth = self.config.finality_depth,
            "dropped branches trailing the longest tip"
        );
    }

    /// Confirmed or pending block by hash.
    pub fn get_block(&self, hash: &Sha256Hash) -> Option<Block> {
        self.confirmed.get(hash).or_else(|| self.pending.get(hash))
    }

    /// Block at `height` on the longest branch.
    pub fn get_block_at(&self, height: u64) -> Option<Block> {
        let hash = self.tracker.read().block_hash(height)?;
        self.get_block(&hash)
    }

    pub fn get_block_header(&self, hash: &Sha256Hash) -> Option<BlockHeader> {
        self.confirmed
            .header(hash)
            .or_else(|| self.pending.header(hash))
    }

    /// Confirmed header at `height` on the longest branch.
    pub fn get_block_header_at(&self, height: u64) -> Option<BlockHeader> {
        let hash = self.tracker.read().block_hash(height)?;
        self.confirmed.header(&hash)
    }

    /// Tip of the longest branch.
    pub fn get_highest_block(&self) -> Option<Block> {
        let tip = {
            let tracker = self.tracker.read();
            tracker.longest_chain().and_then(|c| c.tip().copied())
        }?;
        self.get_block(&tip.hash)
    }

    /// Block most recently recorded as the best tip.
    pub fn best_block(&self) -> Option<Block> {
        let best = (*self.best.read())?;
        self.get_block(&best.hash)
    }

    /// Approved path, lowest first.
    pub fn approved_chain(&self) -> Vec<HeaderDigest> {
        self.applied.read().clone()
    }

    pub fn is_approved(&self, hash: &Sha256Hash) -> bool {
        self.applied.read().iter().any(|d| &d.hash == hash)
    }

    /// Drops a block (and anything built on it) from the tracked state. Its
    /// effects are rolled back first if it was approved.
    pub fn remove_block(&self, hash: &Sha256Hash) -> bool {
        let _state = self.ingest.lock();
        let mut found = false;

        let position = self.applied.read().iter().position(|d| &d.hash == hash);
        if let Some(pos) = position {
            while self.applied.read().len() > pos {
                self.rollback_block();
            }
        }

        let removed = self.tracker.write().remove_hash(hash);
        for removed_hash in &removed {
            if let Some(block) = self.confirmed.remove(removed_hash) {
                found = true;
                if removed_hash != hash {
                    self.buffer_pending(block);
                }
            }
        }
        found |= self.confirmed.remove(hash).is_some();
        found |= self.pending.remove(hash).is_some();
        self.requests.lock().resolve(hash);
        self.refresh_best();

        if found {
            info!(hash = %short_hash(hash), descendants = removed.len().saturating_sub(1), "removed block");
            if let Some((failed, reason)) = self.reconcile() {
                warn!(hash = %short_hash(&failed), %reason, "approval failed after removal");
            }
        }
        found
    }

    /// True while more than one branch holds a block at `height`.
    pub fn is_bifurcating(&self, height: u64) -> bool {
        self.tracker.read().processing(height)
    }

    /// Forgets every non-final block, branch, staged transaction and
    /// outstanding request. Ledger effects are left alone; the caller resyncs.
    pub fn clear(&self) {
        let _state = self.ingest.lock();
        self.tracker.write().clear();
        self.confirmed.clear();
        self.pending.clear();
        self.txs.clear_all();
        *self.best.write() = None;
        self.applied.write().clear();
        self.requests.lock().clear();
        info!("consensus state cleared");
    }

    pub fn stored_height(&self) -> u64 {
        self.stored_height.load(Ordering::Acquire)
    }

    /// Overrides the persisted height, e.g. after a resync.
    pub fn set_stored_height(&self, height: u64) {
        self.stored_height.store(height, Ordering::Release);
        self.height_seeded.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> ConsensusStats {
        let (branches, best_height) = {
            let tracker = self.tracker.read();
            (
                tracker.chain_count(),
                tracker.longest_chain().map(|c| c.tip_height()),
            )
        };
        ConsensusStats {
            stored_height: self.stored_height(),
            best_height,
            approved_height: self.applied_tip().map(|d| d.height),
            branches,
            confirmed_blocks: self.confirmed.len(),
            pending_blocks: self.pending.len(),
            confirming_txs: self.txs.confirming.len(),
            received_txs: self.txs.received.len(),
            orphan_txs: self.txs.orphan.len(),
            outstanding_requests: self.requests.lock().len(),
        }
    }

    pub fn tx_caches(&self) -> &TxStagingCaches {
        &self.txs
    }

    pub fn confirmed_store(&self) -> &ConfirmedBlockStore {
        &self.confirmed
    }

    pub fn pending_buffer(&self) -> &PendingBlockBuffer {
        &self.pending
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }
}
