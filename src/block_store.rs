//! Block stores owned by the consensus manager.
//!
//! [`ConfirmedBlockStore`] holds blocks attached to a tracked branch.
//! [`PendingBlockBuffer`] holds orphans and blocks whose approval failed,
//! indexed by parent so a late parent can release its children.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::RwLock;
use tracing::debug;

use crate::blockchain::{short_hash, Block, BlockHeader, HeaderDigest, Sha256Hash};
use crate::cache::ThreadSafeCache;

/// Where a block without a confirmed parent may still attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    /// Highest height already persisted outside the core.
    pub height: u64,
    /// Hash at that height, once known.
    pub hash: Option<Sha256Hash>,
}

/// Blocks accepted onto some tracked branch, keyed by hash.
#[derive(Clone)]
pub struct ConfirmedBlockStore {
    blocks: ThreadSafeCache<Sha256Hash, Block, HashMap<Sha256Hash, Block>>,
}

impl Default for ConfirmedBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmedBlockStore {
    pub fn new() -> Self {
        Self {
            blocks: ThreadSafeCache::new_default(),
        }
    }

    /// Inserts `block` if it links to a stored parent one height below, or if
    /// it sits directly on the watermark. Without a known watermark hash only
    /// the first block may attach that way.
    /// Returns false when the block must wait as an orphan.
    pub fn cache_block(&self, block: &Block, watermark: Watermark) -> bool {
        let linked = match self.blocks.get(&block.previous_hash()) {
            Some(parent) => parent.height() + 1 == block.height(),
            None if block.height() == watermark.height + 1 => match watermark.hash {
                Some(hash) => hash == block.previous_hash(),
                None => self.blocks.is_empty(),
            },
            None => false,
        };
        if linked {
            self.blocks.put(block.hash(), block.clone());
        }
        linked
    }

    /// Overwrites a stored block, e.g. after its transactions were stamped.
    pub fn replace(&self, block: Block) {
        self.blocks.put(block.hash(), block);
    }

    pub fn get(&self, hash: &Sha256Hash) -> Option<Block> {
        self.blocks.get(hash)
    }

    pub fn header(&self, hash: &Sha256Hash) -> Option<BlockHeader> {
        self.blocks.get(hash).map(|b| b.header)
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.blocks.contains(hash)
    }

    pub fn remove(&self, hash: &Sha256Hash) -> Option<Block> {
        self.blocks.remove(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&self) {
        self.blocks.clear();
    }
}

struct PendingInner {
    blocks: LruCache<Sha256Hash, Block>,
    /// previous hash -> children in arrival order
    children: HashMap<Sha256Hash, Vec<Sha256Hash>>,
}

impl PendingInner {
    fn unlink(&mut self, block: &Block) {
        let parent = block.previous_hash();
        let hash = block.hash();
        if let Some(kids) = self.children.get_mut(&parent) {
            kids.retain(|h| h != &hash);
            if kids.is_empty() {
                self.children.remove(&parent);
            }
        }
    }
}

/// Bounded buffer of blocks that cannot be confirmed yet.
pub struct PendingBlockBuffer {
    inner: RwLock<PendingInner>,
}

impl PendingBlockBuffer {
    pub const DEFAULT_CAPACITY: usize = 1_000;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(PendingInner {
                blocks: LruCache::new(capacity),
                children: HashMap::new(),
            }),
        }
    }

    /// Buffers `block`. When full, the least recently buffered block is
    /// evicted and returned.
    pub fn cache_block(&self, block: Block) -> Option<Block> {
        let hash = block.hash();
        let parent = block.previous_hash();
        let mut inner = self.inner.write();

        let evicted = match inner.blocks.push(hash, block) {
            Some((old_hash, old)) if old_hash != hash => {
                inner.unlink(&old);
                debug!(hash = %short_hash(&old_hash), "evicted pending block");
                Some(old)
            }
            _ => None,
        };

        let kids = inner.children.entry(parent).or_default();
        if !kids.contains(&hash) {
            kids.push(hash);
        }
        evicted
    }

    pub fn get(&self, hash: &Sha256Hash) -> Option<Block> {
        self.inner.read().blocks.peek(hash).cloned()
    }

    pub fn header(&self, hash: &Sha256Hash) -> Option<BlockHeader> {
        self.inner.read().blocks.peek(hash).map(|b| b.header.clone())
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.inner.read().blocks.contains(hash)
    }

    /// Hashes of buffered blocks whose previous hash is `parent`.
    pub fn next_hashes(&self, parent: &Sha256Hash) -> Vec<Sha256Hash> {
        self.inner
            .read()
            .children
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn remove(&self, hash: &Sha256Hash) -> Option<Block> {
        let mut inner = self.inner.write();
        let block = inner.blocks.pop(hash)?;
        inner.unlink(&block);
        Some(block)
    }

    /// Removes and returns the buffered children of `parent`, oldest first.
    pub fn take_children(&self, parent: &Sha256Hash) -> Vec<Block> {
        let mut inner = self.inner.write();
        let hashes = inner.children.remove(parent).unwrap_or_default();
        hashes
            .iter()
            .filter_map(|h| inner.blocks.pop(h))
            .collect()
    }

    pub fn digests(&self) -> Vec<HeaderDigest> {
        self.inner
            .read()
            .blocks
            .iter()
            .map(|(_, b)| b.header.digest())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.blocks.clear();
        inner.children.clear();
    }
}

impl Default for PendingBlockBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
