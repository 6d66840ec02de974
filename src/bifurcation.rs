//! Branch tracking for blocks near the chain tip.
//!
//! Every candidate branch is an ordered run of [`HeaderDigest`]s with
//! consecutive heights, each digest linking to its predecessor. Branches that
//! fork from one another share their common prefix by value; digests are small
//! and the number of live branches is bounded by the number of competing
//! producers per round.

use tracing::{debug, warn};

use crate::blockchain::{short_hash, BlockHeader, HeaderDigest, Sha256Hash};

/// One candidate branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderChain {
    digests: Vec<HeaderDigest>,
}

impl HeaderChain {
    fn new(digests: Vec<HeaderDigest>) -> Self {
        Self { digests }
    }

    pub fn digests(&self) -> &[HeaderDigest] {
        &self.digests
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn tip(&self) -> Option<&HeaderDigest> {
        self.digests.last()
    }

    pub fn tip_height(&self) -> u64 {
        self.tip().map_or(0, |d| d.height)
    }

    pub fn start_height(&self) -> Option<u64> {
        self.digests.first().map(|d| d.height)
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.position(hash).is_some()
    }

    fn position(&self, hash: &Sha256Hash) -> Option<usize> {
        self.digests.iter().position(|d| &d.hash == hash)
    }

    /// Digest at `height`, if this branch covers it.
    pub fn digest_at(&self, height: u64) -> Option<&HeaderDigest> {
        let start = self.start_height()?;
        let offset = height.checked_sub(start)?;
        self.digests.get(usize::try_from(offset).ok()?)
    }
}

/// Tracks competing branches and decides which one is longest.
///
/// Branches are kept in creation order, which breaks ties.
#[derive(Debug, Default)]
pub struct BranchTracker {
    chains: Vec<HeaderChain>,
    best: Option<HeaderDigest>,
}

impl BranchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `header` onto the branch holding its parent.
    ///
    /// Appends when the parent is a tip, forks a new branch when the parent is
    /// further down, and starts a new root branch when the parent is unknown.
    /// Returns true iff the longest branch now ends in this header and is
    /// strictly higher than the best recorded so far.
    pub fn add_header(&mut self, header: &BlockHeader) -> bool {
        let digest = header.digest();
        if self.contains(&digest.hash) {
            return false;
        }

        let parent_at = self
            .chains
            .iter()
            .enumerate()
            .find_map(|(i, c)| c.position(&digest.previous_hash).map(|p| (i, p)));
        let tip_of = self
            .chains
            .iter()
            .position(|c| c.tip().is_some_and(|t| t.hash == digest.previous_hash));

        match (tip_of, parent_at) {
            (Some(idx), _) => {
                let parent_height = self.chains[idx].tip_height();
                if parent_height + 1 != digest.height {
                    warn!(
                        height = digest.height,
                        parent_height, "header height does not follow its parent, ignoring"
                    );
                    return false;
                }
                self.chains[idx].digests.push(digest);
            }
            (None, Some((idx, pos))) => {
                let parent_height = self.chains[idx].digests[pos].height;
                if parent_height + 1 != digest.height {
                    warn!(
                        height = digest.height,
                        parent_height, "header height does not follow its parent, ignoring"
                    );
                    return false;
                }
                let mut digests = self.chains[idx].digests[..=pos].to_vec();
                digests.push(digest);
                debug!(
                    branches = self.chains.len() + 1,
                    fork_height = digest.height,
                    hash = %short_hash(&digest.hash),
                    "new branch forked"
                );
                self.chains.push(HeaderChain::new(digests));
            }
            (None, None) => {
                self.chains.push(HeaderChain::new(vec![digest]));
            }
        }

        let longest_tip = self.longest_chain().and_then(|c| c.tip().copied());
        let improves = longest_tip == Some(digest)
            && self.best.map_or(true, |best| digest.height > best.height);
        if improves {
            self.best = Some(digest);
        }
        improves
    }

    /// Best header recorded by [`add_header`](Self::add_header).
    pub fn best(&self) -> Option<&HeaderDigest> {
        self.best.as_ref()
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.chains.iter().any(|c| c.contains(hash))
    }

    /// Distinct hashes branches hold at `height`, in branch creation order.
    pub fn all_hash_list(&self, height: u64) -> Vec<Sha256Hash> {
        let mut hashes: Vec<Sha256Hash> = Vec::new();
        for digest in self.chains.iter().filter_map(|c| c.digest_at(height)) {
            if !hashes.contains(&digest.hash) {
                hashes.push(digest.hash);
            }
        }
        hashes
    }

    pub fn chain_size(&self, height: u64) -> usize {
        self.all_hash_list(height).len()
    }

    /// True while more than one branch competes at `height`.
    pub fn processing(&self, height: u64) -> bool {
        self.chain_size(height) > 1
    }

    /// Highest branch; ties go to the branch that was created first.
    pub fn longest_chain(&self) -> Option<&HeaderChain> {
        let mut longest: Option<&HeaderChain> = None;
        for chain in &self.chains {
            if longest.map_or(true, |l| chain.tip_height() > l.tip_height()) {
                longest = Some(chain);
            }
        }
        longest
    }

    /// The longest branch, unless another branch reaches the same height.
    pub fn unique_longest(&self) -> Option<&HeaderChain> {
        let longest = self.longest_chain()?;
        let contenders = self
            .chains
            .iter()
            .filter(|c| c.tip_height() == longest.tip_height())
            .count();
        (contenders == 1).then_some(longest)
    }

    /// Hash at `height` on the longest branch.
    pub fn block_hash(&self, height: u64) -> Option<Sha256Hash> {
        self.longest_chain()?.digest_at(height).map(|d| d.hash)
    }

    /// Removes `hash` and everything built on it. Returns the removed hashes.
    pub fn remove_hash(&mut self, hash: &Sha256Hash) -> Vec<Sha256Hash> {
        let before = self.referenced();
        for chain in &mut self.chains {
            if let Some(pos) = chain.position(hash) {
                chain.digests.truncate(pos);
            }
        }
        self.compact();
        self.forget_removed(before)
    }

    /// Drops everything at or below `anchor`'s height and every branch that
    /// does not pass through `anchor`. Returns hashes no branch references any
    /// more.
    pub fn prune_below(&mut self, anchor: &HeaderDigest) -> Vec<Sha256Hash> {
        let before = self.referenced();
        self.chains.retain(|c| c.contains(&anchor.hash));
        for chain in &mut self.chains {
            chain.digests.retain(|d| d.height > anchor.height);
        }
        self.compact();
        self.forget_removed(before)
    }

    /// Drops branches whose tip is `depth` or more below the longest tip.
    /// Returns hashes no branch references any more.
    pub fn drop_trailing(&mut self, depth: u64) -> Vec<Sha256Hash> {
        let Some(top) = self.longest_chain().map(HeaderChain::tip_height) else {
            return Vec::new();
        };
        let before = self.referenced();
        self.chains
            .retain(|c| c.tip_height() == top || c.tip_height() + depth > top);
        self.compact();
        self.forget_removed(before)
    }

    pub fn clear(&mut self) {
        self.chains.clear();
        self.best = None;
    }

    fn referenced(&self) -> Vec<Sha256Hash> {
        let mut hashes: Vec<Sha256Hash> = Vec::new();
        for digest in self.chains.iter().flat_map(|c| c.digests.iter()) {
            if !hashes.contains(&digest.hash) {
                hashes.push(digest.hash);
            }
        }
        hashes
    }

    fn forget_removed(&mut self, before: Vec<Sha256Hash>) -> Vec<Sha256Hash> {
        let removed: Vec<Sha256Hash> = before.into_iter().filter(|h| !self.contains(h)).collect();
        if self.best.is_some_and(|b| removed.contains(&b.hash)) {
            self.best = self.longest_chain().and_then(|c| c.tip().copied());
        }
        removed
    }

    /// Drops empty branches and branches whose tip lies inside another branch.
    fn compact(&mut self) {
        self.chains.retain(|c| !c.is_empty());
        let mut keep = vec![true; self.chains.len()];
        for (i, chain) in self.chains.iter().enumerate() {
            let Some(tip) = chain.tip() else { continue };
            let redundant = self.chains.iter().enumerate().any(|(j, other)| {
                j != i
                    && keep[j]
                    && other.contains(&tip.hash)
                    && (other.len() > chain.len() || (other.len() == chain.len() && j < i))
            });
            keep[i] = !redundant;
        }
        let mut flags = keep.into_iter();
        self.chains.retain(|_| flags.next().unwrap_or(true));
    }
}
