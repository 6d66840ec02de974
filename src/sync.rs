//! Missing-parent requests
//!
//! When an orphan block arrives the consensus manager asks the network for its
//! parent. Requests are fire-and-forget: retry and backoff belong to whatever
//! consumes them. The manager keeps at most one outstanding request per
//! missing hash.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::blockchain::{short_hash, Sha256Hash};

/// A request for the block with hash `wanted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRequest {
    pub wanted: Sha256Hash,
    /// Peer that delivered the orphan, if known. Good first candidate to ask.
    pub hint_peer: Option<String>,
}

/// Outbound gateway for block requests.
pub trait BlockRequester: Send + Sync {
    fn request_block(&self, request: BlockRequest);
}

/// Forwards requests into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelRequester {
    tx: mpsc::UnboundedSender<BlockRequest>,
}

impl ChannelRequester {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BlockRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl BlockRequester for ChannelRequester {
    fn request_block(&self, request: BlockRequest) {
        let wanted = request.wanted;
        if self.tx.send(request).is_err() {
            warn!(hash = %short_hash(&wanted), "block request dropped, receiver closed");
        }
    }
}

/// Discards requests. For nodes that only replay local data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRequester;

impl BlockRequester for NoopRequester {
    fn request_block(&self, _request: BlockRequest) {}
}

/// Outstanding parent requests, keyed by the missing hash.
#[derive(Debug, Default)]
pub struct ParentRequests {
    outstanding: HashSet<Sha256Hash>,
}

impl ParentRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request for `hash`. Returns false if one is already out.
    pub fn begin(&mut self, hash: Sha256Hash) -> bool {
        let fresh = self.outstanding.insert(hash);
        if !fresh {
            debug!(hash = %short_hash(&hash), "parent already requested");
        }
        fresh
    }

    /// The block arrived (or was given up on); a later orphan may ask again.
    pub fn resolve(&mut self, hash: &Sha256Hash) -> bool {
        self.outstanding.remove(hash)
    }

    pub fn is_outstanding(&self, hash: &Sha256Hash) -> bool {
        self.outstanding.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn clear(&mut self) {
        self.outstanding.clear();
    }
}
