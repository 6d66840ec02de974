use crate::crypto::Address;
use crate::transaction::{Transaction, TxHash};
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

/// Round-derived timing data carried by every header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockRoundData {
    pub round_index: u64,
    /// Position of the producer within the round.
    pub packing_index: u32,
    /// Round start, unix millis.
    pub round_start_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub timestamp: u64,
    pub previous_hash: Sha256Hash,
    pub merkle_root: Sha256Hash,
    pub packing_address: Address,
    pub tx_count: u32,
    pub round: BlockRoundData,
}

impl BlockHeader {
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.previous_hash);
        hasher.update(self.merkle_root);
        hasher.update(self.packing_address);
        hasher.update(self.tx_count.to_le_bytes());
        hasher.update(self.round.round_index.to_le_bytes());
        hasher.update(self.round.packing_index.to_le_bytes());
        hasher.update(self.round.round_start_time.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn digest(&self) -> HeaderDigest {
        HeaderDigest {
            hash: self.hash(),
            height: self.height,
            previous_hash: self.previous_hash,
        }
    }
}

/// The minimal identity of a header, all the branch tracker keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeaderDigest {
    pub hash: Sha256Hash,
    pub height: u64,
    pub previous_hash: Sha256Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        height: u64,
        previous_hash: Sha256Hash,
        packing_address: Address,
        round: BlockRoundData,
        transactions: Vec<Transaction>,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        let merkle_root = Block::calculate_merkle_root(&transactions);

        Block {
            header: BlockHeader {
                height,
                timestamp,
                previous_hash,
                merkle_root,
                packing_address,
                tx_count: transactions.len() as u32,
                round,
            },
            transactions,
        }
    }

    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn previous_hash(&self) -> Sha256Hash {
        self.header.previous_hash
    }

    pub fn tx_hashes(&self) -> Vec<TxHash> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Sha256Hash {
        let mut hasher = Sha256::new();
        for tx in transactions {
            hasher.update(tx.hash());
        }
        hasher.finalize().into()
    }
}

/// Short hex form used in log lines.
pub fn short_hash(hash: &Sha256Hash) -> String {
    hex::encode(&hash[..6])
}
