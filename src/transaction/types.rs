/// Transaction types for chaincore
use crate::blockchain::Sha256Hash;
use crate::crypto::Address;
use crate::error::ChainError;
use sha2::{Digest, Sha256};

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

pub type TxHash = Sha256Hash;

/// Where a transaction stands relative to the ledger.
///
/// Ordered: a transaction only moves forward through `Cached -> Agreed ->
/// Confirmed`, except that a rollback returns `Agreed` to `Cached`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum TxStatus {
    /// Staged; no ledger effects applied.
    #[default]
    Cached,
    /// Ledger effects applied on the branch holding its block.
    Agreed,
    /// Its block has been finalized and handed out of the consensus core.
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TxPayload {
    Coinbase(CoinbaseTx),
    Transfer(TransferTx),
}

/// A transaction together with its staging metadata.
///
/// The hash covers the payload only, so the same transfer carried by two
/// competing blocks has one identity.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub payload: TxPayload,
    #[serde(default)]
    pub status: TxStatus,
    /// Height of the containing block, stamped on approval.
    #[serde(default)]
    pub block_height: Option<u64>,
    /// Position within the containing block, stamped on approval.
    #[serde(default)]
    pub index: Option<u32>,
}

impl Transaction {
    pub fn new(payload: TxPayload) -> Self {
        Self {
            payload,
            status: TxStatus::Cached,
            block_height: None,
            index: None,
        }
    }

    pub fn coinbase(beneficiary: Address, reward: u64, height: u64) -> Self {
        Self::new(TxPayload::Coinbase(CoinbaseTx {
            beneficiary,
            reward,
            height,
        }))
    }

    pub fn transfer(tx: TransferTx) -> Self {
        Self::new(TxPayload::Transfer(tx))
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.payload, TxPayload::Coinbase(_))
    }

    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256::new();
        match &self.payload {
            TxPayload::Coinbase(tx) => {
                hasher.update("coinbase".as_bytes());
                hasher.update(tx.beneficiary);
                hasher.update(tx.reward.to_le_bytes());
                hasher.update(tx.height.to_le_bytes());
            }
            TxPayload::Transfer(tx) => {
                hasher.update("transfer".as_bytes());
                hasher.update(tx.signable_message());
            }
        }
        hasher.finalize().into()
    }

    pub fn fee(&self) -> u64 {
        match &self.payload {
            TxPayload::Transfer(tx) => tx.fee,
            TxPayload::Coinbase(_) => 0,
        }
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<(), ChainError> {
        let serialized = bincode::serialize(&self.payload)?;
        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}

/// Producer reward, always the first transaction of a block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CoinbaseTx {
    pub beneficiary: Address,
    pub reward: u64,
    /// Height of the block paying the reward; keeps coinbase hashes unique.
    pub height: u64,
}

impl CoinbaseTx {
    pub const MAX_REWARD: u64 = 50_000_000_000;
}

/// Balance transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransferTx {
    pub sender: Address,
    pub recipient: Address,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
    #[serde(default)]
    pub memo: Option<String>,
}

impl TransferTx {
    pub const MAX_MEMO_LENGTH: usize = 256;

    pub fn new(sender: Address, recipient: Address, amount: u64, fee: u64, nonce: u64) -> Self {
        TransferTx {
            sender,
            recipient,
            amount,
            fee,
            nonce,
            signature: None,
            public_key: None,
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: String) -> Result<Self, ChainError> {
        if memo.len() > Self::MAX_MEMO_LENGTH {
            return Err(ChainError::InvalidTransaction(format!(
                "Memo exceeds maximum length of {} characters",
                Self::MAX_MEMO_LENGTH
            )));
        }
        self.memo = Some(memo);
        Ok(self)
    }

    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("TRANSFER:".as_bytes());
        message.extend_from_slice(&self.sender);
        message.extend_from_slice(&self.recipient);
        message.extend_from_slice(&self.amount.to_le_bytes());
        message.extend_from_slice(&self.fee.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        if let Some(memo) = &self.memo {
            message.extend_from_slice(memo.as_bytes());
        }
        message
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }

    /// Total debited from the sender when applied.
    pub fn total_cost(&self) -> Option<u64> {
        self.amount.checked_add(self.fee)
    }
}
