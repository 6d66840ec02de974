use std::collections::HashMap;

use rayon::prelude::*;

use crate::blockchain::core::chain::Block;
use crate::error::ChainError;
use crate::transaction::{Transaction, TxPayload};

/// Result of checking a block or transaction.
///
/// `Orphan` means the item cannot be judged yet because something it refers
/// to (a parent block, a funding transaction) is unknown locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Orphan(String),
    Invalid(String),
}

impl From<Result<(), ChainError>> for Verdict {
    fn from(result: Result<(), ChainError>) -> Self {
        match result {
            Ok(()) => Verdict::Valid,
            Err(ChainError::OrphanTransaction(reason)) => Verdict::Orphan(reason),
            Err(e) => Verdict::Invalid(e.to_string()),
        }
    }
}

/// Structural and signature checks the consensus manager runs before a block
/// or transaction may touch the ledger.
pub trait BlockValidator: Send + Sync {
    fn verify_block(&self, block: &Block) -> Verdict;
    fn verify_transaction(&self, tx: &Transaction) -> Verdict;
}

/// Stateless validator: header/body consistency, coinbase placement,
/// duplicate detection and per-transaction signature checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl BlockValidator for StructuralValidator {
    fn verify_block(&self, block: &Block) -> Verdict {
        validate_block(block).into()
    }

    fn verify_transaction(&self, tx: &Transaction) -> Verdict {
        tx.validate().into()
    }
}

pub fn validate_block(block: &Block) -> Result<(), ChainError> {
    if block.transactions.is_empty() {
        return Err(ChainError::InvalidBlock("Block has no transactions".to_string()));
    }
    if block.header.tx_count as usize != block.transactions.len() {
        return Err(ChainError::InvalidBlock(format!(
            "Header announces {} transactions but body has {}",
            block.header.tx_count,
            block.transactions.len()
        )));
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        match (&tx.payload, i) {
            (TxPayload::Coinbase(cb), 0) => {
                if cb.height != block.header.height {
                    return Err(ChainError::InvalidBlock(format!(
                        "Coinbase height {} does not match block height {}",
                        cb.height, block.header.height
                    )));
                }
            }
            (TxPayload::Coinbase(_), _) => {
                return Err(ChainError::InvalidBlock(format!(
                    "Coinbase transaction at index {}; only index 0 may be a coinbase",
                    i
                )));
            }
            (_, 0) => {
                return Err(ChainError::InvalidBlock(
                    "First transaction in a block must be a Coinbase transaction.".to_string(),
                ));
            }
            _ => {}
        }
    }

    let expected_merkle_root = Block::calculate_merkle_root(&block.transactions);
    if expected_merkle_root != block.header.merkle_root {
        return Err(ChainError::InvalidBlock(format!(
            "Merkle root mismatch. Expected {}, but got {}.",
            hex::encode(expected_merkle_root),
            hex::encode(block.header.merkle_root)
        )));
    }

    validate_no_double_spend(block)?;

    block
        .transactions
        .par_iter()
        .map(Transaction::validate)
        .collect::<Result<Vec<()>, ChainError>>()?;

    Ok(())
}

/// Rejects blocks carrying the same transaction twice or two transfers that
/// reuse a sender nonce.
pub fn validate_no_double_spend(block: &Block) -> Result<(), ChainError> {
    let mut seen_hashes = HashMap::new();
    let mut seen_nonces = HashMap::new();
    for (i, tx) in block.transactions.iter().enumerate() {
        let hash = tx.hash();
        if let Some(first) = seen_hashes.insert(hash, i) {
            return Err(ChainError::InvalidBlock(format!(
                "Transaction {} appears at index {} and {}",
                hex::encode(hash),
                first,
                i
            )));
        }
        if let TxPayload::Transfer(t) = &tx.payload {
            if let Some(conflicting) = seen_nonces.insert((t.sender, t.nonce), hash) {
                return Err(ChainError::InvalidTransaction(format!(
                    "Double spend detected in block. Nonce {} of {} is used by both {} and {}",
                    t.nonce,
                    hex::encode(t.sender),
                    hex::encode(conflicting),
                    hex::encode(hash)
                )));
            }
        }
    }
    Ok(())
}
