//! Ledger effects of transactions.
//!
//! The consensus manager applies a transaction's effects when its block is
//! approved on the canonical branch and reverts them when that branch loses.
//! Implementations only need to support the `apply -> revert -> apply` cycle;
//! applying twice in a row is an error, not a no-op.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use crate::crypto::{address_to_hex, Address};
use crate::error::LedgerError;
use crate::transaction::{Transaction, TxHash, TxPayload};

pub trait Ledger: Send + Sync {
    /// Applies the transaction's effects. An error aborts the enclosing block.
    fn apply(&self, tx: &Transaction) -> Result<(), LedgerError>;

    /// Undoes previously applied effects. Errors are logged by the caller and
    /// the rollback carries on.
    fn revert(&self, tx: &Transaction) -> Result<(), LedgerError>;
}

#[derive(Debug, Default)]
struct BalanceState {
    balances: HashMap<Address, u64>,
    applied: HashSet<TxHash>,
}

impl BalanceState {
    fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    fn credit(&mut self, address: Address, amount: u64) -> Result<(), LedgerError> {
        let entry = self.balances.entry(address).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(address_to_hex(&address)))?;
        Ok(())
    }

    fn debit(&mut self, address: Address, amount: u64) -> Result<(), LedgerError> {
        let balance = self.balance(&address);
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                address: address_to_hex(&address),
                balance,
                needed: amount,
            });
        }
        self.balances.insert(address, balance - amount);
        Ok(())
    }
}

/// In-memory account ledger. Coinbase credits the beneficiary; transfers move
/// `amount` to the recipient and burn `fee`.
#[derive(Debug, Default)]
pub struct BalanceLedger {
    state: RwLock<BalanceState>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds balances, e.g. from a finalized snapshot.
    pub fn with_balances(balances: impl IntoIterator<Item = (Address, u64)>) -> Self {
        let ledger = Self::new();
        ledger.state.write().balances.extend(balances);
        ledger
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.state.read().balance(address)
    }

    pub fn is_applied(&self, tx_hash: &TxHash) -> bool {
        self.state.read().applied.contains(tx_hash)
    }

    pub fn applied_count(&self) -> usize {
        self.state.read().applied.len()
    }
}

impl Ledger for BalanceLedger {
    fn apply(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let hash = tx.hash();
        let mut state = self.state.write();
        if state.applied.contains(&hash) {
            return Err(LedgerError::AlreadyApplied(hex::encode(hash)));
        }

        match &tx.payload {
            TxPayload::Coinbase(cb) => state.credit(cb.beneficiary, cb.reward)?,
            TxPayload::Transfer(t) => {
                let cost = t
                    .total_cost()
                    .ok_or_else(|| LedgerError::Overflow(address_to_hex(&t.sender)))?;
                state.debit(t.sender, cost)?;
                if let Err(e) = state.credit(t.recipient, t.amount) {
                    // Keep the ledger untouched when the credit side fails.
                    state.credit(t.sender, cost)?;
                    return Err(e);
                }
            }
        }

        state.applied.insert(hash);
        debug!(tx = %hex::encode(hash), "applied transaction");
        Ok(())
    }

    fn revert(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let hash = tx.hash();
        let mut state = self.state.write();
        if !state.applied.contains(&hash) {
            return Err(LedgerError::NotApplied(hex::encode(hash)));
        }

        match &tx.payload {
            TxPayload::Coinbase(cb) => state.debit(cb.beneficiary, cb.reward)?,
            TxPayload::Transfer(t) => {
                let cost = t
                    .total_cost()
                    .ok_or_else(|| LedgerError::Overflow(address_to_hex(&t.sender)))?;
                state.debit(t.recipient, t.amount)?;
                state.credit(t.sender, cost)?;
            }
        }

        state.applied.remove(&hash);
        debug!(tx = %hex::encode(hash), "reverted transaction");
        Ok(())
    }
}
