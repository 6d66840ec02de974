/// Stateless validation logic, kept apart from the type definitions
use crate::crypto::{address_from_public_key, verify_signature};
use crate::error::ChainError;
use crate::transaction::types::{CoinbaseTx, Transaction, TransferTx, TxPayload};

impl Transaction {
    /// Checks everything that can be checked without ledger state.
    pub fn validate(&self) -> Result<(), ChainError> {
        self.validate_size()?;
        match &self.payload {
            TxPayload::Coinbase(tx) => tx.validate(),
            TxPayload::Transfer(tx) => tx.validate(),
        }
    }
}

impl CoinbaseTx {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.reward == 0 {
            return Err(ChainError::InvalidTransaction(
                "Coinbase reward must be greater than zero".to_string(),
            ));
        }
        if self.reward > Self::MAX_REWARD {
            return Err(ChainError::InvalidTransaction(format!(
                "Coinbase reward {} exceeds maximum {}",
                self.reward,
                Self::MAX_REWARD
            )));
        }
        if self.beneficiary == [0; 32] {
            return Err(ChainError::InvalidTransaction(
                "Coinbase beneficiary address cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl TransferTx {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.sender == [0; 32] {
            return Err(ChainError::InvalidTransaction(
                "Sender address cannot be empty".to_string(),
            ));
        }
        if self.recipient == [0; 32] {
            return Err(ChainError::InvalidTransaction(
                "Recipient address cannot be empty".to_string(),
            ));
        }
        if self.sender == self.recipient {
            return Err(ChainError::InvalidTransaction(
                "Sender and recipient cannot be the same".to_string(),
            ));
        }
        if self.amount == 0 && self.fee == 0 {
            return Err(ChainError::InvalidTransaction(
                "Amount and fee cannot both be zero".to_string(),
            ));
        }
        if self.total_cost().is_none() {
            return Err(ChainError::InvalidTransaction(
                "Amount plus fee overflows".to_string(),
            ));
        }
        if let Some(memo) = &self.memo {
            if memo.len() > Self::MAX_MEMO_LENGTH {
                return Err(ChainError::InvalidTransaction(format!(
                    "Memo exceeds maximum length of {} characters",
                    Self::MAX_MEMO_LENGTH
                )));
            }
        }
        self.validate_signature()
    }

    /// The signing key must belong to the sender and sign the transfer body.
    pub fn validate_signature(&self) -> Result<(), ChainError> {
        let (signature, public_key) = match (&self.signature, &self.public_key) {
            (Some(sig), Some(pk)) => (sig, pk),
            _ => {
                return Err(ChainError::InvalidTransaction(
                    "Transfer not signed".to_string(),
                ))
            }
        };

        if address_from_public_key(public_key) != self.sender {
            return Err(ChainError::InvalidTransaction(format!(
                "Public key does not belong to sender {}",
                hex::encode(self.sender)
            )));
        }

        verify_signature(public_key, &self.signable_message(), signature)
    }
}
