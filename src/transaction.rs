//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;

/// Builds a transfer signed by `keypair`. Shared by tests and tooling.
pub fn signed_transfer(
    keypair: &crate::crypto::KeyPair,
    recipient: crate::crypto::Address,
    amount: u64,
    fee: u64,
    nonce: u64,
) -> Result<Transaction, crate::error::ChainError> {
    let mut tx = TransferTx::new(keypair.address(), recipient, amount, fee, nonce);
    let signature = keypair.sign(&tx.signable_message())?;
    tx.sign(signature.to_vec(), keypair.public_key_bytes().to_vec());
    Ok(Transaction::transfer(tx))
}
