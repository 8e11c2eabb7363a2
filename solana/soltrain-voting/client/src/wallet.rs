use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;

use crate::error::{Result, VotingClientError};

/// Whoever pays for and signs a transaction. Signing may involve a human, so it is
/// asynchronous and may be declined.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Signs a transaction whose fee payer and recent blockhash are already set.
    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction>;
}

#[async_trait]
impl WalletSigner for Keypair {
    fn pubkey(&self) -> Pubkey {
        Signer::pubkey(self)
    }

    async fn sign_transaction(&self, mut transaction: Transaction) -> Result<Transaction> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[self], blockhash)
            .map_err(|err| VotingClientError::SigningRejected(err.to_string()))?;
        Ok(transaction)
    }
}
