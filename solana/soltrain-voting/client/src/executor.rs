use std::collections::BTreeMap;
use std::sync::Arc;

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tracing::{debug, info};

use crate::error::{Result, VotingClientError};
use crate::event::{parse_logs, TransactionEvents};
use crate::retry::{retry_until_some, RetryPolicy};
use crate::rpc::{ChainRpc, SendOptions, TransactionReceipt};
use crate::wallet::WalletSigner;

/// Commitment used to read a receipt back. Nodes serve `getTransaction` from
/// `confirmed` upwards only.
pub fn receipt_commitment(commitment: CommitmentConfig) -> CommitmentConfig {
    if commitment.is_at_least_confirmed() {
        commitment
    } else {
        CommitmentConfig::confirmed()
    }
}

/// Addresses derived for a transaction, keyed by the account's role
/// (`sessionAccount`, `voterAccount`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedAccounts(BTreeMap<&'static str, Pubkey>);

impl DerivedAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: &'static str, address: Pubkey) -> Self {
        self.0.insert(role, address);
        self
    }

    pub fn get(&self, role: &str) -> Option<Pubkey> {
        self.0.get(role).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Pubkey)> + '_ {
        self.0.iter().map(|(role, address)| (*role, *address))
    }
}

#[derive(Debug, Clone)]
pub struct TransactionResult {
    pub signature: Signature,
    pub accounts: DerivedAccounts,
    pub events: TransactionEvents,
}

/// Signs and submits transactions to the voting program, then reads their events back.
pub struct TransactionExecutor {
    rpc: Arc<dyn ChainRpc>,
    program_id: Pubkey,
    options: SendOptions,
    event_retry: RetryPolicy,
}

impl TransactionExecutor {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        program_id: Pubkey,
        options: SendOptions,
        event_retry: RetryPolicy,
    ) -> Self {
        Self {
            rpc,
            program_id,
            options,
            event_retry,
        }
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// Submits `instructions` as one transaction paid and signed by `wallet`.
    ///
    /// The transaction is sent exactly once. Only the event read-back is retried, and
    /// running out of attempts there yields
    /// [`VotingClientError::EventResolutionTimeout`]: the transaction itself landed.
    pub async fn execute(
        &self,
        wallet: &dyn WalletSigner,
        instructions: &[Instruction],
        accounts: DerivedAccounts,
    ) -> Result<TransactionResult> {
        let payer = wallet.pubkey();

        debug!(%payer, "Fetching latest blockhash");
        let blockhash = self.rpc.latest_blockhash().await?;

        let mut transaction = Transaction::new_with_payer(instructions, Some(&payer));
        transaction.message.recent_blockhash = blockhash;

        debug!(%payer, %blockhash, "Requesting signature");
        let signed = wallet.sign_transaction(transaction).await?;
        if !signed.is_signed() {
            return Err(VotingClientError::SigningRejected(
                "wallet returned an unsigned transaction".to_string(),
            ));
        }

        let signature = self.rpc.send_transaction(&signed, &self.options).await?;
        info!(%signature, skip_preflight = self.options.skip_preflight, "Transaction submitted");

        let events = self.resolve_events(&signature).await?;
        Ok(TransactionResult {
            signature,
            accounts,
            events,
        })
    }

    /// Polls for the transaction's receipt and decodes the program's events from it.
    pub async fn resolve_events(&self, signature: &Signature) -> Result<TransactionEvents> {
        let commitment = receipt_commitment(self.options.commitment);
        let receipt: TransactionReceipt =
            retry_until_some(self.event_retry, |attempt| async move {
                debug!(%signature, attempt, "Fetching transaction receipt");
                self.rpc.transaction_receipt(signature, commitment).await
            })
            .await
            .map_err(|exhausted| VotingClientError::EventResolutionTimeout {
                signature: *signature,
                attempts: exhausted.attempts,
            })?;

        if let Some(failure) = &receipt.failure {
            return Err(VotingClientError::from_transaction_error(failure));
        }

        let events = parse_logs(&self.program_id, &receipt.logs)?;
        debug!(%signature, count = events.len(), "Resolved transaction events");
        Ok(TransactionEvents::new(events))
    }
}
