use async_trait::async_trait;
use solana_account_decoder::{UiAccountEncoding, UiDataSliceConfig};
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSendTransactionConfig,
    RpcTransactionConfig,
};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::UiTransactionEncoding;

use crate::error::{Result, VotingClientError};

/// How transactions are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Skip the node's simulation of the transaction before it is forwarded.
    pub skip_preflight: bool,
    pub commitment: CommitmentConfig,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            commitment: CommitmentConfig::confirmed(),
        }
    }
}

/// Execution record of a landed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub logs: Vec<String>,
    /// Set when the transaction was included but failed.
    pub failure: Option<TransactionError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl AccountFilter {
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            AccountFilter::Memcmp { offset, bytes } => data
                .get(*offset..offset.saturating_add(bytes.len()))
                .map_or(false, |window| window == bytes.as_slice()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSlice {
    pub offset: usize,
    pub length: usize,
}

impl DataSlice {
    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        let start = self.offset.min(data.len());
        let end = self.offset.saturating_add(self.length).min(data.len());
        data[start..end].to_vec()
    }
}

/// The chain operations the client needs. Implemented for the JSON-RPC client and for
/// in-memory chains in tests.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash>;

    /// Submits a signed transaction once. Never retried by the caller.
    async fn send_transaction(
        &self,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature>;

    /// Returns `None` while the transaction is not yet visible to the node. Nodes reject
    /// commitments below `confirmed` here.
    async fn transaction_receipt(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<TransactionReceipt>>;

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    async fn multiple_account_data(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>>;

    /// All accounts owned by `program_id` that pass every filter. With a data slice,
    /// only that part of each account's data is returned.
    async fn program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
        data_slice: Option<DataSlice>,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>>;
}

fn network_error(err: ClientError) -> VotingClientError {
    VotingClientError::network(err)
}

fn classify_send_error(err: ClientError) -> VotingClientError {
    if let Some(failure) = err.get_transaction_error() {
        return VotingClientError::from_transaction_error(&failure);
    }
    match err.kind() {
        ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => network_error(err),
        _ => VotingClientError::Submission(err.to_string()),
    }
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.get_latest_blockhash().await.map_err(network_error)
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(options.commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };
        self.send_transaction_with_config(transaction, config)
            .await
            .map_err(classify_send_error)
    }

    async fn transaction_receipt(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<TransactionReceipt>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(commitment),
            max_supported_transaction_version: Some(0),
        };
        let transaction = match self.get_transaction_with_config(signature, config).await {
            Ok(transaction) => transaction,
            // A transaction that is not indexed yet comes back as a null result.
            Err(err) if matches!(err.kind(), ClientErrorKind::SerdeJson(_)) => return Ok(None),
            Err(err) => return Err(network_error(err)),
        };
        let Some(meta) = transaction.transaction.meta else {
            return Ok(None);
        };
        let logs = match meta.log_messages {
            OptionSerializer::Some(logs) => logs,
            _ => Vec::new(),
        };
        Ok(Some(TransactionReceipt {
            logs,
            failure: meta.err,
        }))
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .get_account_with_commitment(address, self.commitment())
            .await
            .map_err(network_error)?;
        Ok(response.value.map(|account| account.data))
    }

    async fn multiple_account_data(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        let accounts = self
            .get_multiple_accounts(addresses)
            .await
            .map_err(network_error)?;
        Ok(accounts
            .into_iter()
            .map(|account| account.map(|account| account.data))
            .collect())
    }

    async fn program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
        data_slice: Option<DataSlice>,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        let filters = filters
            .iter()
            .map(|filter| match filter {
                AccountFilter::Memcmp { offset, bytes } => {
                    RpcFilterType::Memcmp(Memcmp::new_base58_encoded(*offset, bytes))
                }
            })
            .collect();
        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                data_slice: data_slice.map(|slice| UiDataSliceConfig {
                    offset: slice.offset,
                    length: slice.length,
                }),
                commitment: Some(self.commitment()),
                min_context_slot: None,
            },
            ..RpcProgramAccountsConfig::default()
        };
        let accounts = self
            .get_program_accounts_with_config(program_id, config)
            .await
            .map_err(network_error)?;
        Ok(accounts
            .into_iter()
            .map(|(address, account)| (address, account.data))
            .collect())
    }
}
