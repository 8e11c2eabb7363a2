use std::sync::Arc;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{ProgramErrorCode, Result, VotingClientError};
use crate::executor::{DerivedAccounts, TransactionExecutor, TransactionResult};
use crate::instruction::{self, VotingInstruction};
use crate::pda::{self, BLANK_PROPOSAL_ID};
use crate::retry::RetryPolicy;
use crate::rpc::{ChainRpc, SendOptions};
use crate::scanner::{AccountScanner, Pagination};
use crate::state::{
    AccountRecord, GlobalAccount, ProposalAccount, SessionAccount, VoterAccount, VotingSession,
    MAX_PROPOSAL_DESCRIPTION_LEN, MAX_SESSION_DESCRIPTION_LEN, MAX_SESSION_NAME_LEN,
};
use crate::status::{RawSessionStatus, SessionStatus};
use crate::subscription::EventHub;
use crate::wallet::WalletSigner;

pub const GLOBAL_ACCOUNT: &str = "globalAccount";
pub const SESSION_ACCOUNT: &str = "sessionAccount";
pub const VOTER_ACCOUNT: &str = "voterAccount";
pub const PROPOSAL_ACCOUNT: &str = "proposalAccount";
pub const BLANK_PROPOSAL_ACCOUNT: &str = "blankProposalAccount";

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(VotingClientError::validation(format!(
            "{field} is {} bytes long, at most {max} are allowed",
            value.len()
        )));
    }
    Ok(())
}

/// Typed access to the voting program: one method per instruction plus account reads.
///
/// Every write derives the accounts it needs, submits a single transaction through the
/// [`TransactionExecutor`] and forwards the resulting events to [`VotingClient::events`].
pub struct VotingClient {
    rpc: Arc<dyn ChainRpc>,
    program_id: Pubkey,
    executor: TransactionExecutor,
    scanner: AccountScanner,
    events: EventHub,
}

impl VotingClient {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        program_id: Pubkey,
        options: SendOptions,
        event_retry: RetryPolicy,
    ) -> Self {
        Self {
            executor: TransactionExecutor::new(rpc.clone(), program_id, options, event_retry),
            scanner: AccountScanner::new(rpc.clone(), program_id),
            rpc,
            program_id,
            events: EventHub::new(),
        }
    }

    /// Connects to the JSON-RPC endpoint named in `config`.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let options = config.send_options()?;
        let rpc = RpcClient::new_with_commitment(config.rpc_url.clone(), options.commitment);
        Ok(Self::new(
            Arc::new(rpc),
            config.program_id()?,
            options,
            config.retry_policy(),
        ))
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn send_options(&self) -> &SendOptions {
        self.executor.options()
    }

    /// Listeners registered here see the events of every transaction this client submits.
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn find_global_address(&self) -> Pubkey {
        pda::find_global_address(&self.program_id)
    }

    pub fn find_session_address(&self, session_id: u64) -> Pubkey {
        pda::find_session_address(&self.program_id, session_id)
    }

    pub fn find_voter_address(&self, session_id: u64, voter: &Pubkey) -> Pubkey {
        pda::find_voter_address(&self.program_id, session_id, voter)
    }

    pub fn find_proposal_address(&self, session_id: u64, proposal_id: u8) -> Pubkey {
        pda::find_proposal_address(&self.program_id, session_id, proposal_id)
    }

    pub fn map_session_status(&self, raw: RawSessionStatus) -> Result<SessionStatus> {
        crate::status::map_session_status(raw)
    }

    async fn submit(
        &self,
        wallet: &dyn WalletSigner,
        instruction: Instruction,
        accounts: DerivedAccounts,
    ) -> Result<TransactionResult> {
        let result = self.executor.execute(wallet, &[instruction], accounts).await?;
        self.events
            .dispatch(&result.signature, result.events.as_slice());
        Ok(result)
    }

    pub async fn init_global(&self, payer: &dyn WalletSigner) -> Result<TransactionResult> {
        let global = self.find_global_address();
        let ix = instruction::init_global(&self.program_id, &payer.pubkey(), &global)?;
        let result = self
            .submit(payer, ix, DerivedAccounts::new().with(GLOBAL_ACCOUNT, global))
            .await?;
        info!(signature = %result.signature, %global, "Global account initialized");
        Ok(result)
    }

    /// Identifier the next created session will get.
    pub async fn next_session_id(&self) -> Result<u64> {
        let global: GlobalAccount = self.fetch(&self.find_global_address()).await?;
        Ok(global.session_count)
    }

    /// Creates a session administered by `owner`.
    pub async fn create_voting_session(
        &self,
        owner: &dyn WalletSigner,
        name: &str,
        description: &str,
    ) -> Result<TransactionResult> {
        check_len("session name", name, MAX_SESSION_NAME_LEN)?;
        check_len("session description", description, MAX_SESSION_DESCRIPTION_LEN)?;

        let session_id = self.next_session_id().await?;
        let global = self.find_global_address();
        let session = self.find_session_address(session_id);
        let ix = instruction::create_voting_session(
            &self.program_id,
            &owner.pubkey(),
            &session,
            &global,
            name.to_string(),
            description.to_string(),
        )?;
        let accounts = DerivedAccounts::new()
            .with(GLOBAL_ACCOUNT, global)
            .with(SESSION_ACCOUNT, session);
        let result = self.submit(owner, ix, accounts).await?;
        info!(signature = %result.signature, session_id, "Voting session created");
        Ok(result)
    }

    pub async fn register_voter(
        &self,
        admin: &dyn WalletSigner,
        session_id: u64,
        voter: Pubkey,
    ) -> Result<TransactionResult> {
        let session = self.find_session_address(session_id);
        let voter_account = self.find_voter_address(session_id, &voter);
        let ix = instruction::register_voter(
            &self.program_id,
            &admin.pubkey(),
            &session,
            &voter_account,
            voter,
        )?;
        let accounts = DerivedAccounts::new()
            .with(SESSION_ACCOUNT, session)
            .with(VOTER_ACCOUNT, voter_account);
        let result = self.submit(admin, ix, accounts).await?;
        info!(signature = %result.signature, session_id, %voter, "Voter registered");
        Ok(result)
    }

    /// Opens proposal registration. The program creates the blank proposal at the same time.
    pub async fn start_proposals_registration(
        &self,
        admin: &dyn WalletSigner,
        session_id: u64,
    ) -> Result<TransactionResult> {
        let session = self.find_session_address(session_id);
        let blank = self.find_proposal_address(session_id, BLANK_PROPOSAL_ID);
        let ix = instruction::start_proposals_registration(
            &self.program_id,
            &admin.pubkey(),
            &session,
            &blank,
        )?;
        let accounts = DerivedAccounts::new()
            .with(SESSION_ACCOUNT, session)
            .with(BLANK_PROPOSAL_ACCOUNT, blank);
        let result = self.submit(admin, ix, accounts).await?;
        info!(signature = %result.signature, session_id, "Proposals registration started");
        Ok(result)
    }

    pub async fn stop_proposals_registration(
        &self,
        admin: &dyn WalletSigner,
        session_id: u64,
    ) -> Result<TransactionResult> {
        self.transition(admin, session_id, VotingInstruction::StopProposalsRegistration)
            .await
    }

    pub async fn start_voting_session(
        &self,
        admin: &dyn WalletSigner,
        session_id: u64,
    ) -> Result<TransactionResult> {
        self.transition(admin, session_id, VotingInstruction::StartVotingSession)
            .await
    }

    pub async fn stop_voting_session(
        &self,
        admin: &dyn WalletSigner,
        session_id: u64,
    ) -> Result<TransactionResult> {
        self.transition(admin, session_id, VotingInstruction::StopVotingSession)
            .await
    }

    async fn transition(
        &self,
        admin: &dyn WalletSigner,
        session_id: u64,
        step: VotingInstruction,
    ) -> Result<TransactionResult> {
        let session = self.find_session_address(session_id);
        let name = step.name();
        let ix =
            instruction::session_transition(&self.program_id, step, &admin.pubkey(), &session)?;
        let result = self
            .submit(admin, ix, DerivedAccounts::new().with(SESSION_ACCOUNT, session))
            .await?;
        info!(
            signature = %result.signature,
            session_id,
            instruction = name,
            "Session status advanced"
        );
        Ok(result)
    }

    /// Registers a proposal by `proposer`, who must be a registered voter of the session.
    pub async fn register_proposal(
        &self,
        proposer: &dyn WalletSigner,
        session_id: u64,
        description: &str,
    ) -> Result<TransactionResult> {
        check_len("proposal description", description, MAX_PROPOSAL_DESCRIPTION_LEN)?;

        let current: SessionAccount = self.fetch(&self.find_session_address(session_id)).await?;
        let proposal_id = pda::proposal_id_from_index(u32::from(current.proposals_count))?;

        let proposer_key = proposer.pubkey();
        let session = self.find_session_address(session_id);
        let voter_account = self.find_voter_address(session_id, &proposer_key);
        let proposal = self.find_proposal_address(session_id, proposal_id);
        let ix = instruction::register_proposal(
            &self.program_id,
            &proposer_key,
            &session,
            &voter_account,
            &proposal,
            description.to_string(),
        )?;
        let accounts = DerivedAccounts::new()
            .with(SESSION_ACCOUNT, session)
            .with(VOTER_ACCOUNT, voter_account)
            .with(PROPOSAL_ACCOUNT, proposal);
        let result = self.submit(proposer, ix, accounts).await?;
        info!(signature = %result.signature, session_id, proposal_id, "Proposal registered");
        Ok(result)
    }

    pub async fn vote(
        &self,
        voter: &dyn WalletSigner,
        session_id: u64,
        proposal_id: u8,
    ) -> Result<TransactionResult> {
        let proposal_id = pda::ensure_proposal_id(proposal_id)?;
        let voter_key = voter.pubkey();
        let session = self.find_session_address(session_id);
        let voter_account = self.find_voter_address(session_id, &voter_key);
        let proposal = self.find_proposal_address(session_id, proposal_id);
        let ix = instruction::vote(
            &self.program_id,
            &voter_key,
            &session,
            &voter_account,
            &proposal,
        )?;
        let accounts = DerivedAccounts::new()
            .with(SESSION_ACCOUNT, session)
            .with(VOTER_ACCOUNT, voter_account)
            .with(PROPOSAL_ACCOUNT, proposal);
        let result = self.submit(voter, ix, accounts).await?;
        info!(signature = %result.signature, session_id, proposal_id, "Vote cast");
        Ok(result)
    }

    /// Tallies the session. Every proposal account, the blank one included, is passed
    /// to the program.
    pub async fn tally_votes(
        &self,
        admin: &dyn WalletSigner,
        session_id: u64,
    ) -> Result<TransactionResult> {
        let session = self.find_session_address(session_id);
        let current: SessionAccount = self.fetch(&session).await?;
        let proposals: Vec<Pubkey> = (BLANK_PROPOSAL_ID..current.proposals_count)
            .map(|proposal_id| self.find_proposal_address(session_id, proposal_id))
            .collect();

        let ix = instruction::tally_votes(&self.program_id, &admin.pubkey(), &session, &proposals)?;
        let result = self
            .submit(admin, ix, DerivedAccounts::new().with(SESSION_ACCOUNT, session))
            .await?;
        info!(
            signature = %result.signature,
            session_id,
            proposals = proposals.len(),
            "Votes tallied"
        );
        Ok(result)
    }

    /// Reads and decodes one account. A missing account is reported the way the program
    /// reports it, as [`ProgramErrorCode::AccountNotInitialized`].
    async fn fetch<T: AccountRecord>(&self, address: &Pubkey) -> Result<T> {
        match self.rpc.account_data(address).await? {
            Some(data) => T::try_from_account_data(&data),
            None => Err(VotingClientError::Program(
                ProgramErrorCode::AccountNotInitialized.into(),
            )),
        }
    }

    pub async fn global_account(&self) -> Result<GlobalAccount> {
        self.fetch(&self.find_global_address()).await
    }

    pub async fn get_session(&self, address: &Pubkey) -> Result<VotingSession> {
        let account: SessionAccount = self.fetch(address).await?;
        VotingSession::from_account(*address, account)
    }

    pub async fn get_session_by_id(&self, session_id: u64) -> Result<VotingSession> {
        self.get_session(&self.find_session_address(session_id)).await
    }

    pub async fn get_voter(&self, session_id: u64, voter: &Pubkey) -> Result<VoterAccount> {
        self.fetch(&self.find_voter_address(session_id, voter)).await
    }

    pub async fn get_proposal(&self, session_id: u64, proposal_id: u8) -> Result<ProposalAccount> {
        let proposal_id = pda::ensure_proposal_id(proposal_id)?;
        self.fetch(&self.find_proposal_address(session_id, proposal_id))
            .await
    }

    /// Sessions ordered by id.
    pub async fn list_sessions(&self, pagination: Pagination) -> Result<Vec<VotingSession>> {
        let addresses = self.scanner.scan_records::<SessionAccount>(None).await?;
        self.scanner
            .page::<SessionAccount>(&addresses, pagination)
            .await?
            .into_iter()
            .map(|(address, account)| VotingSession::from_account(address, account))
            .collect()
    }

    /// Voters of a session ordered by voter id.
    pub async fn list_voters(
        &self,
        session_id: u64,
        pagination: Pagination,
    ) -> Result<Vec<VoterAccount>> {
        let addresses = self
            .scanner
            .scan_records::<VoterAccount>(Some(session_id))
            .await?;
        let records = self
            .scanner
            .page::<VoterAccount>(&addresses, pagination)
            .await?;
        Ok(records.into_iter().map(|(_, voter)| voter).collect())
    }

    /// Proposals of a session ordered by proposal id, the blank proposal first.
    pub async fn list_proposals(
        &self,
        session_id: u64,
        pagination: Pagination,
    ) -> Result<Vec<ProposalAccount>> {
        let addresses = self
            .scanner
            .scan_records::<ProposalAccount>(Some(session_id))
            .await?;
        let records = self
            .scanner
            .page::<ProposalAccount>(&addresses, pagination)
            .await?;
        Ok(records.into_iter().map(|(_, proposal)| proposal).collect())
    }
}
