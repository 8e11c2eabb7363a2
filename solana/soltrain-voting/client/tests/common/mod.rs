//! In-memory chain running a model of the voting program, for driving the client in
//! tests without a validator.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use borsh::BorshSerialize;
use solana_client::rpc_request::MAX_MULTIPLE_ACCOUNTS;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::InstructionError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::{Transaction, TransactionError};
use soltrain_voting_client::error::{ProgramErrorCode, Result, VotingClientError};
use soltrain_voting_client::event::{
    ProgramEvent, ProposalRegistered, SessionCreated, SessionWorkflowStatusChanged,
    VoterRegistered, Voted, VotesTallied,
};
use soltrain_voting_client::instruction::VotingInstruction;
use soltrain_voting_client::pda::{
    find_global_address, find_proposal_address, find_session_address, find_voter_address,
    BLANK_PROPOSAL_ID,
};
use soltrain_voting_client::rpc::{AccountFilter, DataSlice};
use soltrain_voting_client::state::{
    AccountRecord, GlobalAccount, ProposalAccount, SessionAccount, VoterAccount, VotingResult,
};
use soltrain_voting_client::{
    ChainRpc, RawSessionStatus, RetryPolicy, SendOptions, SessionStatus, TransactionReceipt,
    VotingClient,
};

/// Zero bytes appended to every stored account, like the fixed allocation on chain.
const ACCOUNT_PADDING: usize = 32;

type ProgramResult<T = ()> = std::result::Result<T, ProgramErrorCode>;

#[derive(Default)]
struct ChainState {
    accounts: BTreeMap<Pubkey, Vec<u8>>,
    receipts: HashMap<Signature, TransactionReceipt>,
    /// Polls left before a receipt becomes visible.
    hidden_polls: HashMap<Signature, u32>,
    index_delay: u32,
    offline: bool,
    submitted: usize,
    receipt_polls: usize,
    account_batches: Vec<usize>,
}

pub struct MockChain {
    program_id: Pubkey,
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            program_id: soltrain_voting_client::ID,
            state: Mutex::new(ChainState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Receipts of later transactions stay invisible for `polls` lookups.
    pub fn set_index_delay(&self, polls: u32) {
        self.state().index_delay = polls;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn submitted(&self) -> usize {
        self.state().submitted
    }

    pub fn receipt_polls(&self) -> usize {
        self.state().receipt_polls
    }

    /// Sizes of the `multiple_account_data` requests served so far.
    pub fn account_batches(&self) -> Vec<usize> {
        self.state().account_batches.clone()
    }

    pub fn remove_account(&self, address: &Pubkey) {
        self.state().accounts.remove(address);
    }

    fn check_online(&self) -> Result<()> {
        if self.state().offline {
            return Err(VotingClientError::network(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }

    fn execute(
        &self,
        accounts: &mut BTreeMap<Pubkey, Vec<u8>>,
        transaction: &Transaction,
        logs: &mut Vec<String>,
    ) -> ProgramResult {
        let message = &transaction.message;
        for compiled in &message.instructions {
            let program = message.account_keys[compiled.program_id_index as usize];
            let keys: Vec<Pubkey> = compiled
                .accounts
                .iter()
                .map(|index| message.account_keys[*index as usize])
                .collect();
            logs.push(format!("Program {program} invoke [1]"));
            let instruction = VotingInstruction::unpack(&compiled.data)
                .map_err(|_| ProgramErrorCode::InvalidAccountType)?;
            logs.push(format!("Program log: Instruction: {}", instruction.name()));
            let mut program_state = Program {
                program_id: self.program_id,
                accounts: &mut *accounts,
                logs: &mut *logs,
            };
            match program_state.process(instruction, &keys) {
                Ok(()) => logs.push(format!("Program {program} success")),
                Err(code) => {
                    logs.push(format!(
                        "Program {program} failed: custom program error: {:#x}",
                        code.code()
                    ));
                    return Err(code);
                }
            }
        }
        Ok(())
    }
}

fn node_error(message: impl Into<String>) -> VotingClientError {
    VotingClientError::network(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        message.into(),
    ))
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.check_online()?;
        Ok(Hash::new_unique())
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature> {
        self.check_online()?;
        transaction
            .verify()
            .map_err(|err| VotingClientError::Submission(err.to_string()))?;

        let mut state = self.state();
        state.submitted += 1;
        let signature = transaction.signatures[0];

        let mut accounts = state.accounts.clone();
        let mut logs = Vec::new();
        let failure = match self.execute(&mut accounts, transaction, &mut logs) {
            Ok(()) => {
                state.accounts = accounts;
                None
            }
            Err(code) => {
                let failure =
                    TransactionError::InstructionError(0, InstructionError::Custom(code.code()));
                if !options.skip_preflight {
                    // Preflight simulation rejects the transaction before it lands.
                    return Err(VotingClientError::from_transaction_error(&failure));
                }
                Some(failure)
            }
        };

        let delay = state.index_delay;
        state.hidden_polls.insert(signature, delay);
        state
            .receipts
            .insert(signature, TransactionReceipt { logs, failure });
        Ok(signature)
    }

    async fn transaction_receipt(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<TransactionReceipt>> {
        self.check_online()?;
        if !commitment.is_at_least_confirmed() {
            return Err(node_error(
                "Method does not support commitment below `confirmed`",
            ));
        }
        let mut state = self.state();
        state.receipt_polls += 1;
        if let Some(hidden) = state.hidden_polls.get_mut(signature) {
            if *hidden > 0 {
                *hidden -= 1;
                return Ok(None);
            }
        }
        Ok(state.receipts.get(signature).cloned())
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        Ok(self.state().accounts.get(address).cloned())
    }

    async fn multiple_account_data(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        self.check_online()?;
        if addresses.len() > MAX_MULTIPLE_ACCOUNTS {
            return Err(node_error(format!(
                "Too many inputs provided; max {MAX_MULTIPLE_ACCOUNTS}"
            )));
        }
        let mut state = self.state();
        state.account_batches.push(addresses.len());
        Ok(addresses
            .iter()
            .map(|address| state.accounts.get(address).cloned())
            .collect())
    }

    async fn program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
        data_slice: Option<DataSlice>,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        self.check_online()?;
        if *program_id != self.program_id {
            return Ok(Vec::new());
        }
        let state = self.state();
        // Node ordering is unspecified; hand accounts back in reverse to catch reliance on it.
        Ok(state
            .accounts
            .iter()
            .rev()
            .filter(|(_, data)| filters.iter().all(|filter| filter.matches(data)))
            .map(|(address, data)| {
                let data = match data_slice {
                    Some(slice) => slice.apply(data),
                    None => data.clone(),
                };
                (*address, data)
            })
            .collect())
    }
}

/// Model of the on-chain voting program operating on the chain's account map.
struct Program<'a> {
    program_id: Pubkey,
    accounts: &'a mut BTreeMap<Pubkey, Vec<u8>>,
    logs: &'a mut Vec<String>,
}

impl Program<'_> {
    fn load<T: AccountRecord>(&self, address: &Pubkey) -> ProgramResult<T> {
        let data = self
            .accounts
            .get(address)
            .ok_or(ProgramErrorCode::AccountNotInitialized)?;
        T::try_from_account_data(data).map_err(|_| ProgramErrorCode::AccountDidNotDeserialize)
    }

    fn store<T: AccountRecord>(&mut self, address: Pubkey, record: &T) {
        let mut data = T::discriminator().to_vec();
        data.extend(borsh::to_vec(record).unwrap());
        data.extend(std::iter::repeat(0).take(ACCOUNT_PADDING));
        self.accounts.insert(address, data);
    }

    fn create<T: AccountRecord>(&mut self, address: Pubkey, record: &T) -> ProgramResult {
        if self.accounts.contains_key(&address) {
            // Allocating an address that is already in use fails.
            return Err(ProgramErrorCode::ConstraintSeeds);
        }
        self.store(address, record);
        Ok(())
    }

    fn emit<E: ProgramEvent>(&mut self, event: &E) {
        let mut payload = E::KIND.discriminator().to_vec();
        event.serialize(&mut payload).unwrap();
        self.logs
            .push(format!("Program data: {}", STANDARD.encode(payload)));
    }

    fn emit_status_change(&mut self, session_id: u64, from: SessionStatus, to: SessionStatus) {
        self.emit(&SessionWorkflowStatusChanged {
            session_id,
            previous_status: from.into(),
            current_status: to.into(),
        });
    }

    fn process(&mut self, instruction: VotingInstruction, keys: &[Pubkey]) -> ProgramResult {
        match instruction {
            VotingInstruction::InitGlobal => self.init_global(keys),
            VotingInstruction::CreateVotingSession { name, description } => {
                self.create_voting_session(keys, name, description)
            }
            VotingInstruction::RegisterVoter { voter } => self.register_voter(keys, voter),
            VotingInstruction::StartProposalsRegistration => {
                self.start_proposals_registration(keys)
            }
            VotingInstruction::StopProposalsRegistration => self.advance(
                keys,
                SessionStatus::ProposalsRegistrationStarted,
                SessionStatus::ProposalsRegistrationEnded,
            ),
            VotingInstruction::StartVotingSession => self.advance(
                keys,
                SessionStatus::ProposalsRegistrationEnded,
                SessionStatus::VotingSessionStarted,
            ),
            VotingInstruction::StopVotingSession => self.advance(
                keys,
                SessionStatus::VotingSessionStarted,
                SessionStatus::VotingSessionEnded,
            ),
            VotingInstruction::RegisterProposal { description } => {
                self.register_proposal(keys, description)
            }
            VotingInstruction::Vote => self.vote(keys),
            VotingInstruction::TallyVotes => self.tally_votes(keys),
        }
    }

    fn expect_address(provided: &Pubkey, expected: Pubkey) -> ProgramResult {
        if *provided != expected {
            return Err(ProgramErrorCode::ConstraintSeeds);
        }
        Ok(())
    }

    fn session(&self, address: &Pubkey) -> ProgramResult<(SessionAccount, SessionStatus)> {
        let session: SessionAccount = self.load(address)?;
        let status = soltrain_voting_client::map_session_status(session.status)
            .map_err(|_| ProgramErrorCode::AccountDidNotDeserialize)?;
        Ok((session, status))
    }

    fn init_global(&mut self, keys: &[Pubkey]) -> ProgramResult {
        let global = keys[0];
        Self::expect_address(&global, find_global_address(&self.program_id))?;
        self.create(global, &GlobalAccount { session_count: 0 })
    }

    fn create_voting_session(
        &mut self,
        keys: &[Pubkey],
        name: String,
        description: String,
    ) -> ProgramResult {
        let (session_address, global_address, owner) = (keys[0], keys[1], keys[2]);
        let mut global: GlobalAccount = self.load(&global_address)?;
        let session_id = global.session_count;
        Self::expect_address(
            &session_address,
            find_session_address(&self.program_id, session_id),
        )?;

        let session = SessionAccount {
            admin: owner,
            session_id,
            name: name.clone(),
            description: description.clone(),
            status: SessionStatus::RegisteringVoters.into(),
            voters_count: 0,
            proposals_count: 1,
            result: VotingResult::default(),
        };
        self.create(session_address, &session)?;
        global.session_count += 1;
        self.store(global_address, &global);

        self.emit_status_change(
            session_id,
            SessionStatus::None,
            SessionStatus::RegisteringVoters,
        );
        self.emit(&SessionCreated {
            session_id,
            name,
            description,
        });
        Ok(())
    }

    fn register_voter(&mut self, keys: &[Pubkey], voter: Pubkey) -> ProgramResult {
        let (admin, session_address, voter_address) = (keys[0], keys[1], keys[2]);
        let (mut session, status) = self.session(&session_address)?;
        Self::expect_address(
            &voter_address,
            find_voter_address(&self.program_id, session.session_id, &voter),
        )?;
        if session.admin != admin {
            return Err(ProgramErrorCode::ForbiddenAsNonAdmin);
        }
        if status != SessionStatus::RegisteringVoters {
            return Err(ProgramErrorCode::UnexpectedSessionStatus);
        }
        if voter == admin {
            return Err(ProgramErrorCode::AdminForbiddenAsVoter);
        }
        if self.accounts.contains_key(&voter_address) {
            return Err(ProgramErrorCode::VoterAlreadyRegistered);
        }

        session.voters_count += 1;
        let record = VoterAccount {
            session_id: session.session_id,
            voter,
            voter_id: session.voters_count,
            has_voted: false,
            voted_proposal_id: 0,
            nb_proposals: 0,
        };
        self.create(voter_address, &record)?;
        self.store(session_address, &session);
        self.emit(&VoterRegistered {
            session_id: session.session_id,
            voter,
        });
        Ok(())
    }

    fn start_proposals_registration(&mut self, keys: &[Pubkey]) -> ProgramResult {
        let (admin, session_address, blank_address) = (keys[0], keys[1], keys[2]);
        let (mut session, status) = self.session(&session_address)?;
        if session.admin != admin {
            return Err(ProgramErrorCode::ForbiddenAsNonAdmin);
        }
        if status != SessionStatus::RegisteringVoters {
            return Err(ProgramErrorCode::UnexpectedSessionStatus);
        }
        Self::expect_address(
            &blank_address,
            find_proposal_address(&self.program_id, session.session_id, BLANK_PROPOSAL_ID),
        )?;

        let blank = ProposalAccount {
            session_id: session.session_id,
            proposal_id: BLANK_PROPOSAL_ID,
            description: "blank".to_string(),
            proposer: admin,
            vote_count: 0,
        };
        self.create(blank_address, &blank)?;
        session.proposals_count = BLANK_PROPOSAL_ID + 1;
        session.status = SessionStatus::ProposalsRegistrationStarted.into();
        self.store(session_address, &session);

        self.emit(&ProposalRegistered {
            session_id: session.session_id,
            proposal_id: BLANK_PROPOSAL_ID,
            description: blank.description,
        });
        self.emit_status_change(
            session.session_id,
            SessionStatus::RegisteringVoters,
            SessionStatus::ProposalsRegistrationStarted,
        );
        Ok(())
    }

    fn advance(
        &mut self,
        keys: &[Pubkey],
        from: SessionStatus,
        to: SessionStatus,
    ) -> ProgramResult {
        let (admin, session_address) = (keys[0], keys[1]);
        let (mut session, status) = self.session(&session_address)?;
        if session.admin != admin {
            return Err(ProgramErrorCode::ForbiddenAsNonAdmin);
        }
        if status != from {
            return Err(ProgramErrorCode::UnexpectedSessionStatus);
        }
        session.status = to.into();
        self.store(session_address, &session);
        self.emit_status_change(session.session_id, from, to);
        Ok(())
    }

    fn register_proposal(&mut self, keys: &[Pubkey], description: String) -> ProgramResult {
        let (proposer, session_address, voter_address, proposal_address) =
            (keys[0], keys[1], keys[2], keys[3]);
        let (mut session, status) = self.session(&session_address)?;
        let mut voter: VoterAccount = self.load(&voter_address)?;
        let proposal_id = session.proposals_count;
        Self::expect_address(
            &proposal_address,
            find_proposal_address(&self.program_id, session.session_id, proposal_id),
        )?;
        if proposer == session.admin {
            return Err(ProgramErrorCode::ForbiddenAsAdmin);
        }
        if voter.voter != proposer {
            return Err(ProgramErrorCode::ProposerNotRegistered);
        }
        if status != SessionStatus::ProposalsRegistrationStarted {
            return Err(ProgramErrorCode::UnexpectedSessionStatus);
        }

        let proposal = ProposalAccount {
            session_id: session.session_id,
            proposal_id,
            description: description.clone(),
            proposer,
            vote_count: 0,
        };
        self.create(proposal_address, &proposal)?;
        session.proposals_count += 1;
        voter.nb_proposals += 1;
        self.store(session_address, &session);
        self.store(voter_address, &voter);
        self.emit(&ProposalRegistered {
            session_id: session.session_id,
            proposal_id,
            description,
        });
        Ok(())
    }

    fn vote(&mut self, keys: &[Pubkey]) -> ProgramResult {
        let (signer, session_address, voter_address, proposal_address) =
            (keys[0], keys[1], keys[2], keys[3]);
        let (session, status) = self.session(&session_address)?;
        let mut voter: VoterAccount = self.load(&voter_address)?;
        let mut proposal: ProposalAccount = self.load(&proposal_address)?;
        if status != SessionStatus::VotingSessionStarted {
            return Err(ProgramErrorCode::UnexpectedSessionStatus);
        }
        if signer == session.admin {
            return Err(ProgramErrorCode::AdminForbiddenAsVoter);
        }
        if voter.voter != signer {
            return Err(ProgramErrorCode::UnexpectedVoter);
        }
        if voter.has_voted {
            return Err(ProgramErrorCode::VoterAlreadyVoted);
        }
        if proposal.session_id != session.session_id {
            return Err(ProgramErrorCode::InvalidProposalId);
        }

        voter.has_voted = true;
        voter.voted_proposal_id = proposal.proposal_id;
        proposal.vote_count += 1;
        self.store(voter_address, &voter);
        self.store(proposal_address, &proposal);
        self.emit(&Voted {
            session_id: session.session_id,
            proposal_id: proposal.proposal_id,
            voter: signer,
        });
        Ok(())
    }

    fn tally_votes(&mut self, keys: &[Pubkey]) -> ProgramResult {
        let session_address = keys[1];
        let (mut session, status) = self.session(&session_address)?;
        if status != SessionStatus::VotingSessionEnded {
            return Err(ProgramErrorCode::UnexpectedSessionStatus);
        }
        let remaining = &keys[3..];
        if remaining.len() != usize::from(session.proposals_count) - 1 {
            return Err(ProgramErrorCode::BadProposalAccountsCount);
        }

        let mut proposals = Vec::with_capacity(remaining.len());
        for address in remaining {
            let proposal: ProposalAccount = self.load(address)?;
            if proposal.session_id != session.session_id {
                return Err(ProgramErrorCode::InvalidProposalId);
            }
            proposals.push(proposal);
        }

        let total_votes: u32 = proposals.iter().map(|proposal| proposal.vote_count).sum();
        let blank_votes: u32 = proposals
            .iter()
            .filter(|proposal| proposal.proposal_id == BLANK_PROPOSAL_ID)
            .map(|proposal| proposal.vote_count)
            .sum();
        let max_votes = proposals
            .iter()
            .filter(|proposal| proposal.proposal_id != BLANK_PROPOSAL_ID)
            .map(|proposal| proposal.vote_count)
            .max()
            .unwrap_or(0);
        let mut winning_proposals: Vec<u8> = proposals
            .iter()
            .filter(|proposal| {
                proposal.proposal_id != BLANK_PROPOSAL_ID
                    && max_votes > 0
                    && proposal.vote_count == max_votes
            })
            .map(|proposal| proposal.proposal_id)
            .collect();
        winning_proposals.sort_unstable();

        session.result = VotingResult {
            winning_proposals: winning_proposals.clone(),
            total_votes,
            blank_votes,
            abstention: session.voters_count - total_votes,
        };
        session.status = SessionStatus::VotesTallied.into();
        self.store(session_address, &session);

        self.emit(&VotesTallied {
            session_id: session.session_id,
            voters_count: session.voters_count,
            total_votes,
            blank_votes,
            abstention: session.result.abstention,
            winning_proposals,
        });
        self.emit_status_change(
            session.session_id,
            SessionStatus::VotingSessionEnded,
            SessionStatus::VotesTallied,
        );
        Ok(())
    }
}

/// A wallet whose owner declines every signature request.
pub struct RejectingWallet(pub Keypair);

#[async_trait]
impl soltrain_voting_client::WalletSigner for RejectingWallet {
    fn pubkey(&self) -> Pubkey {
        Signer::pubkey(&self.0)
    }

    async fn sign_transaction(&self, _transaction: Transaction) -> Result<Transaction> {
        Err(VotingClientError::SigningRejected(
            "user declined the request".to_string(),
        ))
    }
}

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(10, Duration::from_millis(1))
}

pub fn client_with(chain: &Arc<MockChain>, options: SendOptions) -> VotingClient {
    VotingClient::new(chain.clone(), chain.program_id(), options, quick_retry())
}

pub fn client(chain: &Arc<MockChain>) -> VotingClient {
    client_with(chain, SendOptions::default())
}

/// A chain with the global counter already initialised.
pub async fn initialized_chain() -> (Arc<MockChain>, VotingClient) {
    let chain = MockChain::new();
    let client = client(&chain);
    client.init_global(&Keypair::new()).await.unwrap();
    (chain, client)
}

/// Creates a session and registers one fresh voter per entry of `voters`.
pub async fn session_with_voters(
    client: &VotingClient,
    admin: &Keypair,
    voters: usize,
) -> (u64, Vec<Keypair>) {
    let session_id = client.next_session_id().await.unwrap();
    client
        .create_voting_session(admin, "Session A", "New session A")
        .await
        .unwrap();
    let voters: Vec<Keypair> = (0..voters).map(|_| Keypair::new()).collect();
    for voter in &voters {
        client
            .register_voter(admin, session_id, voter.pubkey())
            .await
            .unwrap();
    }
    (session_id, voters)
}

pub fn assert_program_error(err: VotingClientError, expected: ProgramErrorCode) {
    assert_eq!(
        err.program_error_code(),
        Some(expected),
        "unexpected error: {err}"
    );
}

pub fn raw(status: SessionStatus) -> RawSessionStatus {
    status.into()
}
