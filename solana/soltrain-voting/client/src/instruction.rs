use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::pubkey::Pubkey;
use solana_program::system_program;

use crate::error::{Result, VotingClientError};
use crate::state::{discriminator, DISCRIMINATOR_LEN};

/// Instructions understood by the voting program, with their arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VotingInstruction {
    InitGlobal,
    CreateVotingSession { name: String, description: String },
    RegisterVoter { voter: Pubkey },
    StartProposalsRegistration,
    StopProposalsRegistration,
    StartVotingSession,
    StopVotingSession,
    RegisterProposal { description: String },
    Vote,
    TallyVotes,
}

const INSTRUCTION_NAMES: [&str; 10] = [
    "init_global",
    "create_voting_session",
    "register_voter",
    "start_proposals_registration",
    "stop_proposals_registration",
    "start_voting_session",
    "stop_voting_session",
    "register_proposal",
    "vote",
    "tally_votes",
];

impl VotingInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            VotingInstruction::InitGlobal => INSTRUCTION_NAMES[0],
            VotingInstruction::CreateVotingSession { .. } => INSTRUCTION_NAMES[1],
            VotingInstruction::RegisterVoter { .. } => INSTRUCTION_NAMES[2],
            VotingInstruction::StartProposalsRegistration => INSTRUCTION_NAMES[3],
            VotingInstruction::StopProposalsRegistration => INSTRUCTION_NAMES[4],
            VotingInstruction::StartVotingSession => INSTRUCTION_NAMES[5],
            VotingInstruction::StopVotingSession => INSTRUCTION_NAMES[6],
            VotingInstruction::RegisterProposal { .. } => INSTRUCTION_NAMES[7],
            VotingInstruction::Vote => INSTRUCTION_NAMES[8],
            VotingInstruction::TallyVotes => INSTRUCTION_NAMES[9],
        }
    }

    /// Instruction data: the eight byte instruction discriminator followed by the
    /// Borsh-encoded arguments.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let mut data = discriminator("global", self.name()).to_vec();
        match self {
            VotingInstruction::CreateVotingSession { name, description } => {
                name.serialize(&mut data)?;
                description.serialize(&mut data)?;
            }
            VotingInstruction::RegisterVoter { voter } => voter.serialize(&mut data)?,
            VotingInstruction::RegisterProposal { description } => {
                description.serialize(&mut data)?
            }
            _ => {}
        }
        Ok(data)
    }

    pub fn unpack(input: &[u8]) -> Result<Self> {
        if input.len() < DISCRIMINATOR_LEN {
            return Err(VotingClientError::decode(
                "instruction",
                "data shorter than a discriminator",
            ));
        }
        let (tag, mut rest) = input.split_at(DISCRIMINATOR_LEN);
        let name = INSTRUCTION_NAMES
            .iter()
            .find(|name| discriminator("global", name) == tag)
            .ok_or_else(|| VotingClientError::decode("instruction", "unknown discriminator"))?;

        let instruction = match *name {
            "init_global" => VotingInstruction::InitGlobal,
            "create_voting_session" => VotingInstruction::CreateVotingSession {
                name: String::deserialize(&mut rest)?,
                description: String::deserialize(&mut rest)?,
            },
            "register_voter" => VotingInstruction::RegisterVoter {
                voter: Pubkey::deserialize(&mut rest)?,
            },
            "start_proposals_registration" => VotingInstruction::StartProposalsRegistration,
            "stop_proposals_registration" => VotingInstruction::StopProposalsRegistration,
            "start_voting_session" => VotingInstruction::StartVotingSession,
            "stop_voting_session" => VotingInstruction::StopVotingSession,
            "register_proposal" => VotingInstruction::RegisterProposal {
                description: String::deserialize(&mut rest)?,
            },
            "vote" => VotingInstruction::Vote,
            _ => VotingInstruction::TallyVotes,
        };
        if !rest.is_empty() {
            return Err(VotingClientError::decode(
                "instruction",
                format!("{} unexpected trailing bytes", rest.len()),
            ));
        }
        Ok(instruction)
    }
}

fn build(
    program_id: &Pubkey,
    instruction: &VotingInstruction,
    accounts: Vec<AccountMeta>,
) -> Result<Instruction> {
    Ok(Instruction::new_with_bytes(
        *program_id,
        &instruction.pack()?,
        accounts,
    ))
}

pub fn init_global(program_id: &Pubkey, owner: &Pubkey, global: &Pubkey) -> Result<Instruction> {
    build(
        program_id,
        &VotingInstruction::InitGlobal,
        vec![
            AccountMeta::new(*global, false),
            AccountMeta::new(*owner, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

pub fn create_voting_session(
    program_id: &Pubkey,
    owner: &Pubkey,
    session: &Pubkey,
    global: &Pubkey,
    name: String,
    description: String,
) -> Result<Instruction> {
    build(
        program_id,
        &VotingInstruction::CreateVotingSession { name, description },
        vec![
            AccountMeta::new(*session, false),
            AccountMeta::new(*global, false),
            AccountMeta::new(*owner, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

pub fn register_voter(
    program_id: &Pubkey,
    admin: &Pubkey,
    session: &Pubkey,
    voter_account: &Pubkey,
    voter: Pubkey,
) -> Result<Instruction> {
    build(
        program_id,
        &VotingInstruction::RegisterVoter { voter },
        vec![
            AccountMeta::new(*admin, true),
            AccountMeta::new(*session, false),
            AccountMeta::new(*voter_account, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

pub fn start_proposals_registration(
    program_id: &Pubkey,
    admin: &Pubkey,
    session: &Pubkey,
    blank_proposal: &Pubkey,
) -> Result<Instruction> {
    build(
        program_id,
        &VotingInstruction::StartProposalsRegistration,
        vec![
            AccountMeta::new(*admin, true),
            AccountMeta::new(*session, false),
            AccountMeta::new(*blank_proposal, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

/// Builds one of the transitions that only touch the session account.
pub fn session_transition(
    program_id: &Pubkey,
    instruction: VotingInstruction,
    admin: &Pubkey,
    session: &Pubkey,
) -> Result<Instruction> {
    match instruction {
        VotingInstruction::StopProposalsRegistration
        | VotingInstruction::StartVotingSession
        | VotingInstruction::StopVotingSession => build(
            program_id,
            &instruction,
            vec![
                AccountMeta::new(*admin, true),
                AccountMeta::new(*session, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        ),
        other => Err(VotingClientError::validation(format!(
            "`{}` is not a plain session transition",
            other.name()
        ))),
    }
}

pub fn register_proposal(
    program_id: &Pubkey,
    proposer: &Pubkey,
    session: &Pubkey,
    voter_account: &Pubkey,
    proposal: &Pubkey,
    description: String,
) -> Result<Instruction> {
    build(
        program_id,
        &VotingInstruction::RegisterProposal { description },
        vec![
            AccountMeta::new(*proposer, true),
            AccountMeta::new(*session, false),
            AccountMeta::new(*voter_account, false),
            AccountMeta::new(*proposal, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

pub fn vote(
    program_id: &Pubkey,
    voter: &Pubkey,
    session: &Pubkey,
    voter_account: &Pubkey,
    proposal: &Pubkey,
) -> Result<Instruction> {
    build(
        program_id,
        &VotingInstruction::Vote,
        vec![
            AccountMeta::new(*voter, true),
            AccountMeta::new_readonly(*session, false),
            AccountMeta::new(*voter_account, false),
            AccountMeta::new(*proposal, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

/// `proposals` must list every proposal account of the session; the program rejects
/// the tally otherwise.
pub fn tally_votes(
    program_id: &Pubkey,
    admin: &Pubkey,
    session: &Pubkey,
    proposals: &[Pubkey],
) -> Result<Instruction> {
    let mut accounts = vec![
        AccountMeta::new(*admin, true),
        AccountMeta::new(*session, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    accounts.extend(
        proposals
            .iter()
            .map(|proposal| AccountMeta::new_readonly(*proposal, false)),
    );
    build(program_id, &VotingInstruction::TallyVotes, accounts)
}
