use std::fmt;

use solana_sdk::instruction::InstructionError;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = VotingClientError> = std::result::Result<T, E>;

/// Every failure the client can surface to its caller.
#[derive(Debug, Error)]
pub enum VotingClientError {
    /// Rejected locally, nothing was sent to the chain.
    #[error("invalid argument: {0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(#[source] BoxError),
    #[error("transaction signing rejected: {0}")]
    SigningRejected(String),
    #[error("program error: {0}")]
    Program(VotingProgramError),
    #[error("transaction rejected by node: {0}")]
    Submission(String),
    /// The transaction landed, only reading its events back failed. Do not resubmit.
    #[error("events of transaction {signature} unavailable after {attempts} attempts")]
    EventResolutionTimeout { signature: Signature, attempts: u32 },
    #[error("unrecognized session status tag {0}")]
    CorruptStatus(u8),
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}

impl VotingClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        VotingClientError::Validation(message.into())
    }

    pub fn network(source: impl Into<BoxError>) -> Self {
        VotingClientError::Network(source.into())
    }

    pub fn decode(what: &'static str, reason: impl ToString) -> Self {
        VotingClientError::Decode {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn program(code: u32) -> Self {
        VotingClientError::Program(VotingProgramError::from_code(code))
    }

    /// Returns the typed program error code, if this is a program error with a known code.
    pub fn program_error_code(&self) -> Option<ProgramErrorCode> {
        match self {
            VotingClientError::Program(err) => err.kind,
            _ => None,
        }
    }

    /// Maps a failed transaction to the program error it carries, or to a plain
    /// submission error when the failure did not come from the program itself.
    pub fn from_transaction_error(err: &TransactionError) -> Self {
        match err {
            TransactionError::InstructionError(_, InstructionError::Custom(code)) => {
                VotingClientError::program(*code)
            }
            other => VotingClientError::Submission(other.to_string()),
        }
    }
}

const DISCRIMINATOR_MISMATCH_MSG: &str = "Account discriminator did not match what was expected";
const NOT_INITIALIZED_MSG: &str = "The program expected this account to be already initialized";
const ADMIN_AS_VOTER_MSG: &str = "Voting session administrator can not be registered as voter";

/// Error codes the voting program and its framework report through `Custom` instruction
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramErrorCode {
    ConstraintSeeds,
    AccountDiscriminatorMismatch,
    AccountDidNotDeserialize,
    AccountNotInitialized,
    UnexpectedSessionStatus,
    AdminForbiddenAsVoter,
    ForbiddenAsNonAdmin,
    ForbiddenAsAdmin,
    VoterAlreadyRegistered,
    ProposerNotRegistered,
    VoterAlreadyVoted,
    UnexpectedVoter,
    ForbiddenAbstention,
    InvalidAccountType,
    InvalidProposalId,
    BadProposalAccountsCount,
}

impl ProgramErrorCode {
    pub const ALL: [ProgramErrorCode; 16] = [
        ProgramErrorCode::ConstraintSeeds,
        ProgramErrorCode::AccountDiscriminatorMismatch,
        ProgramErrorCode::AccountDidNotDeserialize,
        ProgramErrorCode::AccountNotInitialized,
        ProgramErrorCode::UnexpectedSessionStatus,
        ProgramErrorCode::AdminForbiddenAsVoter,
        ProgramErrorCode::ForbiddenAsNonAdmin,
        ProgramErrorCode::ForbiddenAsAdmin,
        ProgramErrorCode::VoterAlreadyRegistered,
        ProgramErrorCode::ProposerNotRegistered,
        ProgramErrorCode::VoterAlreadyVoted,
        ProgramErrorCode::UnexpectedVoter,
        ProgramErrorCode::ForbiddenAbstention,
        ProgramErrorCode::InvalidAccountType,
        ProgramErrorCode::InvalidProposalId,
        ProgramErrorCode::BadProposalAccountsCount,
    ];

    pub fn code(self) -> u32 {
        match self {
            ProgramErrorCode::ConstraintSeeds => 2006,
            ProgramErrorCode::AccountDiscriminatorMismatch => 3002,
            ProgramErrorCode::AccountDidNotDeserialize => 3003,
            ProgramErrorCode::AccountNotInitialized => 3012,
            ProgramErrorCode::UnexpectedSessionStatus => 6000,
            ProgramErrorCode::AdminForbiddenAsVoter => 6001,
            ProgramErrorCode::ForbiddenAsNonAdmin => 6002,
            ProgramErrorCode::ForbiddenAsAdmin => 6003,
            ProgramErrorCode::VoterAlreadyRegistered => 6004,
            ProgramErrorCode::ProposerNotRegistered => 6005,
            ProgramErrorCode::VoterAlreadyVoted => 6006,
            ProgramErrorCode::UnexpectedVoter => 6007,
            ProgramErrorCode::ForbiddenAbstention => 6008,
            ProgramErrorCode::InvalidAccountType => 6009,
            ProgramErrorCode::InvalidProposalId => 6010,
            ProgramErrorCode::BadProposalAccountsCount => 6011,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProgramErrorCode::ConstraintSeeds => "ConstraintSeeds",
            ProgramErrorCode::AccountDiscriminatorMismatch => "AccountDiscriminatorMismatch",
            ProgramErrorCode::AccountDidNotDeserialize => "AccountDidNotDeserialize",
            ProgramErrorCode::AccountNotInitialized => "AccountNotInitialized",
            ProgramErrorCode::UnexpectedSessionStatus => "UnexpectedSessionStatus",
            ProgramErrorCode::AdminForbiddenAsVoter => "AdminForbiddenAsVoter",
            ProgramErrorCode::ForbiddenAsNonAdmin => "ForbiddenAsNonAdmin",
            ProgramErrorCode::ForbiddenAsAdmin => "ForbiddenAsAdmin",
            ProgramErrorCode::VoterAlreadyRegistered => "VoterAlreadyRegistered",
            ProgramErrorCode::ProposerNotRegistered => "ProposerNotRegistered",
            ProgramErrorCode::VoterAlreadyVoted => "VoterAlreadyVoted",
            ProgramErrorCode::UnexpectedVoter => "UnexpectedVoter",
            ProgramErrorCode::ForbiddenAbstention => "ForbiddenAbstention",
            ProgramErrorCode::InvalidAccountType => "InvalidAccountType",
            ProgramErrorCode::InvalidProposalId => "InvalidProposalId",
            ProgramErrorCode::BadProposalAccountsCount => "BadProposalAccountsCount",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ProgramErrorCode::ConstraintSeeds => "A seeds constraint was violated",
            ProgramErrorCode::AccountDiscriminatorMismatch => DISCRIMINATOR_MISMATCH_MSG,
            ProgramErrorCode::AccountDidNotDeserialize => "Failed to deserialize the account",
            ProgramErrorCode::AccountNotInitialized => NOT_INITIALIZED_MSG,
            ProgramErrorCode::UnexpectedSessionStatus => "Unexpected session status",
            ProgramErrorCode::AdminForbiddenAsVoter => ADMIN_AS_VOTER_MSG,
            ProgramErrorCode::ForbiddenAsNonAdmin => "Forbidden as non administrator",
            ProgramErrorCode::ForbiddenAsAdmin => "Forbidden as administrator",
            ProgramErrorCode::VoterAlreadyRegistered => "Voter already registered",
            ProgramErrorCode::ProposerNotRegistered => "Proposer must be registered as voter",
            ProgramErrorCode::VoterAlreadyVoted => "Voter already voted",
            ProgramErrorCode::UnexpectedVoter => "Unexpected voter",
            ProgramErrorCode::ForbiddenAbstention => "Abstention can not be voted",
            ProgramErrorCode::InvalidAccountType => "Invalid account",
            ProgramErrorCode::InvalidProposalId => "Invalid proposal",
            ProgramErrorCode::BadProposalAccountsCount => "Bad proposals accounts count",
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// A program failure as reported by the node: the raw numeric code and, when the code
/// is one the client knows, its symbolic form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingProgramError {
    pub code: u32,
    pub kind: Option<ProgramErrorCode>,
}

impl VotingProgramError {
    pub fn from_code(code: u32) -> Self {
        Self {
            code,
            kind: ProgramErrorCode::from_code(code),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.map(ProgramErrorCode::name).unwrap_or("Unknown")
    }

    pub fn message(&self) -> &'static str {
        self.kind
            .map(ProgramErrorCode::message)
            .unwrap_or("Unknown program error")
    }
}

impl From<ProgramErrorCode> for VotingProgramError {
    fn from(kind: ProgramErrorCode) -> Self {
        Self {
            code: kind.code(),
            kind: Some(kind),
        }
    }
}

impl fmt::Display for VotingProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code, self.message())
    }
}

impl From<std::io::Error> for VotingClientError {
    fn from(err: std::io::Error) -> Self {
        VotingClientError::decode("borsh payload", err)
    }
}
