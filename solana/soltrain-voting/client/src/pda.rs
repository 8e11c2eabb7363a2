//! Program-derived addresses of the voting program's accounts.
//!
//! Every address is a pure function of its seeds and the program id: nothing here
//! touches the network and nothing needs caching.

use std::fmt;
use std::str::FromStr;

use solana_program::pubkey::Pubkey;

use crate::error::{Result, VotingClientError};

pub const GLOBAL_SEED: &[u8] = b"global";
pub const SESSION_SEED: &[u8] = b"session";
pub const VOTER_SEED: &[u8] = b"voter";
pub const PROPOSAL_SEED: &[u8] = b"proposal";

/// Proposal id reserved for the blank proposal opened with proposal registration.
pub const BLANK_PROPOSAL_ID: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedTag {
    Global,
    Session,
    Voter,
    Proposal,
}

impl SeedTag {
    pub fn seed(self) -> &'static [u8] {
        match self {
            SeedTag::Global => GLOBAL_SEED,
            SeedTag::Session => SESSION_SEED,
            SeedTag::Voter => VOTER_SEED,
            SeedTag::Proposal => PROPOSAL_SEED,
        }
    }
}

impl fmt::Display for SeedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeedTag::Global => "global",
            SeedTag::Session => "session",
            SeedTag::Voter => "voter",
            SeedTag::Proposal => "proposal",
        };
        f.write_str(name)
    }
}

impl FromStr for SeedTag {
    type Err = VotingClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(SeedTag::Global),
            "session" => Ok(SeedTag::Session),
            "voter" => Ok(SeedTag::Voter),
            "proposal" => Ok(SeedTag::Proposal),
            other => Err(VotingClientError::validation(format!(
                "unknown seed tag `{other}`"
            ))),
        }
    }
}

/// The key that follows the session id in voter and proposal seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondarySeed {
    Voter(Pubkey),
    ProposalId(u8),
}

/// Derives the address for `tag`, checking that the supplied seeds are exactly the ones
/// the tag needs.
pub fn derive_address(
    program_id: &Pubkey,
    tag: SeedTag,
    session_id: Option<u64>,
    secondary: Option<SecondarySeed>,
) -> Result<Pubkey> {
    match (tag, session_id, secondary) {
        (SeedTag::Global, None, None) => Ok(find_global_address(program_id)),
        (SeedTag::Session, Some(session_id), None) => {
            Ok(find_session_address(program_id, session_id))
        }
        (SeedTag::Voter, Some(session_id), Some(SecondarySeed::Voter(voter))) => {
            Ok(find_voter_address(program_id, session_id, &voter))
        }
        (SeedTag::Proposal, Some(session_id), Some(SecondarySeed::ProposalId(proposal_id))) => {
            Ok(find_proposal_address(program_id, session_id, proposal_id))
        }
        (tag, session_id, secondary) => Err(VotingClientError::validation(format!(
            "seeds do not match tag `{tag}`: session id {session_id:?}, secondary {secondary:?}"
        ))),
    }
}

pub fn find_global_address(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[GLOBAL_SEED], program_id).0
}

pub fn find_session_address(program_id: &Pubkey, session_id: u64) -> Pubkey {
    Pubkey::find_program_address(&[SESSION_SEED, &session_id.to_le_bytes()], program_id).0
}

pub fn find_voter_address(program_id: &Pubkey, session_id: u64, voter: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[VOTER_SEED, &session_id.to_le_bytes(), voter.as_ref()],
        program_id,
    )
    .0
}

pub fn find_proposal_address(program_id: &Pubkey, session_id: u64, proposal_id: u8) -> Pubkey {
    Pubkey::find_program_address(
        &[PROPOSAL_SEED, &session_id.to_le_bytes(), &[proposal_id]],
        program_id,
    )
    .0
}

pub fn parse_session_id(input: &str) -> Result<u64> {
    input.trim().parse::<u64>().map_err(|err| {
        VotingClientError::validation(format!("malformed session id `{input}`: {err}"))
    })
}

pub fn parse_proposal_id(input: &str) -> Result<u8> {
    let proposal_id = input.trim().parse::<u8>().map_err(|err| {
        VotingClientError::validation(format!("malformed proposal id `{input}`: {err}"))
    })?;
    ensure_proposal_id(proposal_id)
}

/// Narrows a proposal counter to the single seed byte the program uses.
pub fn proposal_id_from_index(index: u32) -> Result<u8> {
    let proposal_id = u8::try_from(index).map_err(|_| {
        VotingClientError::validation(format!("proposal id {index} does not fit in one byte"))
    })?;
    ensure_proposal_id(proposal_id)
}

/// Proposal ids start at 1, 0 means "no proposal" in voter records.
pub fn ensure_proposal_id(proposal_id: u8) -> Result<u8> {
    if proposal_id == 0 {
        return Err(VotingClientError::validation(
            "proposal id 0 does not designate a proposal",
        ));
    }
    Ok(proposal_id)
}
