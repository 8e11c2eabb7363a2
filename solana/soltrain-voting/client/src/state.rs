use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::hash::hash;
use solana_program::pubkey::Pubkey;

use crate::error::{Result, VotingClientError};
use crate::status::{map_session_status, RawSessionStatus, SessionStatus};

pub const DISCRIMINATOR_LEN: usize = 8;

pub const MAX_SESSION_NAME_LEN: usize = 20;
pub const MAX_SESSION_DESCRIPTION_LEN: usize = 80;
pub const MAX_PROPOSAL_DESCRIPTION_LEN: usize = 255;

/// First eight bytes of `sha256("<namespace>:<name>")`, the prefix the program puts in
/// front of accounts, events and instruction data.
pub fn discriminator(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = hash(format!("{namespace}:{name}").as_bytes()).to_bytes();
    let mut prefix = [0u8; DISCRIMINATOR_LEN];
    prefix.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    prefix
}

/// A record type stored in a program-owned account.
pub trait AccountRecord: BorshDeserialize + BorshSerialize {
    const NAME: &'static str;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        discriminator("account", Self::NAME)
    }

    /// Decodes raw account data. Accounts are allocated with a fixed size, so any
    /// bytes left after the last field are padding and are ignored.
    fn try_from_account_data(data: &[u8]) -> Result<Self> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(VotingClientError::decode(
                Self::NAME,
                format!("{} bytes is shorter than a discriminator", data.len()),
            ));
        }
        let (prefix, mut body) = data.split_at(DISCRIMINATOR_LEN);
        if prefix != Self::discriminator() {
            return Err(VotingClientError::decode(Self::NAME, "discriminator mismatch"));
        }
        Self::deserialize(&mut body).map_err(|err| VotingClientError::decode(Self::NAME, err))
    }
}

/// Account records that can be listed with a program account scan.
pub trait ScannableRecord: AccountRecord {
    /// Where the numeric sort key lives in the raw account data.
    const SORT_KEY: SortKey;
    /// Offset of the owning session id, for records that belong to a session.
    const SESSION_ID_OFFSET: usize;
}

/// Location of an unsigned little-endian integer inside account data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub offset: usize,
    pub length: usize,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct GlobalAccount {
    pub session_count: u64,
}

impl AccountRecord for GlobalAccount {
    const NAME: &'static str = "GlobalAccount";
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct VotingResult {
    pub winning_proposals: Vec<u8>,
    pub total_votes: u32,
    pub blank_votes: u32,
    pub abstention: u32,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionAccount {
    pub admin: Pubkey,
    pub session_id: u64,
    pub name: String,
    pub description: String,
    pub status: RawSessionStatus,
    pub voters_count: u32,
    pub proposals_count: u8,
    pub result: VotingResult,
}

impl AccountRecord for SessionAccount {
    const NAME: &'static str = "SessionAccount";
}

impl ScannableRecord for SessionAccount {
    // discriminator (8) + admin (32)
    const SORT_KEY: SortKey = SortKey {
        offset: 40,
        length: 8,
    };
    const SESSION_ID_OFFSET: usize = 40;
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct VoterAccount {
    pub session_id: u64,
    pub voter: Pubkey,
    pub voter_id: u32,
    pub has_voted: bool,
    pub voted_proposal_id: u8,
    pub nb_proposals: u8,
}

impl AccountRecord for VoterAccount {
    const NAME: &'static str = "VoterAccount";
}

impl ScannableRecord for VoterAccount {
    // discriminator (8) + session_id (8) + voter (32)
    const SORT_KEY: SortKey = SortKey {
        offset: 48,
        length: 4,
    };
    const SESSION_ID_OFFSET: usize = 8;
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProposalAccount {
    pub session_id: u64,
    pub proposal_id: u8,
    pub description: String,
    pub proposer: Pubkey,
    pub vote_count: u32,
}

impl AccountRecord for ProposalAccount {
    const NAME: &'static str = "ProposalAccount";
}

impl ScannableRecord for ProposalAccount {
    // discriminator (8) + session_id (8)
    const SORT_KEY: SortKey = SortKey {
        offset: 16,
        length: 1,
    };
    const SESSION_ID_OFFSET: usize = 8;
}

/// A session as handed to callers, with its status already mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingSession {
    pub address: Pubkey,
    pub session_id: u64,
    pub name: String,
    pub description: String,
    pub status: SessionStatus,
    pub admin: Pubkey,
    pub voters_count: u32,
    pub proposals_count: u8,
    pub result: VotingResult,
}

impl VotingSession {
    pub fn from_account(address: Pubkey, account: SessionAccount) -> Result<Self> {
        Ok(Self {
            address,
            session_id: account.session_id,
            name: account.name,
            description: account.description,
            status: map_session_status(account.status)?,
            admin: account.admin,
            voters_count: account.voters_count,
            proposals_count: account.proposals_count,
            result: account.result,
        })
    }

    pub fn is_admin(&self, key: &Pubkey) -> bool {
        self.admin == *key
    }
}
