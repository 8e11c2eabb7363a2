//! Events emitted by the voting program and their extraction from transaction logs.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;
use tracing::debug;

use crate::error::{Result, VotingClientError};
use crate::state::{discriminator, DISCRIMINATOR_LEN};
use crate::status::RawSessionStatus;

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    SessionCreated,
    SessionWorkflowStatusChanged,
    VoterRegistered,
    ProposalRegistered,
    Voted,
    VotesTallied,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::SessionCreated,
        EventKind::SessionWorkflowStatusChanged,
        EventKind::VoterRegistered,
        EventKind::ProposalRegistered,
        EventKind::Voted,
        EventKind::VotesTallied,
    ];

    /// Event name as exposed to subscribers, e.g. `sessionCreated`.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::SessionCreated => "sessionCreated",
            EventKind::SessionWorkflowStatusChanged => "sessionWorkflowStatusChanged",
            EventKind::VoterRegistered => "voterRegistered",
            EventKind::ProposalRegistered => "proposalRegistered",
            EventKind::Voted => "voted",
            EventKind::VotesTallied => "votesTallied",
        }
    }

    /// Type name the program hashes into the event discriminator.
    fn type_name(self) -> &'static str {
        match self {
            EventKind::SessionCreated => "SessionCreated",
            EventKind::SessionWorkflowStatusChanged => "SessionWorkflowStatusChanged",
            EventKind::VoterRegistered => "VoterRegistered",
            EventKind::ProposalRegistered => "ProposalRegistered",
            EventKind::Voted => "Voted",
            EventKind::VotesTallied => "VotesTallied",
        }
    }

    pub fn discriminator(self) -> [u8; DISCRIMINATOR_LEN] {
        discriminator("event", self.type_name())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = VotingClientError;

    fn from_str(s: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| VotingClientError::validation(format!("unknown event `{s}`")))
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionCreated {
    pub session_id: u64,
    pub name: String,
    pub description: String,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionWorkflowStatusChanged {
    pub session_id: u64,
    pub previous_status: RawSessionStatus,
    pub current_status: RawSessionStatus,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct VoterRegistered {
    pub session_id: u64,
    pub voter: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProposalRegistered {
    pub session_id: u64,
    pub proposal_id: u8,
    pub description: String,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Voted {
    pub session_id: u64,
    pub proposal_id: u8,
    pub voter: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct VotesTallied {
    pub session_id: u64,
    pub voters_count: u32,
    pub total_votes: u32,
    pub blank_votes: u32,
    pub abstention: u32,
    pub winning_proposals: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VotingEvent {
    SessionCreated(SessionCreated),
    SessionWorkflowStatusChanged(SessionWorkflowStatusChanged),
    VoterRegistered(VoterRegistered),
    ProposalRegistered(ProposalRegistered),
    Voted(Voted),
    VotesTallied(VotesTallied),
}

impl VotingEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            VotingEvent::SessionCreated(_) => EventKind::SessionCreated,
            VotingEvent::SessionWorkflowStatusChanged(_) => EventKind::SessionWorkflowStatusChanged,
            VotingEvent::VoterRegistered(_) => EventKind::VoterRegistered,
            VotingEvent::ProposalRegistered(_) => EventKind::ProposalRegistered,
            VotingEvent::Voted(_) => EventKind::Voted,
            VotingEvent::VotesTallied(_) => EventKind::VotesTallied,
        }
    }

    pub fn session_id(&self) -> u64 {
        match self {
            VotingEvent::SessionCreated(e) => e.session_id,
            VotingEvent::SessionWorkflowStatusChanged(e) => e.session_id,
            VotingEvent::VoterRegistered(e) => e.session_id,
            VotingEvent::ProposalRegistered(e) => e.session_id,
            VotingEvent::Voted(e) => e.session_id,
            VotingEvent::VotesTallied(e) => e.session_id,
        }
    }

    /// Decodes one `Program data:` payload. Returns `Ok(None)` for payloads that are not
    /// events of this program.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>> {
        if payload.len() < DISCRIMINATOR_LEN {
            return Ok(None);
        }
        let (tag, mut body) = payload.split_at(DISCRIMINATOR_LEN);
        let Some(kind) = EventKind::ALL
            .into_iter()
            .find(|kind| kind.discriminator() == tag)
        else {
            return Ok(None);
        };

        let event = match kind {
            EventKind::SessionCreated => {
                VotingEvent::SessionCreated(BorshDeserialize::deserialize(&mut body)?)
            }
            EventKind::SessionWorkflowStatusChanged => {
                VotingEvent::SessionWorkflowStatusChanged(BorshDeserialize::deserialize(&mut body)?)
            }
            EventKind::VoterRegistered => {
                VotingEvent::VoterRegistered(BorshDeserialize::deserialize(&mut body)?)
            }
            EventKind::ProposalRegistered => {
                VotingEvent::ProposalRegistered(BorshDeserialize::deserialize(&mut body)?)
            }
            EventKind::Voted => VotingEvent::Voted(BorshDeserialize::deserialize(&mut body)?),
            EventKind::VotesTallied => {
                VotingEvent::VotesTallied(BorshDeserialize::deserialize(&mut body)?)
            }
        };
        Ok(Some(event))
    }
}

/// An event payload type, tied to its [`VotingEvent`] variant.
pub trait ProgramEvent: BorshSerialize + BorshDeserialize {
    const KIND: EventKind;

    fn extract(event: &VotingEvent) -> Option<&Self>;
}

macro_rules! impl_program_event {
    ($($ty:ident),* $(,)?) => {
        $(
            impl ProgramEvent for $ty {
                const KIND: EventKind = EventKind::$ty;

                fn extract(event: &VotingEvent) -> Option<&Self> {
                    match event {
                        VotingEvent::$ty(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_program_event!(
    SessionCreated,
    SessionWorkflowStatusChanged,
    VoterRegistered,
    ProposalRegistered,
    Voted,
    VotesTallied,
);

/// Events of one transaction, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionEvents(Vec<VotingEvent>);

impl TransactionEvents {
    pub fn new(events: Vec<VotingEvent>) -> Self {
        Self(events)
    }

    /// Last event of type `E`, matching how a name-keyed view would keep it.
    pub fn get<E: ProgramEvent>(&self) -> Option<&E> {
        self.0.iter().rev().find_map(E::extract)
    }

    pub fn by_name(&self, name: &str) -> Option<&VotingEvent> {
        self.0.iter().rev().find(|event| event.kind().name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VotingEvent> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[VotingEvent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<VotingEvent> {
        self.0
    }
}

/// Extracts the events `program_id` emitted in a transaction's log.
///
/// Only `Program data:` lines logged while `program_id` is the innermost executing
/// program are considered, so events of other programs invoked in the same
/// transaction never leak in.
pub fn parse_logs<S: AsRef<str>>(program_id: &Pubkey, logs: &[S]) -> Result<Vec<VotingEvent>> {
    let program = program_id.to_string();
    let mut stack: Vec<&str> = Vec::new();
    let mut events = Vec::new();

    for line in logs {
        let line: &str = line.as_ref();
        if let Some(payload) = line.strip_prefix(PROGRAM_DATA_PREFIX) {
            if stack.last() != Some(&program.as_str()) {
                continue;
            }
            let bytes = B64_ENGINE
                .decode(payload.trim())
                .map_err(|err| VotingClientError::decode("event payload", err))?;
            match VotingEvent::decode(&bytes)? {
                Some(event) => events.push(event),
                None => debug!("Skipping unrecognized program data"),
            }
        } else if let Some(rest) = line.strip_prefix("Program ") {
            let mut words = rest.split_whitespace();
            let (Some(id), Some(action)) = (words.next(), words.next()) else {
                continue;
            };
            match action {
                "invoke" => stack.push(id),
                "success" | "failed:" => {
                    stack.pop();
                }
                _ => {}
            }
        }
    }

    Ok(events)
}
