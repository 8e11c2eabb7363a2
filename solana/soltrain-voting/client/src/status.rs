use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::error::{Result, VotingClientError};

/// Workflow status of a voting session. Sessions only ever move forward through
/// these variants, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionStatus {
    None,
    RegisteringVoters,
    ProposalsRegistrationStarted,
    ProposalsRegistrationEnded,
    VotingSessionStarted,
    VotingSessionEnded,
    VotesTallied,
}

impl SessionStatus {
    pub fn ordinal(self) -> u8 {
        match self {
            SessionStatus::None => 0,
            SessionStatus::RegisteringVoters => 1,
            SessionStatus::ProposalsRegistrationStarted => 2,
            SessionStatus::ProposalsRegistrationEnded => 3,
            SessionStatus::VotingSessionStarted => 4,
            SessionStatus::VotingSessionEnded => 5,
            SessionStatus::VotesTallied => 6,
        }
    }

    /// The status a successful workflow transition leads to, `None` once votes are tallied.
    pub fn next(self) -> Option<SessionStatus> {
        match self {
            SessionStatus::None => Some(SessionStatus::RegisteringVoters),
            SessionStatus::RegisteringVoters => Some(SessionStatus::ProposalsRegistrationStarted),
            SessionStatus::ProposalsRegistrationStarted => {
                Some(SessionStatus::ProposalsRegistrationEnded)
            }
            SessionStatus::ProposalsRegistrationEnded => Some(SessionStatus::VotingSessionStarted),
            SessionStatus::VotingSessionStarted => Some(SessionStatus::VotingSessionEnded),
            SessionStatus::VotingSessionEnded => Some(SessionStatus::VotesTallied),
            SessionStatus::VotesTallied => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::None => "none",
            SessionStatus::RegisteringVoters => "registering voters",
            SessionStatus::ProposalsRegistrationStarted => "proposals registration started",
            SessionStatus::ProposalsRegistrationEnded => "proposals registration ended",
            SessionStatus::VotingSessionStarted => "voting session started",
            SessionStatus::VotingSessionEnded => "voting session ended",
            SessionStatus::VotesTallied => "votes tallied",
        };
        f.write_str(label)
    }
}

/// Status exactly as the program stores it: the variant tag of its workflow enum.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSessionStatus(pub u8);

impl From<SessionStatus> for RawSessionStatus {
    fn from(status: SessionStatus) -> Self {
        RawSessionStatus(status.ordinal())
    }
}

/// Tags checked in order, the first one present wins.
const STATUS_TAGS: [(u8, SessionStatus); 7] = [
    (0, SessionStatus::None),
    (1, SessionStatus::RegisteringVoters),
    (2, SessionStatus::ProposalsRegistrationStarted),
    (3, SessionStatus::ProposalsRegistrationEnded),
    (4, SessionStatus::VotingSessionStarted),
    (5, SessionStatus::VotingSessionEnded),
    (6, SessionStatus::VotesTallied),
];

/// Translates an on-chain status into its ordinal form.
///
/// An unknown tag means the client and the program disagree on the layout; it is
/// reported as [`VotingClientError::CorruptStatus`] and must not be recovered from.
pub fn map_session_status(raw: RawSessionStatus) -> Result<SessionStatus> {
    STATUS_TAGS
        .iter()
        .find(|(tag, _)| *tag == raw.0)
        .map(|(_, status)| *status)
        .ok_or(VotingClientError::CorruptStatus(raw.0))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn every_tag_maps_to_its_ordinal() {
        for tag in 0..7u8 {
            let status = map_session_status(RawSessionStatus(tag)).unwrap();
            assert_eq!(status.ordinal(), tag);
            assert_eq!(RawSessionStatus::from(status), RawSessionStatus(tag));
        }
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        assert_matches!(
            map_session_status(RawSessionStatus(7)),
            Err(VotingClientError::CorruptStatus(7))
        );
    }

    #[test]
    fn statuses_only_move_forward() {
        let mut status = SessionStatus::None;
        let mut steps = 0;
        while let Some(next) = status.next() {
            assert!(next > status);
            assert_eq!(next.ordinal(), status.ordinal() + 1);
            status = next;
            steps += 1;
        }
        assert_eq!(steps, 6);
        assert_eq!(status, SessionStatus::VotesTallied);
    }
}
