//! Common types used throughout the chat pairing service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, stable identifier of a participant as supplied by the transport
pub type ParticipantId = i64;

/// Unique identifier for chat sessions
pub type SessionId = Uuid;

/// Matching category a participant offers and searches under
///
/// `Male` and `Female` are the two targeted categories, `Any` is the
/// undeclared one. Participants without a stored preference are `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Male,
    Female,
    #[default]
    Any,
}

impl Preference {
    /// All categories, in queue storage order
    pub const ALL: [Preference; 3] = [Preference::Male, Preference::Female, Preference::Any];

    /// Queues searched for a participant of this category, highest priority first.
    ///
    /// Targeted categories accept the opposite category and then `Any`, but an
    /// `Any` searcher only looks at other `Any` waiters. The asymmetry is kept
    /// on purpose: an `Any` participant is still found by a later targeted
    /// searcher scanning the `Any` queue.
    pub fn search_order(self) -> &'static [Preference] {
        match self {
            Preference::Male => &[Preference::Female, Preference::Any],
            Preference::Female => &[Preference::Male, Preference::Any],
            Preference::Any => &[Preference::Any],
        }
    }

    /// Stable lowercase label used in storage, metrics and commands
    pub fn as_str(self) -> &'static str {
        match self {
            Preference::Male => "male",
            Preference::Female => "female",
            Preference::Any => "any",
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Preference {
    type Err = crate::error::ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "a" => Ok(Preference::Male),
            "female" | "b" => Ok(Preference::Female),
            "any" | "either" => Ok(Preference::Any),
            other => Err(crate::error::ChatError::InvalidCommand {
                reason: format!("unknown preference '{}'", other),
            }),
        }
    }
}

/// An active or finished pairing between two distinct participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub participants: (ParticipantId, ParticipantId),
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Identity of the other member, if `participant` belongs to this session
    pub fn partner_of(&self, participant: ParticipantId) -> Option<ParticipantId> {
        let (a, b) = self.participants;
        if participant == a {
            Some(b)
        } else if participant == b {
            Some(a)
        } else {
            None
        }
    }

    pub fn includes(&self, participant: ParticipantId) -> bool {
        self.partner_of(participant).is_some()
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Where a participant currently stands; the three states never overlap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantState {
    Idle,
    Waiting(Preference),
    InSession(Session),
}

/// Result of a match request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A compatible partner was found and a session created
    Matched(Session),
    /// No candidate available; the requester now waits in its queue
    Waiting,
    /// The requester is already paired; nothing changed
    AlreadyInSession(Session),
}

impl MatchOutcome {
    /// The newly created session, if any
    pub fn session(&self) -> Option<&Session> {
        match self {
            MatchOutcome::Matched(session) => Some(session),
            _ => None,
        }
    }
}

/// Result of relaying one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered {
        recipient: ParticipantId,
    },
    NotInSession,
    /// The partner could not be reached; the session is closed and the sender
    /// went through matching again
    DeliveryFailed {
        recipient: ParticipantId,
        rematch: MatchOutcome,
    },
}

/// Profile details supplied by the transport when a participant registers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub id: ParticipantId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ParticipantProfile {
    pub fn new(id: ParticipantId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Persisted participant with bookkeeping fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub profile: ParticipantProfile,
    pub preference: Preference,
    pub is_banned: bool,
    pub message_count: u64,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// One relayed (or attempted) message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub session_id: SessionId,
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub delivered: bool,
}

/// Persisted view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub participant_a: ParticipantId,
    pub participant_b: ParticipantId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionRecord {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            participant_a: session.participants.0,
            participant_b: session.participants.1,
            started_at: session.started_at,
            ended_at: session.ended_at,
        }
    }
}

/// Something an administrator did on the admin surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAction {
    pub admin_id: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// Raw inbound event handed over by a transport adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub participant: ParticipantId,
    #[serde(default)]
    pub profile: Option<ParticipantProfile>,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// Outbound text for a participant, as published to a gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub participant: ParticipantId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}
