//! The session data model.
//!
//! One `Session` is the whole unit of persistence: every mutation
//! rewrites the full snapshot in the store, and every broadcast carries
//! it. Keeping the model in the protocol crate (rather than the engine)
//! reflects that — clients see exactly what the store holds.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{ConnectionId, PlayerId, SentenceId, SessionId};

/// Milliseconds since the Unix epoch. Wall-clock, not monotonic —
/// these timestamps travel to clients and into the store.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// ```text
/// Waiting → Playing → Voting → Finished
///    │          ▲                  │
///  cancel       └─────(replay)─────┘
/// ```
///
/// `Waiting` may also end in cancellation/cleanup. `Finished` loops back
/// to `Playing` when the host starts a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Playing,
    Voting,
    Finished,
}

impl SessionStatus {
    /// New players may only join while the session is waiting.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Word submissions are only legal mid-round.
    pub fn accepts_words(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Votes are only legal during the voting stage.
    pub fn accepts_votes(self) -> bool {
        matches!(self, Self::Voting)
    }

    /// `start` is legal from Waiting (first round) or Finished (replay).
    pub fn can_start(self) -> bool {
        matches!(self, Self::Waiting | Self::Finished)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
            Self::Voting => "voting",
            Self::Finished => "finished",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// One grammatical slot collected from every player before rotating.
///
/// `prompt` doubles as the constraint string handed to the word provider
/// when a bot fills this phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub key: String,
    pub title: String,
    pub prompt: String,
    pub placeholder: String,
}

impl Phase {
    fn new(key: &str, title: &str, prompt: &str, placeholder: &str) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            prompt: prompt.into(),
            placeholder: placeholder.into(),
        }
    }
}

/// The standard four-phase sentence: subject, verb, object, place.
pub fn default_phases() -> Vec<Phase> {
    vec![
        Phase::new(
            "subject",
            "The subject",
            "a single noun that could start a sentence",
            "a person, creature, or thing",
        ),
        Phase::new(
            "verb",
            "The verb",
            "a single verb in the present tense",
            "what does it do?",
        ),
        Phase::new(
            "object",
            "The object",
            "a single noun that a verb could act on",
            "what does it do it to?",
        ),
        Phase::new(
            "place",
            "The place",
            "a single word naming a place",
            "where does it happen?",
        ),
    ]
}

// ---------------------------------------------------------------------------
// Player, Sentence, Vote
// ---------------------------------------------------------------------------

/// One seat in a session — human or bot.
///
/// Players are never deleted once play has started; a departing human is
/// marked disconnected so sentence rotation stays intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Live transport connection, `None` for bots.
    pub connection: Option<ConnectionId>,
    pub name: String,
    pub is_host: bool,
    pub is_bot: bool,
    pub played_current_phase: bool,
    pub is_connected: bool,
    pub disconnected_at: Option<u64>,
    /// Personality tag handed to the word provider. Bots only.
    pub persona: Option<String>,
}

impl Player {
    pub fn human(id: PlayerId, connection: ConnectionId, name: &str) -> Self {
        Self {
            id,
            connection: Some(connection),
            name: name.into(),
            is_host: false,
            is_bot: false,
            played_current_phase: false,
            is_connected: true,
            disconnected_at: None,
            persona: None,
        }
    }

    pub fn bot(id: PlayerId, name: &str, persona: &str) -> Self {
        Self {
            id,
            connection: None,
            name: name.into(),
            is_host: false,
            is_bot: true,
            played_current_phase: false,
            is_connected: true,
            disconnected_at: None,
            persona: Some(persona.into()),
        }
    }
}

/// The accumulating per-seat output: one word per completed phase, plus
/// the player currently responsible for extending it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: SentenceId,
    pub words: Vec<String>,
    pub current_player: PlayerId,
}

impl Sentence {
    /// Renders the sentence for results display.
    pub fn text(&self) -> String {
        self.words.join(" ")
    }
}

/// One player's vote for one sentence. At most one per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub player: PlayerId,
    pub sentence: SentenceId,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The full state of one game, as persisted and as broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Human-enterable 6-character join code, unique while the session lives.
    pub code: String,
    pub host: PlayerId,
    pub status: SessionStatus,
    /// Ordered phase list, fixed at create.
    pub phases: Vec<Phase>,
    pub seconds_per_phase: u64,
    pub current_phase: usize,
    pub phase_started_at: u64,
    pub players: Vec<Player>,
    pub sentences: Vec<Sentence>,
    pub votes: Vec<Vote>,
    pub created_at: u64,
}

impl Session {
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_by_connection(
        &self,
        connection: ConnectionId,
    ) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.connection == Some(connection))
    }

    pub fn sentence(&self, id: SentenceId) -> Option<&Sentence> {
        self.sentences.iter().find(|s| s.id == id)
    }

    /// True when every player (human and bot) has contributed this phase.
    pub fn all_played(&self) -> bool {
        self.players.iter().all(|p| p.played_current_phase)
    }

    /// The vote-completion denominator: connected, non-bot players.
    pub fn connected_human_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| !p.is_bot && p.is_connected)
            .count()
    }

    pub fn is_last_phase(&self) -> bool {
        self.current_phase + 1 >= self.phases.len()
    }

    pub fn current_phase_spec(&self) -> Option<&Phase> {
        self.phases.get(self.current_phase)
    }
}
