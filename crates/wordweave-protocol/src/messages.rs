//! The client/server message enums.
//!
//! Both enums are internally tagged (`#[serde(tag = "type")]`) so the
//! JSON is flat and easy to switch on from a browser client:
//! `{ "type": "SubmitWord", "word": "walrus" }`.

use serde::{Deserialize, Serialize};

use crate::{Phase, Player, PlayerId, SentenceId, Sentence, Session, SessionId};

/// Requests a client can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Open a new session; the sender becomes host.
    /// `bots` seats are filled from the persona table.
    CreateSession {
        name: String,
        #[serde(default)]
        bots: u8,
        #[serde(default)]
        seconds_per_phase: Option<u64>,
    },

    /// Join an existing waiting session by its 6-character code.
    JoinSession { code: String, name: String },

    /// Start the round (host-only; also used for replay from Finished).
    StartSession,

    /// Contribute a word for the current phase.
    SubmitWord { word: String },

    /// Vote for a sentence during the voting stage.
    Vote { sentence: SentenceId },

    /// Leave the session voluntarily.
    LeaveSession,

    /// Kick another player (host-only).
    RemovePlayer { player: PlayerId },

    /// Reattach a previous seat after a dropped connection.
    RejoinSession { session: SessionId, player: PlayerId },

    /// Tear the session down (host-only).
    CancelSession,
}

/// One entry of the final scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedSentence {
    pub sentence: Sentence,
    pub votes: usize,
}

/// Notifications the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Reply to the creator only: their session and their player id.
    SessionCreated { session: Session, player: PlayerId },

    /// Full snapshot, broadcast after every mutation.
    SessionState { session: Session },

    /// Reply to a successful rejoin, sent to that connection only.
    Rejoined { session: Session, player: PlayerId },

    /// The session was cancelled by its host.
    SessionCanceled,

    /// The session no longer exists (cleanup or expiry).
    SessionDeleted,

    PlayerJoined { player: Player },
    PlayerLeft { player: PlayerId },
    PlayerRemoved { player: PlayerId },
    HostChanged { host: PlayerId },

    /// A new phase is open for words.
    PhaseStarted {
        phase: usize,
        info: Phase,
        seconds: u64,
    },

    /// All phases complete; votes are now accepted.
    VotingStarted,

    /// Countdown update, once per second while a phase runs.
    Tick { seconds_left: u64 },

    /// Acknowledgement that a player's word landed (word not revealed).
    PlayerPlayed { player: PlayerId },

    /// Acknowledgement that a player's vote landed.
    PlayerVoted { player: PlayerId },

    /// Final ranking, best first.
    Results { ranking: Vec<RankedSentence> },

    /// Session creation failed.
    CreateFailed { message: String },

    /// Join failed (bad code, name taken, session already started…).
    JoinFailed { message: String },

    /// Any other per-request failure, reported to the caller only.
    Error { message: String },
}
