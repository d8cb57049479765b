//! Error types for session operations.
//!
//! Every variant is a per-operation failure reported to the acting
//! connection only; none of them mutates state or reaches the rest of
//! the room.

use wordweave_protocol::SessionStatus;

/// Errors produced by the session state machine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    /// The session does not exist (never created, cleaned up, or expired).
    #[error("session not found")]
    SessionNotFound,

    /// The acting connection is not bound to any session.
    #[error("you are not in a session")]
    NotInSession,

    /// The acting connection is already bound to a session.
    #[error("you are already in a session")]
    AlreadyInSession,

    /// A rejoin targeted a seat whose player is still connected.
    #[error("that player is still connected")]
    SeatOccupied,

    /// The player does not exist in this session.
    #[error("player not found")]
    PlayerNotFound,

    /// The voted-for sentence does not exist in this session.
    #[error("sentence not found")]
    SentenceNotFound,

    /// The action is not legal for the session's current status.
    #[error("cannot {action} while the session is {status}")]
    InvalidStatus {
        action: &'static str,
        status: SessionStatus,
    },

    /// A non-host attempted a host-only action.
    #[error("only the host can do that")]
    NotHost,

    /// The player already voted this round.
    #[error("you already voted")]
    DuplicateVote,

    /// The display name is already in use in this session.
    #[error("the name \"{0}\" is already taken")]
    NameTaken(String),

    /// The session has no free seats.
    #[error("the session is full")]
    SessionFull,

    /// A human submitted twice in one phase. (Bots get a silent no-op.)
    #[error("you already played this phase")]
    AlreadyPlayed,

    /// A display name or word was empty after trimming.
    #[error("a non-empty value is required")]
    EmptyInput,

    /// The submitted word exceeds the length cap.
    #[error("word is too long (max {0} characters)")]
    WordTooLong(usize),

    /// The join code is not 6 characters.
    #[error("join codes are 6 characters")]
    InvalidCode,

    /// Code generation kept colliding; the caller should retry create.
    #[error("could not allocate a unique join code")]
    CodeSpaceExhausted,

    /// `start` on a session with no seats at all.
    #[error("at least one player is required to start")]
    NotEnoughPlayers,
}
