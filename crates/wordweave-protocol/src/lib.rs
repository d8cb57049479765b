//! Wire types for Wordweave: identity newtypes, the session data model,
//! and the tagged client/server message enums.
//!
//! Everything in this crate is serializable — the full session snapshot
//! is broadcast to clients after every mutation, so the model types are
//! wire types too.

mod messages;
mod model;
mod types;

pub use messages::{ClientMessage, RankedSentence, ServerMessage};
pub use model::{
    default_phases, now_ms, Phase, Player, Sentence, Session, SessionStatus,
    Vote,
};
pub use types::{ConnectionId, PlayerId, SentenceId, SessionId};
