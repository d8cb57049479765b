//! Wordweave — a collaborative "exquisite corpse" sentence game.
//!
//! Players join a session with a short code, each phase everyone
//! contributes one word to the sentence rotating through their seat,
//! and at the end the room votes on the best result. Simulated players
//! fill empty seats. This crate is the WebSocket front; the rules live
//! in `wordweave-engine`.

mod conn;
mod error;
mod server;

pub use error::ServerError;
pub use server::WordweaveServer;
