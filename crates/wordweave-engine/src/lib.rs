//! The Wordweave session engine.
//!
//! Everything that makes a game move lives here: the per-session lock,
//! the phase state machine, the countdown timers, and the simulated
//! players. The engine owns no sockets — it routes outbound messages
//! through [`ClientRegistry`] and persists through any
//! [`wordweave_store::SnapshotStore`].

mod ai;
mod clients;
mod config;
mod engine;
mod error;
mod lock;
mod timer;
mod words;

pub use ai::{
    sanitize_contribution, LexiconProvider, ProviderError, WordProvider,
    WordRequest,
};
pub use clients::ClientRegistry;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
