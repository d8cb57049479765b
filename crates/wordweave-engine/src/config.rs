//! Engine tunables.

use std::time::Duration;

use wordweave_protocol::{default_phases, Phase};

/// Knobs for the session engine. [`EngineConfig::default`] is what the
/// server runs with; tests shrink the durations.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL applied to session snapshots and their code/connection indexes.
    pub session_ttl: Duration,
    /// TTL for the per-phase scratch words. Refreshed on every write.
    pub scratch_ttl: Duration,
    /// Phase length used when `CreateSession` does not specify one.
    pub default_phase_seconds: u64,
    /// Seats per session, bots included.
    pub max_players: usize,
    /// Longest accepted word, in characters after trimming.
    pub max_word_len: usize,
    /// Bots wait a random duration in this range before "typing".
    pub bot_delay: std::ops::Range<Duration>,
    /// How long a word-provider call may run before the fallback word
    /// is used instead.
    pub provider_timeout: Duration,
    /// Phase list stamped onto every new session.
    pub phases: Vec<Phase>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(2 * 60 * 60),
            scratch_ttl: Duration::from_secs(10 * 60),
            default_phase_seconds: 45,
            max_players: 12,
            max_word_len: 24,
            bot_delay: Duration::from_millis(1500)..Duration::from_millis(4500),
            provider_timeout: Duration::from_secs(8),
            phases: default_phases(),
        }
    }
}

impl EngineConfig {
    /// A config with no artificial waiting, for tests that drive the
    /// state machine directly.
    pub fn instant() -> Self {
        Self {
            bot_delay: Duration::ZERO..Duration::from_millis(1),
            provider_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }
}
