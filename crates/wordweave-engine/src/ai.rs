//! Word providers for simulated players.
//!
//! A provider is asked for exactly one word, outside any session lock.
//! Whatever comes back is sanitized to a single lowercase token; if the
//! provider errors, times out, or returns nothing usable, the engine
//! falls back to the canned lexicon. A misbehaving provider can
//! therefore never stall or corrupt a session.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::Mutex;

use wordweave_protocol::Phase;

use crate::words;

/// What a bot knows when it is asked to contribute.
#[derive(Debug, Clone)]
pub struct WordRequest<'a> {
    /// The phase being filled, including its prompt text.
    pub phase: &'a Phase,
    /// Words already committed to the sentence this bot is extending.
    pub sentence_so_far: &'a [String],
    /// The bot's personality tag, if it has one.
    pub persona: Option<&'a str>,
}

/// A provider failure. Always recoverable — the caller substitutes a
/// fallback word.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("word provider unavailable: {0}")]
    Unavailable(String),
    #[error("word provider returned nothing usable")]
    Empty,
}

/// Source of bot contributions.
///
/// Implementations may block on network calls; the engine wraps every
/// call in a timeout and never holds a session lock across one. The
/// method is declared as `impl Future + Send` because bot tasks call it
/// from inside `tokio::spawn`; implementations can use `async fn`.
pub trait WordProvider: Send + Sync + 'static {
    fn contribute(
        &self,
        request: WordRequest<'_>,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

/// Offline provider drawing from the built-in lexicon. The default for
/// the server and the only one the tests use.
pub struct LexiconProvider {
    rng: Mutex<SmallRng>,
}

impl LexiconProvider {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl Default for LexiconProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl WordProvider for LexiconProvider {
    async fn contribute(
        &self,
        request: WordRequest<'_>,
    ) -> Result<String, ProviderError> {
        let mut rng = self.rng.lock().await;
        Ok(words::fallback_word(&request.phase.key, &mut *rng).to_string())
    }
}

/// Reduces raw provider output to one usable lowercase word.
///
/// Strips surrounding whitespace, wrapping quotes, and trailing
/// punctuation, then keeps only the first whitespace-separated token.
/// Returns `None` when nothing survives or the result is too long.
pub fn sanitize_contribution(raw: &str, max_len: usize) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | ',' | '!' | '?'));
    let token = trimmed.split_whitespace().next()?;
    let word = token.to_lowercase();
    if word.is_empty() || word.chars().count() > max_len {
        None
    } else {
        Some(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordweave_protocol::default_phases;

    #[test]
    fn test_sanitize_strips_quotes_and_punctuation() {
        assert_eq!(
            sanitize_contribution("\"Walrus.\"", 24),
            Some("walrus".into())
        );
        assert_eq!(sanitize_contribution("  comet! ", 24), Some("comet".into()));
    }

    #[test]
    fn test_sanitize_keeps_first_token_only() {
        assert_eq!(
            sanitize_contribution("the walrus sings", 24),
            Some("the".into())
        );
    }

    #[test]
    fn test_sanitize_rejects_empty_and_too_long() {
        assert_eq!(sanitize_contribution("  \"\"  ", 24), None);
        assert_eq!(sanitize_contribution("", 24), None);
        let long = "a".repeat(30);
        assert_eq!(sanitize_contribution(&long, 24), None);
    }

    #[tokio::test]
    async fn test_lexicon_provider_fits_phase() {
        let provider = LexiconProvider::seeded(3);
        let phases = default_phases();
        let request = WordRequest {
            phase: &phases[1],
            sentence_so_far: &["The".into(), "walrus".into()],
            persona: Some("dadaist poet"),
        };
        let word = provider.contribute(request).await.unwrap();
        assert!(sanitize_contribution(&word, 24).is_some());
    }
}
