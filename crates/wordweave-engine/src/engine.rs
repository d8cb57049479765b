//! The session state machine.
//!
//! Concurrency model, in one paragraph: every mutation of a session
//! happens inside [`SessionLocks::run_exclusive`], re-reads the
//! snapshot from the store *after* acquiring the lock, mutates it, and
//! writes the whole snapshot back before releasing. Timers and bot
//! tasks funnel their effects through the same path, so there is
//! exactly one writer per session at any instant and stale reads can
//! never be written back.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use wordweave_protocol::{
    now_ms, ConnectionId, Player, PlayerId, RankedSentence, Sentence,
    SentenceId, ServerMessage, Session, SessionId, SessionStatus,
};
use wordweave_store::SnapshotStore;

use crate::ai::{sanitize_contribution, WordProvider, WordRequest};
use crate::clients::ClientRegistry;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::lock::SessionLocks;
use crate::timer::PhaseTimers;
use crate::words;

/// Join codes avoid 0/O, 1/I/L so they survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;
const CODE_ATTEMPTS: usize = 32;

fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| {
            CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char
        })
        .collect()
}

/// Capitalizes the first phase's word and closes the last phase's word
/// with a period, so committed sentences read as sentences.
fn normalize_word(word: &str, first_phase: bool, last_phase: bool) -> String {
    let trimmed = word.trim();
    let mut out = if first_phase {
        let mut chars = trimmed.chars();
        match chars.next() {
            Some(c) => c.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        trimmed.to_string()
    };
    if last_phase && !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}

/// Why a player is leaving a session; picks the broadcast variant.
#[derive(Clone, Copy)]
enum Departure {
    Left,
    Removed,
}

struct Inner<S, P> {
    store: S,
    provider: P,
    config: EngineConfig,
    locks: SessionLocks,
    timers: PhaseTimers,
    clients: ClientRegistry,
    next_session: AtomicU64,
    next_player: AtomicU64,
    next_sentence: AtomicU64,
}

/// Handle to the engine. Cheap to clone — timer and bot tasks carry
/// their own copy into `tokio::spawn`.
pub struct Engine<S, P> {
    inner: Arc<Inner<S, P>>,
}

impl<S, P> Clone for Engine<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SnapshotStore, P: WordProvider> Engine<S, P> {
    pub fn new(store: S, provider: P, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                provider,
                config,
                locks: SessionLocks::new(),
                timers: PhaseTimers::new(),
                clients: ClientRegistry::new(),
                next_session: AtomicU64::new(1),
                next_player: AtomicU64::new(1),
                next_sentence: AtomicU64::new(1),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.inner.clients
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // -- small shared helpers ------------------------------------------------

    async fn put(&self, session: &Session) {
        self.inner
            .store
            .put(session, self.inner.config.session_ttl)
            .await;
    }

    async fn broadcast(&self, session: &Session, message: ServerMessage) {
        let conns: Vec<ConnectionId> = session
            .players
            .iter()
            .filter(|p| p.is_connected)
            .filter_map(|p| p.connection)
            .collect();
        self.inner.clients.send_to_all(&conns, &message).await;
    }

    async fn broadcast_state(&self, session: &Session) {
        self.broadcast(
            session,
            ServerMessage::SessionState {
                session: session.clone(),
            },
        )
        .await;
    }

    async fn bound_session(
        &self,
        connection: ConnectionId,
    ) -> Result<SessionId, EngineError> {
        self.inner
            .store
            .session_by_connection(connection)
            .await
            .ok_or(EngineError::NotInSession)
    }

    /// Generates a join code and claims it in the store in one
    /// check-and-set step, so two simultaneous creates can never walk
    /// away with the same code.
    async fn claim_join_code(
        &self,
        rng: &mut SmallRng,
        id: SessionId,
    ) -> Result<String, EngineError> {
        for _ in 0..CODE_ATTEMPTS {
            let code = random_code(rng);
            if self
                .inner
                .store
                .bind_code_if_free(&code, id, self.inner.config.session_ttl)
                .await
            {
                return Ok(code);
            }
        }
        warn!("join code generation exhausted its retry budget");
        Err(EngineError::CodeSpaceExhausted)
    }

    fn alloc_player(&self) -> PlayerId {
        PlayerId(self.inner.next_player.fetch_add(1, Ordering::Relaxed))
    }

    // -- create / join / rejoin ----------------------------------------------

    pub async fn create_session(
        &self,
        connection: ConnectionId,
        name: &str,
        bots: u8,
        seconds_per_phase: Option<u64>,
    ) -> Result<(), EngineError> {
        if self
            .inner
            .store
            .session_by_connection(connection)
            .await
            .is_some()
        {
            return Err(EngineError::AlreadyInSession);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        let mut rng = SmallRng::from_os_rng();
        let id =
            SessionId(self.inner.next_session.fetch_add(1, Ordering::Relaxed));
        let code = self.claim_join_code(&mut rng, id).await?;

        let mut host = Player::human(self.alloc_player(), connection, name);
        host.is_host = true;
        let host_id = host.id;
        let mut players = vec![host];

        let bot_seats = (bots as usize).min(self.inner.config.max_players - 1);
        for i in 0..bot_seats {
            let (bot_name, persona) = words::bot_identity(i);
            let display = if i < words::BOT_NAMES.len() {
                bot_name.to_string()
            } else {
                format!("{bot_name} {}", i / words::BOT_NAMES.len() + 1)
            };
            players.push(Player::bot(self.alloc_player(), &display, persona));
        }

        let seconds = seconds_per_phase
            .unwrap_or(self.inner.config.default_phase_seconds)
            .clamp(1, 600);

        let session = Session {
            id,
            code: code.clone(),
            host: host_id,
            status: SessionStatus::Waiting,
            phases: self.inner.config.phases.clone(),
            seconds_per_phase: seconds,
            current_phase: 0,
            phase_started_at: 0,
            players,
            sentences: Vec::new(),
            votes: Vec::new(),
            created_at: now_ms(),
        };

        self.inner
            .locks
            .run_exclusive(id, || async {
                self.put(&session).await;
                self.inner
                    .store
                    .bind_connection(
                        connection,
                        id,
                        self.inner.config.session_ttl,
                    )
                    .await;
            })
            .await;

        info!(session = %id, %code, bots = bot_seats, "session created");
        self.inner
            .clients
            .send(
                connection,
                ServerMessage::SessionCreated {
                    session,
                    player: host_id,
                },
            )
            .await;
        Ok(())
    }

    pub async fn join_session(
        &self,
        connection: ConnectionId,
        code: &str,
        name: &str,
    ) -> Result<(), EngineError> {
        if self
            .inner
            .store
            .session_by_connection(connection)
            .await
            .is_some()
        {
            return Err(EngineError::AlreadyInSession);
        }
        let code = code.trim().to_uppercase();
        if code.len() != CODE_LEN {
            return Err(EngineError::InvalidCode);
        }
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        let id = self
            .inner
            .store
            .session_by_code(&code)
            .await
            .ok_or(EngineError::SessionNotFound)?;

        self.inner
            .locks
            .run_exclusive(id, || async {
                let mut session = self
                    .inner
                    .store
                    .get(id)
                    .await
                    .ok_or(EngineError::SessionNotFound)?;
                if !session.status.is_joinable() {
                    return Err(EngineError::InvalidStatus {
                        action: "join",
                        status: session.status,
                    });
                }
                if session.players.len() >= self.inner.config.max_players {
                    return Err(EngineError::SessionFull);
                }
                if session
                    .players
                    .iter()
                    .any(|p| p.name.eq_ignore_ascii_case(&name))
                {
                    return Err(EngineError::NameTaken(name.clone()));
                }

                let player =
                    Player::human(self.alloc_player(), connection, &name);
                session.players.push(player.clone());
                self.put(&session).await;
                self.inner
                    .store
                    .bind_connection(
                        connection,
                        id,
                        self.inner.config.session_ttl,
                    )
                    .await;

                debug!(session = %id, player = %player.id, "player joined");
                self.broadcast(&session, ServerMessage::PlayerJoined { player })
                    .await;
                self.broadcast_state(&session).await;
                Ok(())
            })
            .await
    }

    /// Reattaches a dropped player's seat to a fresh connection.
    ///
    /// `SessionNotFound` and `PlayerNotFound` stay distinct so clients
    /// can tell "session expired, go home" from "seat gone, join anew".
    pub async fn rejoin_session(
        &self,
        connection: ConnectionId,
        id: SessionId,
        player_id: PlayerId,
    ) -> Result<(), EngineError> {
        if self
            .inner
            .store
            .session_by_connection(connection)
            .await
            .is_some()
        {
            return Err(EngineError::AlreadyInSession);
        }

        self.inner
            .locks
            .run_exclusive(id, || async {
                let mut session = self
                    .inner
                    .store
                    .get(id)
                    .await
                    .ok_or(EngineError::SessionNotFound)?;
                let player = session
                    .player_mut(player_id)
                    .ok_or(EngineError::PlayerNotFound)?;
                if player.is_bot {
                    return Err(EngineError::PlayerNotFound);
                }
                if player.is_connected {
                    return Err(EngineError::SeatOccupied);
                }

                player.connection = Some(connection);
                player.is_connected = true;
                player.disconnected_at = None;

                self.put(&session).await;
                self.inner
                    .store
                    .bind_connection(
                        connection,
                        id,
                        self.inner.config.session_ttl,
                    )
                    .await;

                info!(session = %id, player = %player_id, "player rejoined");
                self.inner
                    .clients
                    .send(
                        connection,
                        ServerMessage::Rejoined {
                            session: session.clone(),
                            player: player_id,
                        },
                    )
                    .await;
                self.broadcast_state(&session).await;
                Ok(())
            })
            .await
    }

    // -- starting and advancing ----------------------------------------------

    pub async fn start_session(
        &self,
        connection: ConnectionId,
    ) -> Result<(), EngineError> {
        let id = self.bound_session(connection).await?;
        self.inner
            .locks
            .run_exclusive(id, || async {
                let mut session = self
                    .inner
                    .store
                    .get(id)
                    .await
                    .ok_or(EngineError::SessionNotFound)?;
                let actor = session
                    .player_by_connection(connection)
                    .ok_or(EngineError::PlayerNotFound)?;
                if actor.id != session.host {
                    return Err(EngineError::NotHost);
                }
                if !session.status.can_start() {
                    return Err(EngineError::InvalidStatus {
                        action: "start",
                        status: session.status,
                    });
                }
                // Solo rounds are legal: rotation wraps back to the
                // only seat. Clients may impose a higher minimum.
                if session.players.is_empty() {
                    return Err(EngineError::NotEnoughPlayers);
                }

                // Replay from Finished reuses the seats; everything
                // accumulated in the previous round is discarded.
                for phase in 0..session.phases.len() {
                    self.inner.store.clear_scratch(id, phase).await;
                }
                session.votes.clear();
                session.sentences = session
                    .players
                    .iter()
                    .map(|p| Sentence {
                        id: SentenceId(
                            self.inner
                                .next_sentence
                                .fetch_add(1, Ordering::Relaxed),
                        ),
                        words: Vec::new(),
                        current_player: p.id,
                    })
                    .collect();
                session.status = SessionStatus::Playing;
                session.current_phase = 0;

                info!(session = %id, players = session.players.len(), "round started");
                self.open_phase_locked(&mut session).await;
                Ok(())
            })
            .await
    }

    /// Opens `session.current_phase`: resets flags, auto-fills seats
    /// whose players are gone, persists, announces, arms the timer, and
    /// wakes the bots. Caller holds the session lock.
    async fn open_phase_locked(&self, session: &mut Session) {
        for p in &mut session.players {
            p.played_current_phase = false;
        }
        session.phase_started_at = now_ms();
        self.autofill_absent_locked(session).await;

        // Every seat absent: commit on fallbacks and keep going.
        // advance_locked opens the next phase itself.
        if session.all_played() {
            self.advance_locked(session).await;
            return;
        }

        let Some(info) = session.current_phase_spec().cloned() else {
            return;
        };
        self.put(session).await;
        self.broadcast(
            session,
            ServerMessage::PhaseStarted {
                phase: session.current_phase,
                info,
                seconds: session.seconds_per_phase,
            },
        )
        .await;
        self.broadcast_state(session).await;
        self.start_phase_timer(
            session.id,
            session.current_phase,
            session.seconds_per_phase,
        )
        .await;
        self.trigger_bots(session);
    }

    /// Records fallback words for disconnected seats so one absent seat
    /// never stalls a phase.
    async fn autofill_absent_locked(&self, session: &mut Session) {
        let phase_key = session
            .current_phase_spec()
            .map(|p| p.key.clone())
            .unwrap_or_default();
        let mut rng = SmallRng::from_os_rng();
        let absent: Vec<PlayerId> = session
            .players
            .iter()
            .filter(|p| !p.is_connected && !p.played_current_phase)
            .map(|p| p.id)
            .collect();
        for player in absent {
            let word = words::fallback_word(&phase_key, &mut rng);
            self.inner
                .store
                .put_scratch(
                    session.id,
                    session.current_phase,
                    player,
                    word,
                    self.inner.config.scratch_ttl,
                )
                .await;
            if let Some(p) = session.player_mut(player) {
                p.played_current_phase = true;
            }
            debug!(session = %session.id, %player, word, "auto-filled absent seat");
        }
    }

    /// Commits the current phase's scratch words into the sentences,
    /// rotates ownership, then either opens the next phase or moves to
    /// voting. Caller holds the session lock.
    ///
    /// Returns a boxed future rather than being an `async fn`: this and
    /// [`Engine::open_phase_locked`] are mutually recursive, and the
    /// timer task needs the cycle's `Send` bound to be explicit.
    fn advance_locked<'a>(
        &'a self,
        session: &'a mut Session,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let phase = session.current_phase;
            let first = phase == 0;
            let last = session.is_last_phase();
            let phase_key = session
                .current_phase_spec()
                .map(|p| p.key.clone())
                .unwrap_or_default();
            let scratch =
                self.inner.store.scratch_words(session.id, phase).await;
            let order: Vec<PlayerId> =
                session.players.iter().map(|p| p.id).collect();
            let mut rng = SmallRng::from_os_rng();

            for sentence in &mut session.sentences {
                let raw = scratch
                    .get(&sentence.current_player)
                    .map(String::as_str)
                    .unwrap_or_else(|| {
                        words::fallback_word(&phase_key, &mut rng)
                    });
                sentence.words.push(normalize_word(raw, first, last));

                let pos = order
                    .iter()
                    .position(|id| *id == sentence.current_player)
                    .unwrap_or(0);
                sentence.current_player = order[(pos + 1) % order.len()];
            }
            self.inner.store.clear_scratch(session.id, phase).await;

            if last {
                session.status = SessionStatus::Voting;
                self.inner.timers.cancel(session.id).await;
                self.put(session).await;
                info!(session = %session.id, "all phases complete, voting open");
                self.broadcast(session, ServerMessage::VotingStarted).await;
                self.broadcast_state(session).await;
                // All-bot rooms have a zero denominator; finish at once.
                self.check_votes_locked(session).await;
            } else {
                session.current_phase += 1;
                self.open_phase_locked(session).await;
            }
        })
    }

    // -- words ---------------------------------------------------------------

    pub async fn submit_word(
        &self,
        connection: ConnectionId,
        word: &str,
    ) -> Result<(), EngineError> {
        let id = self.bound_session(connection).await?;
        self.inner
            .locks
            .run_exclusive(id, || async {
                let mut session = self
                    .inner
                    .store
                    .get(id)
                    .await
                    .ok_or(EngineError::SessionNotFound)?;
                let player = session
                    .player_by_connection(connection)
                    .ok_or(EngineError::PlayerNotFound)?;
                let player_id = player.id;
                if !session.status.accepts_words() {
                    return Err(EngineError::InvalidStatus {
                        action: "submit a word",
                        status: session.status,
                    });
                }
                if player.played_current_phase {
                    return Err(EngineError::AlreadyPlayed);
                }

                let word = word.trim();
                if word.is_empty() {
                    return Err(EngineError::EmptyInput);
                }
                if word.chars().count() > self.inner.config.max_word_len {
                    return Err(EngineError::WordTooLong(
                        self.inner.config.max_word_len,
                    ));
                }

                self.record_word_locked(&mut session, player_id, word).await;
                Ok(())
            })
            .await
    }

    /// Bot submission path. Deliberately forgiving: if the session
    /// moved on, the phase changed, or the seat already played, this is
    /// a no-op rather than an error — a slow bot is normal, not a bug.
    async fn submit_bot_word(
        &self,
        id: SessionId,
        player_id: PlayerId,
        phase: usize,
        word: &str,
    ) {
        self.inner
            .locks
            .run_exclusive(id, || async {
                let Some(mut session) = self.inner.store.get(id).await else {
                    return;
                };
                if !session.status.accepts_words()
                    || session.current_phase != phase
                {
                    return;
                }
                let Some(player) = session.player(player_id) else {
                    return;
                };
                if player.played_current_phase {
                    return;
                }
                self.record_word_locked(&mut session, player_id, word).await;
            })
            .await;
    }

    /// Shared tail of both submission paths. Caller has validated the
    /// word and holds the lock.
    async fn record_word_locked(
        &self,
        session: &mut Session,
        player_id: PlayerId,
        word: &str,
    ) {
        self.inner
            .store
            .put_scratch(
                session.id,
                session.current_phase,
                player_id,
                word,
                self.inner.config.scratch_ttl,
            )
            .await;
        if let Some(p) = session.player_mut(player_id) {
            p.played_current_phase = true;
        }

        if session.all_played() {
            // The deadline path re-checks the phase index under the
            // lock, so cancelling here means exactly one of the two
            // advance paths runs for this phase.
            self.inner.timers.cancel(session.id).await;
            self.broadcast(
                session,
                ServerMessage::PlayerPlayed { player: player_id },
            )
            .await;
            self.advance_locked(session).await;
        } else {
            self.put(session).await;
            self.broadcast(
                session,
                ServerMessage::PlayerPlayed { player: player_id },
            )
            .await;
            self.broadcast_state(session).await;
        }
    }

    // -- timers --------------------------------------------------------------

    async fn start_phase_timer(
        &self,
        id: SessionId,
        phase: usize,
        seconds: u64,
    ) {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut remaining = seconds;
            while remaining > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining -= 1;
                // Lock-free read; ticks are advisory.
                let Some(session) = engine.inner.store.get(id).await else {
                    return;
                };
                if session.status != SessionStatus::Playing
                    || session.current_phase != phase
                {
                    return;
                }
                engine
                    .broadcast(
                        &session,
                        ServerMessage::Tick {
                            seconds_left: remaining,
                        },
                    )
                    .await;
            }
            // Remove our own handle first so the advance path's cancel
            // doesn't abort us mid-commit.
            engine.inner.timers.detach(id).await;
            engine.force_advance(id, phase).await;
        });
        self.inner.timers.start(id, handle).await;
    }

    /// Deadline expiry. Re-checks under the lock that the phase it was
    /// armed for is still running; if players finished it in the
    /// meantime, this is a no-op.
    async fn force_advance(&self, id: SessionId, phase: usize) {
        self.inner
            .locks
            .run_exclusive(id, || async {
                let Some(mut session) = self.inner.store.get(id).await else {
                    return;
                };
                if session.status != SessionStatus::Playing
                    || session.current_phase != phase
                {
                    return;
                }
                info!(session = %id, phase, "phase deadline reached, forcing advance");
                self.advance_locked(&mut session).await;
            })
            .await;
    }

    // -- bots ----------------------------------------------------------------

    /// Spawns one contribution task per unplayed bot. Each task sleeps a
    /// random "thinking" delay, re-reads the session without the lock,
    /// asks the provider (with a timeout), and submits through the same
    /// locked path humans use.
    fn trigger_bots(&self, session: &Session) {
        let phase = session.current_phase;
        let mut rng = SmallRng::from_os_rng();
        for bot in session
            .players
            .iter()
            .filter(|p| p.is_bot && p.is_connected && !p.played_current_phase)
        {
            let delay = if self.inner.config.bot_delay.is_empty() {
                self.inner.config.bot_delay.start
            } else {
                rng.random_range(
                    self.inner.config.bot_delay.start
                        ..self.inner.config.bot_delay.end,
                )
            };
            let engine = self.clone();
            let id = session.id;
            let bot_id = bot.id;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                engine.run_bot_turn(id, bot_id, phase).await;
            });
        }
    }

    async fn run_bot_turn(&self, id: SessionId, bot_id: PlayerId, phase: usize) {
        // Re-read after the delay; the round may have moved on.
        let Some(session) = self.inner.store.get(id).await else {
            return;
        };
        if !session.status.accepts_words() || session.current_phase != phase {
            return;
        }
        let Some(bot) = session.player(bot_id) else {
            return;
        };
        if bot.played_current_phase {
            return;
        }
        let Some(phase_spec) = session.current_phase_spec() else {
            return;
        };
        let sentence_so_far = session
            .sentences
            .iter()
            .find(|s| s.current_player == bot_id)
            .map(|s| s.words.clone())
            .unwrap_or_default();

        let request = WordRequest {
            phase: phase_spec,
            sentence_so_far: &sentence_so_far,
            persona: bot.persona.as_deref(),
        };
        let word = match tokio::time::timeout(
            self.inner.config.provider_timeout,
            self.inner.provider.contribute(request),
        )
        .await
        {
            Ok(Ok(raw)) => {
                sanitize_contribution(&raw, self.inner.config.max_word_len)
            }
            Ok(Err(err)) => {
                warn!(session = %id, bot = %bot_id, %err, "word provider failed");
                None
            }
            Err(_) => {
                warn!(session = %id, bot = %bot_id, "word provider timed out");
                None
            }
        };
        let word = word.unwrap_or_else(|| {
            let mut rng = SmallRng::from_os_rng();
            words::fallback_word(&phase_spec.key, &mut rng).to_string()
        });

        self.submit_bot_word(id, bot_id, phase, &word).await;
    }

    // -- voting --------------------------------------------------------------

    pub async fn vote(
        &self,
        connection: ConnectionId,
        sentence: SentenceId,
    ) -> Result<(), EngineError> {
        let id = self.bound_session(connection).await?;
        self.inner
            .locks
            .run_exclusive(id, || async {
                let mut session = self
                    .inner
                    .store
                    .get(id)
                    .await
                    .ok_or(EngineError::SessionNotFound)?;
                let player = session
                    .player_by_connection(connection)
                    .ok_or(EngineError::PlayerNotFound)?;
                let player_id = player.id;
                if !session.status.accepts_votes() {
                    return Err(EngineError::InvalidStatus {
                        action: "vote",
                        status: session.status,
                    });
                }
                if session.sentence(sentence).is_none() {
                    return Err(EngineError::SentenceNotFound);
                }
                if session.votes.iter().any(|v| v.player == player_id) {
                    return Err(EngineError::DuplicateVote);
                }

                session.votes.push(wordweave_protocol::Vote {
                    player: player_id,
                    sentence,
                });
                self.put(&session).await;
                self.broadcast(
                    &session,
                    ServerMessage::PlayerVoted { player: player_id },
                )
                .await;
                self.broadcast_state(&session).await;
                self.check_votes_locked(&mut session).await;
                Ok(())
            })
            .await
    }

    /// Finishes the round once every connected human has voted. The
    /// denominator deliberately ignores bots and the disconnected, so a
    /// ghost seat can never hold the results hostage.
    async fn check_votes_locked(&self, session: &mut Session) {
        if session.status != SessionStatus::Voting
            || session.votes.len() < session.connected_human_count()
        {
            return;
        }

        session.status = SessionStatus::Finished;
        let mut ranking: Vec<RankedSentence> = session
            .sentences
            .iter()
            .map(|s| RankedSentence {
                sentence: s.clone(),
                votes: session
                    .votes
                    .iter()
                    .filter(|v| v.sentence == s.id)
                    .count(),
            })
            .collect();
        // Stable sort: ties stay in seat order.
        ranking.sort_by_key(|r| std::cmp::Reverse(r.votes));

        self.put(session).await;
        info!(session = %session.id, "round finished");
        self.broadcast(session, ServerMessage::Results { ranking })
            .await;
        self.broadcast_state(session).await;
    }

    // -- leaving, kicking, disconnects ---------------------------------------

    pub async fn leave_session(
        &self,
        connection: ConnectionId,
    ) -> Result<(), EngineError> {
        let id = self.bound_session(connection).await?;
        self.inner.store.unbind_connection(connection).await;
        self.inner
            .locks
            .run_exclusive(id, || async {
                let Some(mut session) = self.inner.store.get(id).await else {
                    return Ok(());
                };
                let Some(player) = session.player_by_connection(connection)
                else {
                    return Ok(());
                };
                let player_id = player.id;
                self.depart_locked(&mut session, player_id, Departure::Left)
                    .await;
                Ok(())
            })
            .await
    }

    /// Transport-level connection loss. Same session semantics as a
    /// voluntary leave; additionally tears down the outbound channel.
    pub async fn disconnect(&self, connection: ConnectionId) {
        self.inner.clients.disconnect(connection).await;
        let _ = self.leave_session(connection).await;
    }

    pub async fn remove_player(
        &self,
        connection: ConnectionId,
        target: PlayerId,
    ) -> Result<(), EngineError> {
        let id = self.bound_session(connection).await?;
        self.inner
            .locks
            .run_exclusive(id, || async {
                let mut session = self
                    .inner
                    .store
                    .get(id)
                    .await
                    .ok_or(EngineError::SessionNotFound)?;
                let actor = session
                    .player_by_connection(connection)
                    .ok_or(EngineError::PlayerNotFound)?;
                if actor.id != session.host {
                    return Err(EngineError::NotHost);
                }
                let removed = session
                    .player(target)
                    .ok_or(EngineError::PlayerNotFound)?;

                if let Some(conn) = removed.connection {
                    self.inner.store.unbind_connection(conn).await;
                    self.inner
                        .clients
                        .send(
                            conn,
                            ServerMessage::PlayerRemoved { player: target },
                        )
                        .await;
                }
                self.depart_locked(&mut session, target, Departure::Removed)
                    .await;
                Ok(())
            })
            .await
    }

    /// Shared departure semantics. In the waiting room the seat is
    /// removed outright; once play has started the seat is only marked
    /// disconnected so rotation and sentences stay intact. Handles host
    /// transfer, mid-phase auto-fill, vote re-evaluation, and deleting
    /// sessions with no humans left. Caller holds the lock.
    async fn depart_locked(
        &self,
        session: &mut Session,
        player_id: PlayerId,
        reason: Departure,
    ) {
        let was_host = session.host == player_id;

        if session.status == SessionStatus::Waiting {
            session.players.retain(|p| p.id != player_id);
        } else if let Some(p) = session.player_mut(player_id) {
            // Seats are never deleted once play has started; rotation
            // and sentence ownership depend on the seat order.
            p.is_connected = false;
            p.connection = None;
            p.disconnected_at = Some(now_ms());
        }

        let gone = match reason {
            Departure::Left => ServerMessage::PlayerLeft { player: player_id },
            Departure::Removed => {
                ServerMessage::PlayerRemoved { player: player_id }
            }
        };
        self.broadcast(session, gone).await;
        debug!(session = %session.id, player = %player_id, "player departed");

        // No connected humans left: nobody to play for, tear it down.
        if session.connected_human_count() == 0 {
            self.cleanup_session(session, ServerMessage::SessionDeleted)
                .await;
            return;
        }

        if was_host {
            if let Some(new_host) = session
                .players
                .iter()
                .find(|p| !p.is_bot && p.is_connected)
                .map(|p| p.id)
            {
                session.host = new_host;
                if let Some(p) = session.player_mut(new_host) {
                    p.is_host = true;
                }
                info!(session = %session.id, host = %new_host, "host transferred");
                self.broadcast(
                    session,
                    ServerMessage::HostChanged { host: new_host },
                )
                .await;
            }
        }
        if let Some(p) = session.player_mut(player_id) {
            p.is_host = false;
        }

        match session.status {
            SessionStatus::Playing => {
                self.autofill_absent_locked(session).await;
                if session.all_played() {
                    self.inner.timers.cancel(session.id).await;
                    self.advance_locked(session).await;
                    return;
                }
            }
            SessionStatus::Voting => {
                // The denominator shrank; the remaining votes may now
                // be enough.
                self.put(session).await;
                self.broadcast_state(session).await;
                self.check_votes_locked(session).await;
                return;
            }
            _ => {}
        }

        self.put(session).await;
        self.broadcast_state(session).await;
    }

    // -- cancellation and cleanup --------------------------------------------

    pub async fn cancel_session(
        &self,
        connection: ConnectionId,
    ) -> Result<(), EngineError> {
        let id = self.bound_session(connection).await?;
        self.inner
            .locks
            .run_exclusive(id, || async {
                let mut session = self
                    .inner
                    .store
                    .get(id)
                    .await
                    .ok_or(EngineError::SessionNotFound)?;
                let actor = session
                    .player_by_connection(connection)
                    .ok_or(EngineError::PlayerNotFound)?;
                if actor.id != session.host {
                    return Err(EngineError::NotHost);
                }

                info!(session = %id, "session cancelled by host");
                self.cleanup_session(
                    &mut session,
                    ServerMessage::SessionCanceled,
                )
                .await;
                Ok(())
            })
            .await
    }

    /// Full teardown: timer, scratch, indexes, snapshot. `farewell` is
    /// broadcast before the connection bindings disappear.
    async fn cleanup_session(
        &self,
        session: &mut Session,
        farewell: ServerMessage,
    ) {
        self.inner.timers.cancel(session.id).await;
        self.broadcast(session, farewell).await;
        for phase in 0..session.phases.len() {
            self.inner.store.clear_scratch(session.id, phase).await;
        }
        for conn in session.players.iter().filter_map(|p| p.connection) {
            self.inner.store.unbind_connection(conn).await;
        }
        self.inner.store.release_code(&session.code).await;
        self.inner.store.delete(session.id).await;
        info!(session = %session.id, "session deleted");
    }
}
