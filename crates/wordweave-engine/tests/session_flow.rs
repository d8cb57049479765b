//! Integration tests driving the engine the way the server does: one
//! registry connection per player, engine calls in, broadcast messages
//! out. Timer behavior is tested with real (short) phases; everything
//! else uses long phases so no deadline interferes.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use wordweave_engine::{Engine, EngineConfig, EngineError, LexiconProvider};
use wordweave_protocol::{
    default_phases, ConnectionId, PlayerId, ServerMessage, Session,
    SessionStatus,
};
use wordweave_store::{MemoryStore, SnapshotStore};

type TestEngine = Engine<MemoryStore, LexiconProvider>;
type Rx = UnboundedReceiver<ServerMessage>;

/// Long enough that no deadline fires during a test.
const UNTIMED: u64 = 600;

fn engine() -> TestEngine {
    Engine::new(
        MemoryStore::new(),
        LexiconProvider::seeded(7),
        EngineConfig::instant(),
    )
}

fn engine_with_phases(count: usize) -> TestEngine {
    let mut phases = default_phases();
    phases.truncate(count);
    Engine::new(
        MemoryStore::new(),
        LexiconProvider::seeded(7),
        EngineConfig {
            phases,
            ..EngineConfig::instant()
        },
    )
}

async fn recv(rx: &mut Rx) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("message channel closed")
}

/// Skips messages until one matches.
async fn recv_until<F>(rx: &mut Rx, pred: F) -> ServerMessage
where
    F: Fn(&ServerMessage) -> bool,
{
    loop {
        let message = recv(rx).await;
        if pred(&message) {
            return message;
        }
    }
}

async fn create(
    engine: &TestEngine,
    name: &str,
    bots: u8,
    seconds: u64,
) -> (ConnectionId, Rx, Session) {
    let (conn, mut rx) = engine.clients().connect().await;
    engine
        .create_session(conn, name, bots, Some(seconds))
        .await
        .expect("create should succeed");
    let ServerMessage::SessionCreated { session, .. } = recv(&mut rx).await
    else {
        panic!("expected SessionCreated first");
    };
    (conn, rx, session)
}

async fn join(
    engine: &TestEngine,
    code: &str,
    name: &str,
) -> (ConnectionId, Rx) {
    let (conn, mut rx) = engine.clients().connect().await;
    engine
        .join_session(conn, code, name)
        .await
        .expect("join should succeed");
    // The joiner's first full snapshot.
    recv_until(&mut rx, |m| {
        matches!(m, ServerMessage::SessionState { .. })
    })
    .await;
    (conn, rx)
}

async fn snapshot(engine: &TestEngine, session: &Session) -> Session {
    engine
        .store()
        .get(session.id)
        .await
        .expect("session should exist")
}

// =========================================================================
// Create / join
// =========================================================================

#[tokio::test]
async fn test_create_session_sets_up_host_and_bots() {
    let engine = engine();
    let (_conn, _rx, session) = create(&engine, "alice", 2, UNTIMED).await;

    assert_eq!(session.code.len(), 6);
    assert_eq!(session.status, SessionStatus::Waiting);
    assert_eq!(session.players.len(), 3);
    let host = session.player(session.host).unwrap();
    assert!(host.is_host);
    assert!(!host.is_bot);
    assert_eq!(session.players.iter().filter(|p| p.is_bot).count(), 2);
    // Bot seats carry personas for the word provider.
    assert!(session
        .players
        .iter()
        .filter(|p| p.is_bot)
        .all(|p| p.persona.is_some()));
}

#[tokio::test]
async fn test_create_rejects_blank_name() {
    let engine = engine();
    let (conn, _rx) = engine.clients().connect().await;
    let result = engine.create_session(conn, "   ", 0, None).await;
    assert_eq!(result, Err(EngineError::EmptyInput));
}

#[tokio::test]
async fn test_join_unknown_code_is_not_found() {
    let engine = engine();
    let (conn, _rx) = engine.clients().connect().await;
    let result = engine.join_session(conn, "ZZZZZZ", "bob").await;
    assert_eq!(result, Err(EngineError::SessionNotFound));
}

#[tokio::test]
async fn test_join_code_is_case_insensitive() {
    let engine = engine();
    let (_c, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;

    let (conn, _rx2) = engine.clients().connect().await;
    let lower = session.code.to_lowercase();
    assert!(engine.join_session(conn, &lower, "bob").await.is_ok());
}

#[tokio::test]
async fn test_join_duplicate_name_rejected() {
    let engine = engine();
    let (_c, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;

    let (conn, _rx2) = engine.clients().connect().await;
    let result = engine.join_session(conn, &session.code, "ALICE").await;
    assert!(matches!(result, Err(EngineError::NameTaken(_))));
}

#[tokio::test]
async fn test_join_after_start_rejected() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    let (late, _rx3) = engine.clients().connect().await;
    let result = engine.join_session(late, &session.code, "carol").await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidStatus { .. })
    ));
}

// =========================================================================
// Starting
// =========================================================================

#[tokio::test]
async fn test_start_requires_host() {
    let engine = engine();
    let (_host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;

    assert_eq!(engine.start_session(bob).await, Err(EngineError::NotHost));
}

#[tokio::test]
async fn test_start_alone_plays_a_full_round() {
    let engine = engine_with_phases(2);
    let (host, mut rx, session) = create(&engine, "alice", 0, UNTIMED).await;

    engine.start_session(host).await.unwrap();
    let current = snapshot(&engine, &session).await;
    assert_eq!(current.status, SessionStatus::Playing);
    assert_eq!(current.sentences.len(), 1);

    // Rotation wraps back to the only seat, so a solo session still
    // completes every phase.
    engine.submit_word(host, "walrus").await.unwrap();
    engine.submit_word(host, "hums").await.unwrap();
    recv_until(&mut rx, |m| matches!(m, ServerMessage::VotingStarted)).await;

    let sentence = snapshot(&engine, &session).await.sentences[0].id;
    engine.vote(host, sentence).await.unwrap();
    assert_eq!(
        snapshot(&engine, &session).await.status,
        SessionStatus::Finished
    );
}

#[tokio::test]
async fn test_start_creates_one_sentence_per_seat() {
    let engine = engine();
    let (host, mut rx, session) = create(&engine, "alice", 1, UNTIMED).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    let ServerMessage::PhaseStarted { phase, seconds, .. } =
        recv_until(&mut rx, |m| {
            matches!(m, ServerMessage::PhaseStarted { .. })
        })
        .await
    else {
        unreachable!();
    };
    assert_eq!(phase, 0);
    assert_eq!(seconds, UNTIMED);

    let current = snapshot(&engine, &session).await;
    assert_eq!(current.status, SessionStatus::Playing);
    assert_eq!(current.sentences.len(), 3);
    // Each sentence starts with its own seat's player.
    for player in &current.players {
        assert!(current
            .sentences
            .iter()
            .any(|s| s.current_player == player.id));
    }
}

#[tokio::test]
async fn test_double_start_rejected() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    assert!(matches!(
        engine.start_session(host).await,
        Err(EngineError::InvalidStatus { .. })
    ));
}

// =========================================================================
// Words and phase advancement
// =========================================================================

#[tokio::test]
async fn test_submit_word_validation() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    assert_eq!(
        engine.submit_word(host, "   ").await,
        Err(EngineError::EmptyInput)
    );
    let too_long = "a".repeat(40);
    assert_eq!(
        engine.submit_word(host, &too_long).await,
        Err(EngineError::WordTooLong(24))
    );
}

#[tokio::test]
async fn test_submit_before_start_rejected() {
    let engine = engine();
    let (host, _rx, _session) = create(&engine, "alice", 0, UNTIMED).await;
    assert!(matches!(
        engine.submit_word(host, "walrus").await,
        Err(EngineError::InvalidStatus { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_human_submit_rejected() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    engine.submit_word(host, "walrus").await.unwrap();
    assert_eq!(
        engine.submit_word(host, "badger").await,
        Err(EngineError::AlreadyPlayed)
    );
}

#[tokio::test]
async fn test_all_played_advances_immediately() {
    let engine = engine();
    let (host, mut rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    engine.submit_word(host, "walrus").await.unwrap();
    engine.submit_word(bob, "comet").await.unwrap();

    let ServerMessage::PhaseStarted { phase, .. } = recv_until(&mut rx, |m| {
        matches!(m, ServerMessage::PhaseStarted { phase: 1, .. })
    })
    .await
    else {
        unreachable!();
    };
    assert_eq!(phase, 1);

    let current = snapshot(&engine, &session).await;
    assert_eq!(current.current_phase, 1);
    assert!(current.sentences.iter().all(|s| s.words.len() == 1));
    // Flags reset for the new phase.
    assert!(current.players.iter().all(|p| !p.played_current_phase));
}

#[tokio::test]
async fn test_sentence_rotation_passes_to_next_seat() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    let before = snapshot(&engine, &session).await;
    engine.submit_word(host, "walrus").await.unwrap();
    engine.submit_word(bob, "comet").await.unwrap();
    let after = snapshot(&engine, &session).await;

    // With two seats, each sentence's owner must have flipped.
    for (b, a) in before.sentences.iter().zip(after.sentences.iter()) {
        assert_eq!(b.id, a.id);
        assert_ne!(b.current_player, a.current_player);
    }
}

#[tokio::test]
async fn test_full_round_reaches_voting_with_complete_sentences() {
    let engine = engine();
    let (host, mut rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    let phase_count = session.phases.len();
    for _ in 0..phase_count {
        engine.submit_word(host, "walrus").await.unwrap();
        engine.submit_word(bob, "comet").await.unwrap();
    }

    recv_until(&mut rx, |m| matches!(m, ServerMessage::VotingStarted)).await;

    let current = snapshot(&engine, &session).await;
    assert_eq!(current.status, SessionStatus::Voting);
    for sentence in &current.sentences {
        assert_eq!(sentence.words.len(), phase_count);
        // Reads as a sentence: leading capital, terminal punctuation.
        let first = sentence.words[0].chars().next().unwrap();
        assert!(first.is_uppercase());
        let last = sentence.words.last().unwrap();
        assert!(last.ends_with(['.', '!', '?']));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_all_recorded() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let names = ["bob", "carol", "dave"];
    let mut conns = vec![host];
    for name in names {
        let (conn, _rx) = join(&engine, &session.code, name).await;
        conns.push(conn);
    }
    engine.start_session(host).await.unwrap();

    let submitted = ["ant", "bee", "cat", "dog"];
    let mut handles = Vec::new();
    for (conn, word) in conns.into_iter().zip(submitted) {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.submit_word(conn, word).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let current = snapshot(&engine, &session).await;
    // All four landed and committed exactly once.
    assert_eq!(current.current_phase, 1);
    let mut committed: Vec<String> = current
        .sentences
        .iter()
        .map(|s| s.words[0].to_lowercase())
        .collect();
    committed.sort();
    assert_eq!(committed, ["ant", "bee", "cat", "dog"]);
}

// =========================================================================
// Timers
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_forces_advance_with_fallback_words() {
    let engine = engine_with_phases(2);
    let (host, mut rx, session) = create(&engine, "alice", 0, 1).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    // Nobody submits anything; both 1-second deadlines must fire.
    recv_until(&mut rx, |m| matches!(m, ServerMessage::VotingStarted)).await;

    let current = snapshot(&engine, &session).await;
    assert_eq!(current.status, SessionStatus::Voting);
    assert!(current
        .sentences
        .iter()
        .all(|s| s.words.len() == 2 && !s.words[0].is_empty()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ticks_count_down_while_phase_runs() {
    let engine = engine();
    let (host, mut rx, session) = create(&engine, "alice", 0, 3).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    let ServerMessage::Tick { seconds_left } = recv_until(&mut rx, |m| {
        matches!(m, ServerMessage::Tick { .. })
    })
    .await
    else {
        unreachable!();
    };
    assert!(seconds_left < 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_phase_opens_exactly_once_per_index() {
    let engine = engine_with_phases(2);
    let (host, mut rx, session) = create(&engine, "alice", 0, 2).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    // Finish phase 0 early, then let phase 1's deadline fire; the
    // cancelled phase-0 timer must not produce a second advance.
    engine.submit_word(host, "walrus").await.unwrap();
    engine.submit_word(bob, "comet").await.unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let mut phase_one_opens = 0;
    while let Ok(message) = rx.try_recv() {
        if matches!(message, ServerMessage::PhaseStarted { phase: 1, .. }) {
            phase_one_opens += 1;
        }
    }
    assert_eq!(phase_one_opens, 1);
    let current = snapshot(&engine, &session).await;
    assert_eq!(current.status, SessionStatus::Voting);
}

// =========================================================================
// Disconnects, leaving, kicking
// =========================================================================

#[tokio::test]
async fn test_disconnect_midphase_autofills_and_advances() {
    let engine = engine();
    let (host, mut rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    engine.submit_word(host, "walrus").await.unwrap();
    engine.disconnect(bob).await;

    recv_until(&mut rx, |m| {
        matches!(m, ServerMessage::PhaseStarted { phase: 1, .. })
    })
    .await;
    let current = snapshot(&engine, &session).await;
    assert_eq!(current.current_phase, 1);
    assert!(current.sentences.iter().all(|s| s.words.len() == 1));
    let bob_seat = current.players.iter().find(|p| p.name == "bob").unwrap();
    assert!(!bob_seat.is_connected);
    assert!(bob_seat.disconnected_at.is_some());
}

#[tokio::test]
async fn test_disconnected_seat_is_autofilled_every_phase() {
    let engine = engine_with_phases(2);
    let (host, mut rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();
    engine.disconnect(bob).await;

    // Only the host is left to play; bob's seat keeps up on fallbacks.
    engine.submit_word(host, "walrus").await.unwrap();
    engine.submit_word(host, "hums").await.unwrap();

    recv_until(&mut rx, |m| matches!(m, ServerMessage::VotingStarted)).await;
    let current = snapshot(&engine, &session).await;
    assert!(current.sentences.iter().all(|s| s.words.len() == 2));
}

#[tokio::test]
async fn test_leave_in_waiting_room_removes_seat() {
    let engine = engine();
    let (_host, mut rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;

    engine.leave_session(bob).await.unwrap();
    recv_until(&mut rx, |m| matches!(m, ServerMessage::PlayerLeft { .. }))
        .await;

    let current = snapshot(&engine, &session).await;
    assert_eq!(current.players.len(), 1);
}

#[tokio::test]
async fn test_last_human_leaving_deletes_session() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 2, UNTIMED).await;

    engine.leave_session(host).await.unwrap();

    assert!(engine.store().get(session.id).await.is_none());
    // The code is free for new sessions again.
    assert!(engine.store().code_available(&session.code).await);
}

#[tokio::test]
async fn test_host_leave_transfers_host_to_connected_human() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 1, UNTIMED).await;
    let (_bob, mut bob_rx) = join(&engine, &session.code, "bob").await;

    engine.leave_session(host).await.unwrap();

    let ServerMessage::HostChanged { host: new_host } =
        recv_until(&mut bob_rx, |m| {
            matches!(m, ServerMessage::HostChanged { .. })
        })
        .await
    else {
        unreachable!();
    };

    let current = snapshot(&engine, &session).await;
    assert_eq!(current.host, new_host);
    let holder = current.player(new_host).unwrap();
    assert_eq!(holder.name, "bob");
    assert!(holder.is_host);
    assert!(!holder.is_bot);
    // Exactly one host at all times.
    assert_eq!(current.players.iter().filter(|p| p.is_host).count(), 1);
}

#[tokio::test]
async fn test_remove_player_is_host_only() {
    let engine = engine();
    let (_host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    let (carol, _rx3) = join(&engine, &session.code, "carol").await;

    let current = snapshot(&engine, &session).await;
    let carol_id = current
        .players
        .iter()
        .find(|p| p.name == "carol")
        .map(|p| p.id)
        .unwrap();

    assert_eq!(
        engine.remove_player(bob, carol_id).await,
        Err(EngineError::NotHost)
    );
}

#[tokio::test]
async fn test_host_removes_player_and_target_is_notified() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (_bob, mut bob_rx) = join(&engine, &session.code, "bob").await;

    let current = snapshot(&engine, &session).await;
    let bob_id = current
        .players
        .iter()
        .find(|p| p.name == "bob")
        .map(|p| p.id)
        .unwrap();

    engine.remove_player(host, bob_id).await.unwrap();

    let ServerMessage::PlayerRemoved { player } =
        recv_until(&mut bob_rx, |m| {
            matches!(m, ServerMessage::PlayerRemoved { .. })
        })
        .await
    else {
        unreachable!();
    };
    assert_eq!(player, bob_id);
    let current = snapshot(&engine, &session).await;
    assert!(current.player(bob_id).is_none());
}

// =========================================================================
// Rejoin
// =========================================================================

#[tokio::test]
async fn test_rejoin_distinguishes_missing_session_from_missing_player() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();
    engine.disconnect(bob).await;

    let (fresh, _rx3) = engine.clients().connect().await;
    assert_eq!(
        engine
            .rejoin_session(fresh, wordweave_protocol::SessionId(999), PlayerId(1))
            .await,
        Err(EngineError::SessionNotFound)
    );
    assert_eq!(
        engine
            .rejoin_session(fresh, session.id, PlayerId(999))
            .await,
        Err(EngineError::PlayerNotFound)
    );
}

#[tokio::test]
async fn test_rejoin_restores_dropped_seat() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    let bob_id = snapshot(&engine, &session)
        .await
        .players
        .iter()
        .find(|p| p.name == "bob")
        .map(|p| p.id)
        .unwrap();
    engine.disconnect(bob).await;

    let (fresh, mut fresh_rx) = engine.clients().connect().await;
    engine
        .rejoin_session(fresh, session.id, bob_id)
        .await
        .unwrap();

    let ServerMessage::Rejoined { player, .. } =
        recv_until(&mut fresh_rx, |m| {
            matches!(m, ServerMessage::Rejoined { .. })
        })
        .await
    else {
        unreachable!();
    };
    assert_eq!(player, bob_id);

    let current = snapshot(&engine, &session).await;
    let seat = current.player(bob_id).unwrap();
    assert!(seat.is_connected);
    assert!(seat.disconnected_at.is_none());
}

#[tokio::test]
async fn test_rejoin_occupied_seat_rejected() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    let bob_id = snapshot(&engine, &session)
        .await
        .players
        .iter()
        .find(|p| p.name == "bob")
        .map(|p| p.id)
        .unwrap();

    let (fresh, _rx3) = engine.clients().connect().await;
    assert_eq!(
        engine.rejoin_session(fresh, session.id, bob_id).await,
        Err(EngineError::SeatOccupied)
    );
}

// =========================================================================
// Voting and results
// =========================================================================

/// Plays every phase with the given connections and returns once the
/// session accepts votes.
async fn play_to_voting(
    engine: &TestEngine,
    session: &Session,
    conns: &[ConnectionId],
) {
    let phases = snapshot(engine, session).await.phases.len();
    for _ in 0..phases {
        for conn in conns {
            engine.submit_word(*conn, "walrus").await.unwrap();
        }
    }
    assert_eq!(
        snapshot(engine, session).await.status,
        SessionStatus::Voting
    );
}

#[tokio::test]
async fn test_vote_rules_enforced() {
    let engine = engine_with_phases(2);
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    // Too early.
    let some_sentence = snapshot(&engine, &session).await.sentences[0].id;
    assert!(matches!(
        engine.vote(host, some_sentence).await,
        Err(EngineError::InvalidStatus { .. })
    ));

    play_to_voting(&engine, &session, &[host, bob]).await;

    // Unknown sentence.
    assert_eq!(
        engine.vote(host, wordweave_protocol::SentenceId(9999)).await,
        Err(EngineError::SentenceNotFound)
    );

    // One vote per player.
    engine.vote(host, some_sentence).await.unwrap();
    assert_eq!(
        engine.vote(host, some_sentence).await,
        Err(EngineError::DuplicateVote)
    );
}

#[tokio::test]
async fn test_all_votes_in_produces_ranked_results() {
    let engine = engine_with_phases(2);
    let (host, mut rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    let (carol, _rx3) = join(&engine, &session.code, "carol").await;
    engine.start_session(host).await.unwrap();
    play_to_voting(&engine, &session, &[host, bob, carol]).await;

    let sentences = snapshot(&engine, &session).await.sentences.clone();
    // Two votes for the first sentence, one for the second.
    engine.vote(host, sentences[0].id).await.unwrap();
    engine.vote(bob, sentences[0].id).await.unwrap();
    engine.vote(carol, sentences[1].id).await.unwrap();

    let ServerMessage::Results { ranking } = recv_until(&mut rx, |m| {
        matches!(m, ServerMessage::Results { .. })
    })
    .await
    else {
        unreachable!();
    };

    assert_eq!(ranking.len(), 3);
    assert_eq!(ranking[0].sentence.id, sentences[0].id);
    assert_eq!(ranking[0].votes, 2);
    assert_eq!(ranking[1].sentence.id, sentences[1].id);
    assert_eq!(ranking[1].votes, 1);
    assert_eq!(ranking[2].votes, 0);
    assert_eq!(
        snapshot(&engine, &session).await.status,
        SessionStatus::Finished
    );
}

#[tokio::test]
async fn test_vote_completion_ignores_disconnected_voter() {
    let engine = engine_with_phases(2);
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    let (carol, _rx3) = join(&engine, &session.code, "carol").await;
    engine.start_session(host).await.unwrap();
    play_to_voting(&engine, &session, &[host, bob, carol]).await;

    let sentences = snapshot(&engine, &session).await.sentences.clone();
    engine.vote(host, sentences[0].id).await.unwrap();
    engine.vote(bob, sentences[1].id).await.unwrap();
    // Carol never votes; her disconnect must complete the round.
    engine.disconnect(carol).await;

    assert_eq!(
        snapshot(&engine, &session).await.status,
        SessionStatus::Finished
    );
}

// =========================================================================
// Replay, cancel
// =========================================================================

#[tokio::test]
async fn test_replay_resets_round_state() {
    let engine = engine_with_phases(2);
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();
    play_to_voting(&engine, &session, &[host, bob]).await;

    let sentences = snapshot(&engine, &session).await.sentences.clone();
    engine.vote(host, sentences[0].id).await.unwrap();
    engine.vote(bob, sentences[0].id).await.unwrap();
    assert_eq!(
        snapshot(&engine, &session).await.status,
        SessionStatus::Finished
    );

    // Same host, same seats, fresh round.
    engine.start_session(host).await.unwrap();
    let current = snapshot(&engine, &session).await;
    assert_eq!(current.status, SessionStatus::Playing);
    assert_eq!(current.current_phase, 0);
    assert!(current.votes.is_empty());
    assert!(current.sentences.iter().all(|s| s.words.is_empty()));
    // New sentence ids, not the finished round's.
    for s in &current.sentences {
        assert!(!sentences.iter().any(|old| old.id == s.id));
    }
}

#[tokio::test]
async fn test_replay_autofills_seat_dropped_between_rounds() {
    let engine = engine_with_phases(2);
    let (host, mut rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();
    play_to_voting(&engine, &session, &[host, bob]).await;

    let sentences = snapshot(&engine, &session).await.sentences.clone();
    engine.vote(host, sentences[0].id).await.unwrap();
    engine.vote(bob, sentences[0].id).await.unwrap();

    // Bob drops after the results; his seat survives into the replay
    // and is auto-filled from phase 0 onward.
    engine.disconnect(bob).await;
    engine.start_session(host).await.unwrap();

    let current = snapshot(&engine, &session).await;
    assert_eq!(current.status, SessionStatus::Playing);
    assert_eq!(current.players.len(), 2);
    let bob_seat = current.players.iter().find(|p| p.name == "bob").unwrap();
    assert!(!bob_seat.is_connected);
    assert!(bob_seat.played_current_phase);

    // The host's word is all phase 0 still needs.
    engine.submit_word(host, "walrus").await.unwrap();
    recv_until(&mut rx, |m| {
        matches!(m, ServerMessage::PhaseStarted { phase: 1, .. })
    })
    .await;
    assert!(snapshot(&engine, &session)
        .await
        .sentences
        .iter()
        .all(|s| s.words.len() == 1));
}

#[tokio::test]
async fn test_cancel_is_host_only_and_tears_down() {
    let engine = engine();
    let (host, _rx, session) = create(&engine, "alice", 0, UNTIMED).await;
    let (bob, mut bob_rx) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    assert_eq!(
        engine.cancel_session(bob).await,
        Err(EngineError::NotHost)
    );

    engine.cancel_session(host).await.unwrap();
    recv_until(&mut bob_rx, |m| {
        matches!(m, ServerMessage::SessionCanceled)
    })
    .await;

    assert!(engine.store().get(session.id).await.is_none());
    assert!(engine.store().code_available(&session.code).await);
}

// =========================================================================
// Bots
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bots_contribute_and_round_completes() {
    let engine = engine_with_phases(2);
    let (host, mut rx, session) = create(&engine, "alice", 2, UNTIMED).await;
    let (_bob, _rx2) = join(&engine, &session.code, "bob").await;
    engine.start_session(host).await.unwrap();

    // Humans answer instantly; the (instant-delay) bots must keep up.
    engine.submit_word(host, "walrus").await.unwrap();
    engine.submit_word(_bob, "comet").await.unwrap();
    recv_until(&mut rx, |m| {
        matches!(m, ServerMessage::PhaseStarted { phase: 1, .. })
    })
    .await;
    engine.submit_word(host, "hums").await.unwrap();
    engine.submit_word(_bob, "sings").await.unwrap();

    recv_until(&mut rx, |m| matches!(m, ServerMessage::VotingStarted)).await;
    let current = snapshot(&engine, &session).await;
    assert_eq!(current.sentences.len(), 4);
    assert!(current
        .sentences
        .iter()
        .all(|s| s.words.len() == 2 && s.words.iter().all(|w| !w.is_empty())));
}
