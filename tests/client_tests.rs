//! Integration-style client tests for the QuizWire client.
//!
//! Uses the shared `MockTransport` from `tests/common` to script server
//! responses and verify that `QuizWireClient` processes them correctly,
//! including phase transitions, wire message generation, event delivery,
//! and session persistence across simulated reloads.

mod common;

use quizwire_client::protocol::{ClientMessage, GameStatus};
use quizwire_client::{
    OpenDirectory, QuizWireClient, QuizWireConfig, QuizWireError, QuizWireEvent, Screen,
    SessionStore,
};

use common::{
    answer_result_json, game_joined_json, join_error_json, player_reconnected_json, pong_json,
    question_ended_json, question_started_json, reconnect_error_json, MockTransport,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Start a client over a scripted transport with the given session store.
#[allow(clippy::type_complexity)]
fn start_client(
    incoming: Vec<Option<Result<String, QuizWireError>>>,
    session: SessionStore,
) -> (
    QuizWireClient,
    tokio::sync::mpsc::Receiver<QuizWireEvent>,
    std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    std::sync::Arc<std::sync::atomic::AtomicBool>,
) {
    let (transport, sent, closed) = MockTransport::new(incoming);
    let (client, events) =
        QuizWireClient::start(transport, session, OpenDirectory, QuizWireConfig::new());
    (client, events, sent, closed)
}

/// Consume the synthetic `Connected` event that always opens the stream.
async fn drain_connected(rx: &mut tokio::sync::mpsc::Receiver<QuizWireEvent>) {
    let ev = rx.recv().await.expect("expected Connected event");
    assert!(
        matches!(ev, QuizWireEvent::Connected),
        "first event should be Connected, got {ev:?}"
    );
}

/// Skip events until one matches the predicate, returning it.
async fn next_matching(
    rx: &mut tokio::sync::mpsc::Receiver<QuizWireEvent>,
    pred: impl Fn(&QuizWireEvent) -> bool,
) -> QuizWireEvent {
    loop {
        let ev = rx.recv().await.expect("event stream ended unexpectedly");
        if pred(&ev) {
            return ev;
        }
    }
}

fn parsed_sent(sent: &std::sync::Arc<std::sync::Mutex<Vec<String>>>) -> Vec<ClientMessage> {
    sent.lock()
        .expect("sent mutex")
        .iter()
        .map(|json| serde_json::from_str(json).expect("parse sent message"))
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Fresh join flow
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fresh_join_flow() {
    let (mut client, mut events, sent, _closed) = start_client(
        vec![Some(Ok(game_joined_json("tok-1", "player-1")))],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    client.join("123456").expect("join");

    let ev = next_matching(&mut events, |e| matches!(e, QuizWireEvent::Joined { .. })).await;
    if let QuizWireEvent::Joined {
        game_code,
        player_id,
    } = ev
    {
        assert_eq!(game_code, "123456");
        assert_eq!(player_id, "player-1");
    }

    let ev = events.recv().await.expect("event");
    assert_eq!(ev, QuizWireEvent::Navigate(Screen::Game));

    assert!(client.is_in_game());
    assert_eq!(client.current_game_code().await.as_deref(), Some("123456"));
    assert_eq!(client.current_player_id().await.as_deref(), Some("player-1"));

    let messages = parsed_sent(&sent);
    assert_eq!(
        messages,
        vec![ClientMessage::JoinGame {
            game_code: "123456".into(),
        }]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn join_error_surfaces_and_clears_entered_code() {
    let (mut client, mut events, _sent, _closed) = start_client(
        vec![Some(Ok(join_error_json("game not found")))],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    client.join("999999").expect("join");

    let ev = next_matching(&mut events, |e| matches!(e, QuizWireEvent::JoinFailed { .. })).await;
    if let QuizWireEvent::JoinFailed { message } = ev {
        assert_eq!(message, "game not found");
    }

    assert!(!client.is_in_game());
    assert!(client.current_game_code().await.is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn short_game_code_never_reaches_the_network() {
    let (mut client, mut events, sent, _closed) =
        start_client(vec![], SessionStore::in_memory());

    drain_connected(&mut events).await;
    for code in ["", "1", "12345"] {
        let err = client.join(code).expect_err("short code must be rejected");
        assert!(matches!(err, QuizWireError::GameCodeTooShort));
    }

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(sent.lock().expect("sent mutex").is_empty());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Round lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_round_with_answer_and_verdict() {
    let (mut client, mut events, sent, _closed) = start_client(
        vec![
            Some(Ok(game_joined_json("tok-1", "player-1"))),
            Some(Ok(question_started_json(30))),
        ],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    client.join("123456").expect("join");

    let ev = next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::QuestionStarted { .. })
    })
    .await;
    if let QuizWireEvent::QuestionStarted { question } = ev {
        assert_eq!(question.options.len(), 4);
        assert_eq!(question.time_limit_seconds, 30);
        // The answer key is never revealed while the round is open.
        assert!(question.correct_answer_index.is_none());
    }

    client.submit_answer(1).expect("submit");
    let ev = next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::AnswerSubmitted { .. })
    })
    .await;
    assert_eq!(ev, QuizWireEvent::AnswerSubmitted { answer_index: 1 });

    let submits: Vec<_> = parsed_sent(&sent)
        .into_iter()
        .filter(|m| matches!(m, ClientMessage::SubmitAnswer { .. }))
        .collect();
    assert_eq!(submits.len(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn repeat_submissions_are_absorbed() {
    let (mut client, mut events, sent, _closed) = start_client(
        vec![Some(Ok(question_started_json(30)))],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::QuestionStarted { .. })
    })
    .await;

    client.submit_answer(2).expect("first submit");
    client.submit_answer(0).expect("repeat submit");
    client.submit_answer(2).expect("repeat submit");
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let submits: Vec<_> = parsed_sent(&sent)
        .into_iter()
        .filter_map(|m| match m {
            ClientMessage::SubmitAnswer { answer_index, .. } => Some(answer_index),
            _ => None,
        })
        .collect();
    assert_eq!(submits, vec![2], "only the first submission may be sent");

    client.shutdown().await;
}

#[tokio::test]
async fn submit_without_active_question_is_a_no_op() {
    let (mut client, mut events, sent, _closed) =
        start_client(vec![], SessionStore::in_memory());

    drain_connected(&mut events).await;
    client.submit_answer(0).expect("submit");
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(sent.lock().expect("sent mutex").is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn round_end_reveals_answer_and_rank() {
    let (mut client, mut events, _sent, _closed) = start_client(
        vec![
            Some(Ok(game_joined_json("tok-1", "player-1"))),
            Some(Ok(question_started_json(30))),
            Some(Ok(answer_result_json(true, 1200))),
            Some(Ok(question_ended_json(
                1,
                vec![("player-2", "Bea", 950), ("player-1", "Ana", 800)],
                GameStatus::Results,
            ))),
        ],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    client.join("123456").expect("join");

    let ev = next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::AnswerResult { .. })
    })
    .await;
    assert_eq!(
        ev,
        QuizWireEvent::AnswerResult {
            correct: true,
            response_time_ms: 1200,
        }
    );

    let ev = next_matching(&mut events, |e| matches!(e, QuizWireEvent::RoundEnded { .. })).await;
    if let QuizWireEvent::RoundEnded {
        correct_answer_index,
        rank,
        leaderboard,
        game_status,
    } = ev
    {
        assert_eq!(correct_answer_index, 1);
        assert_eq!(rank, Some(2));
        assert_eq!(leaderboard.len(), 2);
        assert_eq!(game_status, GameStatus::Results);
    }

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn countdown_expiry_does_not_close_the_round() {
    let (mut client, mut events, sent, _closed) = start_client(
        vec![Some(Ok(question_started_json(2)))],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;

    // Ride the countdown all the way down.
    loop {
        let ev = events.recv().await.expect("event");
        if ev == (QuizWireEvent::CountdownTick {
            remaining_seconds: 0,
        }) {
            break;
        }
    }

    // The round is still open at zero: a submission goes through. Only the
    // server's round-ended signal closes a round.
    client.submit_answer(0).expect("submit");
    let ev = next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::AnswerSubmitted { .. })
    })
    .await;
    assert_eq!(ev, QuizWireEvent::AnswerSubmitted { answer_index: 0 });
    assert!(parsed_sent(&sent)
        .iter()
        .any(|m| matches!(m, ClientMessage::SubmitAnswer { .. })));

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn results_auto_return_then_next_round() {
    let (mut client, mut events, _sent, _closed) = start_client(
        vec![
            Some(Ok(question_started_json(5))),
            Some(Ok(question_ended_json(0, vec![], GameStatus::Results))),
        ],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    next_matching(&mut events, |e| matches!(e, QuizWireEvent::RoundEnded { .. })).await;

    // After the fixed display interval the client returns to waiting.
    let ev = next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::WaitingForNextQuestion)
    })
    .await;
    assert_eq!(ev, QuizWireEvent::WaitingForNextQuestion);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn finished_game_stays_on_results() {
    let (mut client, mut events, _sent, _closed) = start_client(
        vec![
            Some(Ok(question_started_json(5))),
            Some(Ok(question_ended_json(0, vec![], GameStatus::Finished))),
        ],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    next_matching(&mut events, |e| matches!(e, QuizWireEvent::GameOver)).await;

    // Long past the display interval: no return to waiting.
    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    client.shutdown().await;
    while let Some(ev) = events.recv().await {
        assert!(
            !matches!(ev, QuizWireEvent::WaitingForNextQuestion),
            "final results must be permanent"
        );
    }
}

#[tokio::test]
async fn question_ended_without_active_round_is_absorbed() {
    // Host-side desync: the round-ended signal arrives before we ever saw
    // the round start. The client shows the leaderboard rather than failing.
    let (mut client, mut events, _sent, _closed) = start_client(
        vec![Some(Ok(question_ended_json(
            2,
            vec![("player-9", "Zed", 100)],
            GameStatus::Results,
        )))],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    let ev = next_matching(&mut events, |e| matches!(e, QuizWireEvent::RoundEnded { .. })).await;
    if let QuizWireEvent::RoundEnded {
        correct_answer_index,
        rank,
        ..
    } = ev
    {
        assert_eq!(correct_answer_index, 2);
        assert_eq!(rank, None);
    }

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Session persistence and reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reload_round_trip_reconnects_with_saved_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");

    // First run: join a game and receive an identity.
    {
        let session = SessionStore::open(&path);
        let (mut client, mut events, _sent, _closed) = start_client(
            vec![Some(Ok(game_joined_json("tok-persist", "player-7")))],
            session,
        );
        drain_connected(&mut events).await;
        client.join("777777").expect("join");
        next_matching(&mut events, |e| matches!(e, QuizWireEvent::Joined { .. })).await;
        client.shutdown().await;
    }

    // Second run (simulated reload): the saved token drives an automatic
    // reconnect emission before any user input.
    let session = SessionStore::open(&path);
    assert!(session.has_saved_session());
    let (mut client, mut events, sent, _closed) = start_client(
        vec![Some(Ok(player_reconnected_json(
            "player-7",
            GameStatus::Lobby,
        )))],
        session,
    );

    drain_connected(&mut events).await;
    let ev = next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::Reconnected { .. })
    })
    .await;
    if let QuizWireEvent::Reconnected {
        player_id,
        game_status,
    } = ev
    {
        assert_eq!(player_id, "player-7");
        assert_eq!(game_status, GameStatus::Lobby);
    }

    let ev = events.recv().await.expect("event");
    assert_eq!(ev, QuizWireEvent::Navigate(Screen::Game));
    assert!(client.is_in_game());

    let messages = parsed_sent(&sent);
    assert_eq!(
        messages,
        vec![ClientMessage::ReconnectPlayer {
            game_code: "777777".into(),
            player_token: "tok-persist".into(),
        }]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn mid_question_reconnect_shows_notice() {
    let mut session = SessionStore::in_memory();
    session.set_game_code("123456").expect("set code");
    session.set_player_token("tok-1").expect("set token");

    let (mut client, mut events, _sent, _closed) = start_client(
        vec![Some(Ok(player_reconnected_json(
            "player-1",
            GameStatus::QuestionActive,
        )))],
        session,
    );

    drain_connected(&mut events).await;
    next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::Reconnected { .. })
    })
    .await;
    let ev = next_matching(&mut events, |e| matches!(e, QuizWireEvent::Notice { .. })).await;
    assert!(matches!(ev, QuizWireEvent::Notice { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn reconnect_error_wipes_persisted_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");

    {
        let mut session = SessionStore::open(&path);
        session.set_game_code("123456").expect("set code");
        session.set_player_token("tok-stale").expect("set token");
    }

    let session = SessionStore::open(&path);
    let (mut client, mut events, _sent, _closed) = start_client(
        vec![Some(Ok(reconnect_error_json("unknown session")))],
        session,
    );

    drain_connected(&mut events).await;
    let ev = next_matching(&mut events, |e| {
        matches!(e, QuizWireEvent::SessionExpired { .. })
    })
    .await;
    if let QuizWireEvent::SessionExpired { message } = ev {
        assert_eq!(message, "unknown session");
    }
    let ev = events.recv().await.expect("event");
    assert_eq!(ev, QuizWireEvent::Navigate(Screen::Join));

    client.shutdown().await;

    // The wipe reached disk: a fresh store sees no saved session.
    let reopened = SessionStore::open(&path);
    assert!(!reopened.has_saved_session());
}

#[tokio::test]
async fn no_saved_session_means_no_reconnect_emission() {
    let (mut client, mut events, sent, _closed) =
        start_client(vec![], SessionStore::in_memory());

    drain_connected(&mut events).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(sent.lock().expect("sent mutex").is_empty());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Connection channel
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pong_round_trip() {
    let (mut client, mut events, sent, _closed) = start_client(
        vec![Some(Ok(pong_json(42)))],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    client.ping().expect("ping");

    let ev = next_matching(&mut events, |e| matches!(e, QuizWireEvent::Pong { .. })).await;
    assert_eq!(ev, QuizWireEvent::Pong { timestamp: 42 });

    assert!(parsed_sent(&sent)
        .iter()
        .any(|m| matches!(m, ClientMessage::Ping { .. })));

    client.shutdown().await;
}

#[tokio::test]
async fn server_close_emits_disconnected() {
    let (mut client, mut events, _sent, _closed) =
        start_client(vec![None], SessionStore::in_memory());

    drain_connected(&mut events).await;
    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, QuizWireEvent::Disconnected { reason: None }));
    assert!(!client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_transport_and_rejects_further_calls() {
    let (mut client, mut events, _sent, closed) =
        start_client(vec![], SessionStore::in_memory());

    drain_connected(&mut events).await;
    client.shutdown().await;

    assert!(closed.load(std::sync::atomic::Ordering::Relaxed));
    assert!(matches!(client.ping(), Err(QuizWireError::NotConnected)));
    assert!(matches!(
        client.join("123456"),
        Err(QuizWireError::NotConnected)
    ));
}

#[tokio::test]
async fn malformed_frames_are_skipped_not_fatal() {
    let (mut client, mut events, _sent, _closed) = start_client(
        vec![
            Some(Ok("not json at all".into())),
            Some(Ok(r#"{"type":"no_such_event","data":{}}"#.into())),
            Some(Ok(pong_json(7))),
        ],
        SessionStore::in_memory(),
    );

    drain_connected(&mut events).await;
    let ev = next_matching(&mut events, |e| matches!(e, QuizWireEvent::Pong { .. })).await;
    assert_eq!(ev, QuizWireEvent::Pong { timestamp: 7 });

    client.shutdown().await;
}
