#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the QuizWire client.
//!
//! Verifies the wire shape of every `ClientMessage` and `ServerMessage`
//! variant against JSON fixtures matching real server output, plus the
//! strictness of payload validation at the serde boundary.

use quizwire_client::protocol::{
    ClientMessage, GameStatus, LeaderboardEntry, Question, QuestionEndedPayload,
    QuestionStartedPayload, ServerMessage, MIN_GAME_CODE_LEN, OPTION_COUNT,
};

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

/// Serialize `val` to JSON, then deserialize back to `T` and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

fn four_options() -> [String; OPTION_COUNT] {
    [
        "Mars".into(),
        "Jupiter".into(),
        "Venus".into(),
        "Saturn".into(),
    ]
}

// ════════════════════════════════════════════════════════════════════
// ClientMessage wire shape (5 variants)
// ════════════════════════════════════════════════════════════════════

#[test]
fn client_message_join_game_wire_shape() {
    let msg = ClientMessage::JoinGame {
        game_code: "123456".into(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert_eq!(json, r#"{"type":"join_game","data":{"game_code":"123456"}}"#);
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn client_message_reconnect_player_wire_shape() {
    let msg = ClientMessage::ReconnectPlayer {
        game_code: "123456".into(),
        player_token: "tok-1".into(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert_eq!(
        json,
        r#"{"type":"reconnect_player","data":{"game_code":"123456","player_token":"tok-1"}}"#
    );
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn client_message_submit_answer_wire_shape() {
    let msg = ClientMessage::SubmitAnswer {
        answer_index: 2,
        timestamp: 1_700_000_000_000,
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.starts_with(r#"{"type":"submit_answer","#), "{json}");
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn client_message_leave_game_wire_shape() {
    let msg = ClientMessage::LeaveGame;
    let json = serde_json::to_string(&msg).expect("serialize");
    assert_eq!(json, r#"{"type":"leave_game"}"#);
}

#[test]
fn client_message_ping_round_trip() {
    let msg = ClientMessage::Ping { timestamp: 42 };
    assert_eq!(round_trip(&msg), msg);
}

// ════════════════════════════════════════════════════════════════════
// ServerMessage fixtures (as the server actually sends them)
// ════════════════════════════════════════════════════════════════════

#[test]
fn server_message_game_joined_fixture() {
    let json = r#"{"type":"game_joined","data":{"player_token":"tok-1","player_id":"p-9"}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
    assert_eq!(
        msg,
        ServerMessage::GameJoined {
            player_token: "tok-1".into(),
            player_id: "p-9".into(),
        }
    );
}

#[test]
fn server_message_join_error_fixture() {
    let json = r#"{"type":"join_error","data":{"message":"game not found"}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
    assert!(matches!(msg, ServerMessage::JoinError { message } if message == "game not found"));
}

#[test]
fn server_message_player_reconnected_fixture() {
    let json = r#"{"type":"player_reconnected","data":{"player_id":"p-9","game_status":"question_active"}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
    assert_eq!(
        msg,
        ServerMessage::PlayerReconnected {
            player_id: "p-9".into(),
            game_status: GameStatus::QuestionActive,
        }
    );
}

#[test]
fn server_message_reconnect_error_fixture() {
    let json = r#"{"type":"reconnect_error","data":{"message":"unknown session"}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
    assert!(matches!(msg, ServerMessage::ReconnectError { .. }));
}

#[test]
fn server_message_question_started_fixture() {
    let json = r#"{
        "type": "question_started",
        "data": {
            "question": "Which planet is largest?",
            "options": ["Mars", "Jupiter", "Venus", "Saturn"],
            "time_limit_seconds": 30
        }
    }"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
    let ServerMessage::QuestionStarted(payload) = msg else {
        panic!("expected QuestionStarted");
    };
    assert_eq!(payload.question, "Which planet is largest?");
    assert_eq!(payload.options, four_options());
    assert_eq!(payload.time_limit_seconds, 30);

    let question = payload.into_question();
    assert!(question.correct_answer_index.is_none());
}

#[test]
fn server_message_question_ended_fixture() {
    let json = r#"{
        "type": "question_ended",
        "data": {
            "correct_answer_index": 1,
            "leaderboard": [
                {"player_id": "p-1", "name": "Ana", "score": 800},
                {"player_id": "p-2", "name": "Bea", "score": 650}
            ],
            "game_status": "results"
        }
    }"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
    let ServerMessage::QuestionEnded(payload) = msg else {
        panic!("expected QuestionEnded");
    };
    assert_eq!(payload.correct_answer_index, 1);
    assert_eq!(payload.leaderboard.len(), 2);
    assert_eq!(payload.leaderboard[0].score, 800);
    assert_eq!(payload.game_status, GameStatus::Results);
}

#[test]
fn server_message_answer_result_fixture() {
    let json = r#"{"type":"answer_result","data":{"correct":true,"response_time_ms":1200}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
    assert_eq!(
        msg,
        ServerMessage::AnswerResult {
            correct: true,
            response_time_ms: 1200,
        }
    );
}

#[test]
fn server_message_pong_fixture() {
    let json = r#"{"type":"pong","data":{"timestamp":42}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("deserialize");
    assert_eq!(msg, ServerMessage::Pong { timestamp: 42 });
}

// ════════════════════════════════════════════════════════════════════
// Payload strictness
// ════════════════════════════════════════════════════════════════════

#[test]
fn question_started_rejects_wrong_option_count() {
    for options in [
        r#"["A", "B", "C"]"#,
        r#"["A", "B", "C", "D", "E"]"#,
        r#"[]"#,
    ] {
        let json = format!(
            r#"{{"type":"question_started","data":{{"question":"Q?","options":{options},"time_limit_seconds":10}}}}"#
        );
        assert!(
            serde_json::from_str::<ServerMessage>(&json).is_err(),
            "options {options} must be rejected"
        );
    }
}

#[test]
fn unknown_event_type_is_rejected() {
    let json = r#"{"type":"host_only_event","data":{}}"#;
    assert!(serde_json::from_str::<ServerMessage>(json).is_err());
}

#[test]
fn game_status_encodes_snake_case() {
    for (status, expected) in [
        (GameStatus::Lobby, r#""lobby""#),
        (GameStatus::QuestionActive, r#""question_active""#),
        (GameStatus::Results, r#""results""#),
        (GameStatus::Finished, r#""finished""#),
    ] {
        assert_eq!(serde_json::to_string(&status).expect("serialize"), expected);
    }
}

#[test]
fn only_finished_status_is_terminal() {
    assert!(GameStatus::Finished.is_terminal());
    for status in [GameStatus::Lobby, GameStatus::QuestionActive, GameStatus::Results] {
        assert!(!status.is_terminal());
    }
}

// ════════════════════════════════════════════════════════════════════
// Supporting types
// ════════════════════════════════════════════════════════════════════

#[test]
fn question_round_trip_with_revealed_answer() {
    let question = Question {
        text: "Which planet is largest?".into(),
        options: four_options(),
        time_limit_seconds: 30,
        correct_answer_index: Some(1),
    };
    assert_eq!(round_trip(&question), question);
}

#[test]
fn leaderboard_entry_supports_negative_scores() {
    let entry = LeaderboardEntry {
        player_id: "p-1".into(),
        name: "Ana".into(),
        score: -50,
    };
    assert_eq!(round_trip(&entry), entry);
}

#[test]
fn payload_structs_round_trip() {
    let started = QuestionStartedPayload {
        question: "Q?".into(),
        options: four_options(),
        time_limit_seconds: 20,
    };
    assert_eq!(round_trip(&started), started);

    let ended = QuestionEndedPayload {
        correct_answer_index: 0,
        leaderboard: vec![],
        game_status: GameStatus::Results,
    };
    assert_eq!(round_trip(&ended), ended);
}

#[test]
fn protocol_constants() {
    assert_eq!(OPTION_COUNT, 4);
    assert_eq!(MIN_GAME_CODE_LEN, 6);
}
