#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for QuizWire client integration tests.
//!
//! Provides a channel-based [`MockTransport`] and helper functions for
//! constructing common server response JSON strings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use quizwire_client::protocol::{
    GameStatus, LeaderboardEntry, QuestionEndedPayload, QuestionStartedPayload, ServerMessage,
};
use quizwire_client::{QuizWireError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-based mock transport for integration testing.
///
/// Scripted server responses are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    /// Scripted server responses (consumed in order by `recv`).
    incoming: VecDeque<Option<Result<String, QuizWireError>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport with the given scripted incoming messages.
    ///
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, QuizWireError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), QuizWireError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, QuizWireError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted messages — hang forever so the transport loop
            // stays alive until shutdown is called.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), QuizWireError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Returns the JSON string for a `GameJoined` server message.
pub fn game_joined_json(player_token: &str, player_id: &str) -> String {
    serde_json::to_string(&ServerMessage::GameJoined {
        player_token: player_token.into(),
        player_id: player_id.into(),
    })
    .expect("game_joined_json serialization")
}

/// Returns the JSON string for a `JoinError` server message.
pub fn join_error_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::JoinError {
        message: message.into(),
    })
    .expect("join_error_json serialization")
}

/// Returns the JSON string for a `PlayerReconnected` server message.
pub fn player_reconnected_json(player_id: &str, game_status: GameStatus) -> String {
    serde_json::to_string(&ServerMessage::PlayerReconnected {
        player_id: player_id.into(),
        game_status,
    })
    .expect("player_reconnected_json serialization")
}

/// Returns the JSON string for a `ReconnectError` server message.
pub fn reconnect_error_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::ReconnectError {
        message: message.into(),
    })
    .expect("reconnect_error_json serialization")
}

/// Returns the JSON string for a `QuestionStarted` server message with a
/// canonical four-option question.
pub fn question_started_json(time_limit_seconds: u32) -> String {
    serde_json::to_string(&ServerMessage::QuestionStarted(QuestionStartedPayload {
        question: "Which planet is largest?".into(),
        options: [
            "Mars".into(),
            "Jupiter".into(),
            "Venus".into(),
            "Saturn".into(),
        ],
        time_limit_seconds,
    }))
    .expect("question_started_json serialization")
}

/// Returns the JSON string for a `QuestionEnded` server message with the
/// given leaderboard rows.
pub fn question_ended_json(
    correct_answer_index: usize,
    leaderboard: Vec<(&str, &str, i64)>,
    game_status: GameStatus,
) -> String {
    serde_json::to_string(&ServerMessage::QuestionEnded(QuestionEndedPayload {
        correct_answer_index,
        leaderboard: leaderboard
            .into_iter()
            .map(|(player_id, name, score)| LeaderboardEntry {
                player_id: player_id.into(),
                name: name.into(),
                score,
            })
            .collect(),
        game_status,
    }))
    .expect("question_ended_json serialization")
}

/// Returns the JSON string for an `AnswerResult` server message.
pub fn answer_result_json(correct: bool, response_time_ms: u64) -> String {
    serde_json::to_string(&ServerMessage::AnswerResult {
        correct,
        response_time_ms,
    })
    .expect("answer_result_json serialization")
}

/// Returns the JSON string for a `Pong` server message.
pub fn pong_json(timestamp: u64) -> String {
    serde_json::to_string(&ServerMessage::Pong { timestamp })
        .expect("pong_json serialization")
}
