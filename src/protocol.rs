//! Wire types for the QuizWire live quiz protocol.
//!
//! Every message is a JSON object of the form `{"type": "<event>", "data": {...}}`
//! with snake_case event names, matching the host server's wire format exactly.
//! Inbound payloads deserialize into explicit tagged variants so a shape
//! mismatch fails at this boundary instead of propagating as missing fields.

use serde::{Deserialize, Serialize};

/// Number of answer options in every question. The wire format always
/// carries exactly four; anything else is rejected during deserialization.
pub const OPTION_COUNT: usize = 4;

/// Minimum length of a game code a player may attempt to join.
pub const MIN_GAME_CODE_LEN: usize = 6;

// ── Enums ───────────────────────────────────────────────────────────

/// Server-reported status of a game instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Game exists but no round has started yet.
    #[default]
    Lobby,
    /// A question is currently open for answers.
    QuestionActive,
    /// Between rounds, leaderboard showing.
    Results,
    /// Game is over. Terminal: no further rounds will start.
    Finished,
}

impl GameStatus {
    /// Returns `true` if no further rounds can start in this game.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A broadcast question as received in `question_started`.
///
/// Immutable once received; the next `question_started` replaces it wholesale.
/// `correct_answer_index` is unknown until the round's `question_ended`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    /// The question text shown to the player.
    pub text: String,
    /// Exactly four answer options, in display order.
    pub options: [String; OPTION_COUNT],
    /// Server-announced answer window in seconds.
    pub time_limit_seconds: u32,
    /// Index of the correct option, revealed by `question_ended`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer_index: Option<usize>,
}

/// One row of the per-round leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    /// Per-game-instance player identifier.
    pub player_id: String,
    /// Display name chosen at join time.
    pub name: String,
    /// Cumulative score after this round.
    pub score: i64,
}

/// Payload for the `question_started` server message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionStartedPayload {
    /// The question text.
    pub question: String,
    /// Exactly four answer options, in display order.
    pub options: [String; OPTION_COUNT],
    /// Answer window in seconds.
    pub time_limit_seconds: u32,
}

impl QuestionStartedPayload {
    /// Build the client-side [`Question`] this payload describes.
    pub fn into_question(self) -> Question {
        Question {
            text: self.question,
            options: self.options,
            time_limit_seconds: self.time_limit_seconds,
            correct_answer_index: None,
        }
    }
}

/// Payload for the `question_ended` server message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionEndedPayload {
    /// Index of the correct option for the round that just closed.
    pub correct_answer_index: usize,
    /// Leaderboard rows in rank order (best first).
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Game status after this round.
    pub game_status: GameStatus,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from the player client to the host server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a game fresh by its numeric code.
    JoinGame { game_code: String },
    /// Resume a prior session using the persisted token.
    ReconnectPlayer {
        game_code: String,
        player_token: String,
    },
    /// Submit the answer for the current question. At most one per round.
    SubmitAnswer { answer_index: usize, timestamp: u64 },
    /// Leave the game and discard the session (logout-equivalent).
    LeaveGame,
    /// Latency probe. The server echoes the timestamp back in `pong`.
    Ping { timestamp: u64 },
}

/// Message types sent from the host server to the player client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Fresh join succeeded. The token is issued once and persisted
    /// indefinitely; the player id is per game instance.
    GameJoined {
        player_token: String,
        player_id: String,
    },
    /// Fresh join rejected.
    JoinError { message: String },
    /// Reconnection succeeded with the persisted token.
    PlayerReconnected {
        player_id: String,
        game_status: GameStatus,
    },
    /// Reconnection rejected. The token is permanently invalid.
    ReconnectError { message: String },
    /// A new round opened.
    QuestionStarted(QuestionStartedPayload),
    /// The current round closed.
    QuestionEnded(QuestionEndedPayload),
    /// Informational verdict for the answer this player submitted.
    AnswerResult { correct: bool, response_time_ms: u64 },
    /// Latency probe echo.
    Pong { timestamp: u64 },
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn client_message_uses_snake_case_tags() {
        let json = serde_json::to_string(&ClientMessage::JoinGame {
            game_code: "123456".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"join_game""#), "got {json}");
        assert!(json.contains(r#""game_code":"123456""#), "got {json}");
    }

    #[test]
    fn question_started_rejects_wrong_option_count() {
        let json = r#"{
            "type": "question_started",
            "data": {
                "question": "Largest planet?",
                "options": ["Mars", "Jupiter", "Venus"],
                "time_limit_seconds": 20
            }
        }"#;
        assert!(serde_json::from_str::<ServerMessage>(json).is_err());
    }

    #[test]
    fn question_ended_fixture_parses() {
        let json = r#"{
            "type": "question_ended",
            "data": {
                "correct_answer_index": 1,
                "leaderboard": [
                    {"player_id": "P1", "name": "Alice", "score": 900}
                ],
                "game_status": "results"
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        if let ServerMessage::QuestionEnded(payload) = msg {
            assert_eq!(payload.correct_answer_index, 1);
            assert_eq!(payload.leaderboard[0].player_id, "P1");
            assert!(!payload.game_status.is_terminal());
        } else {
            panic!("expected QuestionEnded");
        }
    }

    #[test]
    fn finished_is_the_only_terminal_status() {
        assert!(GameStatus::Finished.is_terminal());
        assert!(!GameStatus::Lobby.is_terminal());
        assert!(!GameStatus::QuestionActive.is_terminal());
        assert!(!GameStatus::Results.is_terminal());
    }
}
