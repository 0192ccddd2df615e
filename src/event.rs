//! Typed events emitted by the client toward the embedding application.
//!
//! The event channel is the notification/routing seam: the client never
//! touches a rendering surface itself. It emits intent-level events
//! ("navigate to the game screen", "show the leaderboard region", "notice:
//! you missed the question start") and the embedding UI owns presentation.

use crate::protocol::{GameStatus, LeaderboardEntry, Question};

/// Top-level screen the embedding application should display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// The join form where the player enters a game code.
    Join,
    /// The in-game view (question or leaderboard region).
    Game,
}

/// Which region of the in-game view should be visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameRegion {
    /// The question area (also shows the waiting state between rounds).
    Question,
    /// The per-round leaderboard area.
    Leaderboard,
}

/// Events emitted by [`QuizWireClient`](crate::QuizWireClient) on its event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizWireEvent {
    /// Transport established. Synthetic, always the first event.
    Connected,
    /// Transport lost or shut down. Always the last event before the
    /// channel closes.
    Disconnected {
        /// Human-readable reason, if one is known.
        reason: Option<String>,
    },
    /// Fresh join succeeded; the session is persisted.
    Joined {
        game_code: String,
        player_id: String,
    },
    /// Fresh join rejected; the entered code was cleared and the join
    /// control should be re-enabled.
    JoinFailed { message: String },
    /// Reconnection with the persisted token succeeded.
    Reconnected {
        player_id: String,
        game_status: GameStatus,
    },
    /// The persisted token was rejected. Session wiped; back to the join
    /// screen with the server's message.
    SessionExpired { message: String },
    /// Switch to the given screen.
    Navigate(Screen),
    /// Show the given region of the in-game view.
    ShowRegion(GameRegion),
    /// Informational notice for the player (e.g. reconnected mid-question).
    Notice { message: String },
    /// A new round opened; answer input is enabled.
    QuestionStarted { question: Question },
    /// Local countdown moved. Display only; never drives a phase change.
    CountdownTick { remaining_seconds: u32 },
    /// The player's answer was accepted locally and sent to the server.
    AnswerSubmitted { answer_index: usize },
    /// The round closed. `rank` is the player's 1-based leaderboard
    /// position, or `None` when the player does not appear in it.
    RoundEnded {
        correct_answer_index: usize,
        rank: Option<usize>,
        leaderboard: Vec<LeaderboardEntry>,
        game_status: GameStatus,
    },
    /// Server verdict for this player's submission. Informational.
    AnswerResult { correct: bool, response_time_ms: u64 },
    /// The results display interval elapsed; back to waiting for the next
    /// round.
    WaitingForNextQuestion,
    /// The game reached its terminal status; the final leaderboard stays up.
    GameOver,
    /// Latency probe echo with the timestamp originally sent.
    Pong { timestamp: u64 },
}
