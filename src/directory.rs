//! Pre-join game lookup.
//!
//! Before a fresh `join_game` emission the client confirms the entered code
//! maps to an existing, non-finished game via a synchronous lookup. The
//! lookup lives behind a trait so embedders can back it with an HTTP call,
//! a local cache, or a test double; the client only needs the status.

use crate::error::{QuizWireError, Result};
use crate::protocol::GameStatus;

/// Minimal description of a game found by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSummary {
    /// Current status of the game.
    pub status: GameStatus,
}

/// Synchronous game-existence lookup by code. Used only pre-join.
pub trait GameDirectory: Send + Sync + 'static {
    /// Look up a game by its code.
    ///
    /// # Errors
    ///
    /// Returns [`QuizWireError::GameNotFound`] when no game exists for the
    /// code, or any transport-level error the backing implementation hits.
    fn find_game(&self, game_code: &str) -> Result<GameSummary>;
}

/// Directory that accepts every code as an open lobby. Used when the
/// deployment has no lookup endpoint and the server's `join_error` is the
/// only existence check.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDirectory;

impl GameDirectory for OpenDirectory {
    fn find_game(&self, _game_code: &str) -> Result<GameSummary> {
        Ok(GameSummary {
            status: GameStatus::Lobby,
        })
    }
}

/// Check that a looked-up game can still be joined.
pub(crate) fn ensure_joinable(code: &str, summary: GameSummary) -> Result<()> {
    if summary.status.is_terminal() {
        return Err(QuizWireError::GameFinished { code: code.into() });
    }
    Ok(())
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
    fn open_directory_accepts_everything() {
        let summary = OpenDirectory.find_game("123456").unwrap();
        assert_eq!(summary.status, GameStatus::Lobby);
        assert!(ensure_joinable("123456", summary).is_ok());
    }

    #[test]
    fn finished_games_are_not_joinable() {
        let summary = GameSummary {
            status: GameStatus::Finished,
        };
        assert!(matches!(
            ensure_joinable("123456", summary),
            Err(QuizWireError::GameFinished { code }) if code == "123456"
        ));
    }

    #[test]
    fn active_games_are_joinable() {
        for status in [GameStatus::Lobby, GameStatus::QuestionActive, GameStatus::Results] {
            assert!(ensure_joinable("123456", GameSummary { status }).is_ok());
        }
    }
}
