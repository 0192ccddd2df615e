//! Error types for the QuizWire client.

use thiserror::Error;

use crate::protocol::MIN_GAME_CODE_LEN;

/// Errors that can occur when using the QuizWire client.
#[derive(Debug, Error)]
pub enum QuizWireError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The entered game code is too short to be valid.
    #[error("game code must be at least {MIN_GAME_CODE_LEN} characters")]
    GameCodeTooShort,

    /// The pre-join lookup found no game for the entered code.
    #[error("no game found for code {code}")]
    GameNotFound {
        /// The code the player entered.
        code: String,
    },

    /// The pre-join lookup found the game, but it has already finished.
    #[error("game {code} has already finished")]
    GameFinished {
        /// The code the player entered.
        code: String,
    },

    /// The server rejected an operation with a message.
    #[error("server error: {message}")]
    ServerError {
        /// Human-readable error message from the server.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred (transport setup or session persistence).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for QuizWire client operations.
pub type Result<T> = std::result::Result<T, QuizWireError>;
