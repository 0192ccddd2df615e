//! # QuizWire Client
//!
//! Transport-agnostic Rust client for the QuizWire live quiz protocol, the
//! player side of a host-driven quiz game.
//!
//! This crate provides a high-level async client that talks to a QuizWire
//! game server using JSON text messages over any bidirectional transport.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any backend
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   [`WebSocketTransport`](transports::websocket::WebSocketTransport)
//! - **Event-driven** — receive typed [`QuizWireEvent`]s via a channel
//! - **Session resumption** — a persisted token transparently rejoins the
//!   game after a reload or brief disconnect
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quizwire_client::{
//!     OpenDirectory, QuizWireClient, QuizWireConfig, QuizWireEvent, SessionStore,
//!     WebSocketTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = WebSocketTransport::connect("ws://localhost:4800/play").await?;
//!     let session = SessionStore::in_memory();
//!     let (client, mut events) =
//!         QuizWireClient::start(transport, session, OpenDirectory, QuizWireConfig::new());
//!
//!     client.join("123456")?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             QuizWireEvent::QuestionStarted { question } => {
//!                 println!("{}", question.text);
//!                 client.submit_answer(0)?;
//!             }
//!             QuizWireEvent::Disconnected { .. } => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod directory;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{QuizWireClient, QuizWireConfig};
pub use directory::{GameDirectory, GameSummary, OpenDirectory};
pub use error::QuizWireError;
pub use event::{GameRegion, QuizWireEvent, Screen};
pub use lifecycle::{Phase, RESULTS_DISPLAY_SECONDS};
pub use protocol::{ClientMessage, GameStatus, Question, ServerMessage};
pub use session::{Session, SessionStore};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::websocket::WebSocketTransport;
