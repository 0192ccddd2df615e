//! # Play Session Example
//!
//! Demonstrates a complete QuizWire player lifecycle:
//!
//! 1. Connect to a game server via WebSocket
//! 2. Reconnect with a saved session, or join a game fresh
//! 3. React to round events (question, countdown, leaderboard)
//! 4. Answer every question (always picks the first option)
//! 5. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a QuizWire server on localhost:4800, then:
//! QUIZWIRE_GAME_CODE=123456 cargo run --example play_session
//!
//! # Override the server URL:
//! QUIZWIRE_URL=ws://my-server:4800/play cargo run --example play_session
//! ```

use quizwire_client::{
    OpenDirectory, QuizWireClient, QuizWireConfig, QuizWireEvent, Screen, SessionStore,
    WebSocketTransport,
};

/// Default server URL when `QUIZWIRE_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:4800/play";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("QUIZWIRE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let game_code = std::env::var("QUIZWIRE_GAME_CODE").unwrap_or_else(|_| "123456".to_string());
    tracing::info!("Connecting to {url}");

    // File-backed session store so a restart resumes the same player.
    let session = match SessionStore::default_path() {
        Some(path) => SessionStore::open(path),
        None => SessionStore::in_memory(),
    };
    let had_saved_session = session.has_saved_session();

    // ── Connect ─────────────────────────────────────────────────────
    let transport = WebSocketTransport::connect(&url).await?;

    // Start the client. This spawns a background task that drives the
    // transport and emits events on `event_rx`. A saved session triggers
    // an automatic reconnect before any event arrives.
    let (mut client, mut event_rx) =
        QuizWireClient::start(transport, session, OpenDirectory, QuizWireConfig::new());

    // ── Event loop ──────────────────────────────────────────────────
    // Use `tokio::select!` to listen for both game events and Ctrl+C.
    loop {
        tokio::select! {
            // Branch 1: Incoming event from the server (or transport layer).
            event = event_rx.recv() => {
                let Some(event) = event else {
                    // Channel closed — transport loop exited.
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    // ── Synthetic: transport connected ───────────────
                    QuizWireEvent::Connected => {
                        if had_saved_session {
                            tracing::info!("Connected, resuming saved session…");
                        } else {
                            tracing::info!("Connected, joining game {game_code}");
                            client.join(game_code.clone())?;
                        }
                    }

                    // ── Session lifecycle ────────────────────────────
                    QuizWireEvent::Joined { game_code, player_id } => {
                        tracing::info!("Joined game {game_code} as {player_id}");
                    }
                    QuizWireEvent::Reconnected { player_id, game_status } => {
                        tracing::info!("Reconnected as {player_id} ({game_status:?})");
                    }
                    QuizWireEvent::JoinFailed { message } => {
                        tracing::error!("Join failed: {message}");
                        break;
                    }
                    QuizWireEvent::SessionExpired { message } => {
                        tracing::warn!("Session expired ({message}), joining fresh");
                        client.join(game_code.clone())?;
                    }
                    QuizWireEvent::Navigate(Screen::Join) => {
                        tracing::info!("Back on the join screen");
                    }
                    QuizWireEvent::Navigate(Screen::Game) => {}

                    // ── Round lifecycle ──────────────────────────────
                    QuizWireEvent::QuestionStarted { question } => {
                        tracing::info!("Q: {}", question.text);
                        for (i, option) in question.options.iter().enumerate() {
                            tracing::info!("  [{i}] {option}");
                        }
                        // This bot is not a strong player.
                        client.submit_answer(0)?;
                    }
                    QuizWireEvent::CountdownTick { remaining_seconds } => {
                        tracing::debug!("{remaining_seconds}s remaining");
                    }
                    QuizWireEvent::AnswerSubmitted { answer_index } => {
                        tracing::info!("Locked in option {answer_index}");
                    }
                    QuizWireEvent::AnswerResult { correct, response_time_ms } => {
                        tracing::info!("Answer was {} ({response_time_ms}ms)",
                            if correct { "correct" } else { "wrong" });
                    }
                    QuizWireEvent::RoundEnded { correct_answer_index, rank, leaderboard, .. } => {
                        tracing::info!("Correct answer was [{correct_answer_index}]");
                        if let Some(rank) = rank {
                            tracing::info!("Current rank: #{rank}");
                        }
                        for entry in &leaderboard {
                            tracing::info!("  {} — {}", entry.name, entry.score);
                        }
                    }
                    QuizWireEvent::WaitingForNextQuestion => {
                        tracing::info!("Waiting for the next question…");
                    }
                    QuizWireEvent::GameOver => {
                        tracing::info!("Game over!");
                        break;
                    }
                    QuizWireEvent::Notice { message } => {
                        tracing::info!("{message}");
                    }

                    // ── Transport ────────────────────────────────────
                    QuizWireEvent::Disconnected { reason } => {
                        tracing::info!("Disconnected: {reason:?}");
                        break;
                    }

                    other => {
                        tracing::debug!("Unhandled event: {other:?}");
                    }
                }
            }

            // Branch 2: Ctrl+C for graceful shutdown.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    tracing::info!("Goodbye");
    Ok(())
}
