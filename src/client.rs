//! Async client for the QuizWire live quiz protocol.
//!
//! [`QuizWireClient`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<QuizWireEvent>`]) returned
//! from [`QuizWireClient::start`].
//!
//! The transport loop owns the three stateful pieces of the client: the
//! [`LifecycleMachine`] (current question, answer gating, countdown), the
//! [`ReconnectFlow`] (session resumption), and the [`SessionStore`]
//! (persisted identity). All transitions run to completion on a single task,
//! so no transition can interleave with another.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect(url).await?;
//! let session = SessionStore::open(SessionStore::default_path().unwrap());
//! let (client, mut events) =
//!     QuizWireClient::start(transport, session, OpenDirectory, QuizWireConfig::new());
//!
//! client.join("123456")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         QuizWireEvent::QuestionStarted { question } => { /* render it */ }
//!         QuizWireEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, Interval, Sleep};
use tracing::{debug, error, warn};

use crate::directory::{ensure_joinable, GameDirectory};
use crate::error::{QuizWireError, Result};
use crate::event::{QuizWireEvent, Screen};
use crate::lifecycle::{Effect, LifecycleInput, LifecycleMachine, RESULTS_DISPLAY_SECONDS};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::reconnect::{validate_game_code, ReconnectFlow};
use crate::session::SessionStore;
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`QuizWireClient`] connection.
///
/// All fields have sensible defaults; [`QuizWireConfig::new`] is enough for
/// most embedders.
///
/// # Tuning
///
/// ```
/// use quizwire_client::client::QuizWireConfig;
/// use std::time::Duration;
///
/// let config = QuizWireConfig::new()
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct QuizWireConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server messages, events
    /// are dropped (with a warning logged) to avoid blocking the transport loop.
    /// The `Disconnected` event is always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`QuizWireClient::shutdown`] is called, the background transport
    /// loop is given this much time to close the transport and emit a final
    /// `Disconnected` event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl QuizWireConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately without waiting for graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for QuizWireConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Local inputs queued from the handle to the transport loop. Unlike raw
/// wire messages, these go through the lifecycle machine and the join
/// validation so gating happens on the loop task.
#[derive(Debug)]
enum Command {
    JoinGame { game_code: String },
    SubmitAnswer { answer_index: usize },
    LeaveGame,
    Ping,
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the client handle and the transport loop.
struct ClientState {
    connected: AtomicBool,
    in_game: AtomicBool,
    game_code: Mutex<Option<String>>,
    player_id: Mutex<Option<String>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            in_game: AtomicBool::new(false),
            game_code: Mutex::new(None),
            player_id: Mutex::new(None),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the QuizWire protocol.
///
/// Created via [`QuizWireClient::start`], which spawns a background transport
/// loop and returns this handle together with an event receiver.
///
/// All public methods queue a command to the transport loop and return
/// immediately once it is queued (no round-trip await). Answer gating and
/// join validation run on the loop task, so rapid duplicate calls cannot
/// race each other.
pub struct QuizWireClient {
    /// Sender half of the command channel to the transport loop.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Shared state updated by the transport loop.
    state: Arc<ClientState>,
    /// Handle to the background transport loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the transport loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl QuizWireClient {
    /// Start the client transport loop and return a handle plus event receiver.
    ///
    /// If the supplied [`SessionStore`] holds a saved session (token and game
    /// code), the loop immediately runs the reconnection protocol: one
    /// `reconnect_player` emission per connection, resolved by the server's
    /// reply.
    ///
    /// # Arguments
    ///
    /// * `transport` — A connected [`Transport`] implementation.
    /// * `session` — The session store (in-memory or file-backed).
    /// * `directory` — Pre-join game lookup ([`OpenDirectory`](crate::directory::OpenDirectory)
    ///   when the deployment has none).
    /// * `config` — Client configuration.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`. The event receiver yields
    /// [`QuizWireEvent`]s until the transport closes or the client shuts down.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        session: SessionStore,
        directory: impl GameDirectory,
        config: QuizWireConfig,
    ) -> (Self, mpsc::Receiver<QuizWireEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<QuizWireEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let loop_state = Arc::clone(&state);

        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            loop_state,
            session,
            directory,
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Join a game fresh by its code.
    ///
    /// The code is validated locally first; a too-short code never reaches
    /// the network. The pre-join lookup and the `join_game` emission run on
    /// the loop task and resolve via `Joined`/`JoinFailed` events.
    ///
    /// # Errors
    ///
    /// Returns [`QuizWireError::GameCodeTooShort`] for an invalid code, or
    /// [`QuizWireError::NotConnected`] if the transport has closed.
    pub fn join(&self, game_code: impl Into<String>) -> Result<()> {
        let game_code = game_code.into();
        validate_game_code(&game_code)?;
        self.send(Command::JoinGame { game_code })
    }

    /// Submit the answer for the current question.
    ///
    /// At most one submission per round reaches the network: repeats and
    /// out-of-range indices are absorbed silently by the lifecycle machine,
    /// never surfaced as errors.
    ///
    /// # Errors
    ///
    /// Returns [`QuizWireError::NotConnected`] if the transport has closed.
    pub fn submit_answer(&self, answer_index: usize) -> Result<()> {
        self.send(Command::SubmitAnswer { answer_index })
    }

    /// Leave the game and wipe the persisted session (logout-equivalent).
    ///
    /// # Errors
    ///
    /// Returns [`QuizWireError::NotConnected`] if the transport has closed.
    pub fn leave(&self) -> Result<()> {
        self.send(Command::LeaveGame)
    }

    /// Send a latency probe to the server.
    ///
    /// # Errors
    ///
    /// Returns [`QuizWireError::NotConnected`] if the transport has closed.
    pub fn ping(&self) -> Result<()> {
        self.send(Command::Ping)
    }

    /// Shut down the client, closing the transport and stopping the background task.
    ///
    /// After calling this method, the event receiver will yield `None` once the
    /// transport loop exits.
    pub async fn shutdown(&mut self) {
        debug!("QuizWireClient: shutdown requested");

        // Signal the transport loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the transport loop with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` once a join or reconnect has been confirmed.
    pub fn is_in_game(&self) -> bool {
        self.state.in_game.load(Ordering::Acquire)
    }

    /// Returns the current game code, if the client is in a game.
    pub async fn current_game_code(&self) -> Option<String> {
        self.state.game_code.lock().await.clone()
    }

    /// Returns the current player id, if assigned by the server.
    pub async fn current_player_id(&self) -> Option<String> {
        self.state.player_id.lock().await.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a [`Command`] to the transport loop.
    fn send(&self, cmd: Command) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(QuizWireError::NotConnected);
        }
        self.cmd_tx
            .send(cmd)
            .map_err(|_| QuizWireError::NotConnected)
    }
}

impl std::fmt::Debug for QuizWireClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizWireClient")
            .field("connected", &self.is_connected())
            .field("in_game", &self.is_in_game())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for QuizWireClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the transport loop future to be dropped immediately.  The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending
        // it would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Current wall-clock time in epoch milliseconds. Falls back to 0 if the
/// clock reads before the epoch.
fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Log-and-continue wrapper for session persistence failures. A failed
/// write never takes the session down; the worst case is a fresh join after
/// the next reload.
fn persist_or_warn(result: Result<()>) {
    if let Err(e) = result {
        warn!("session persistence failed: {e}");
    }
}

/// Background transport loop that multiplexes send/receive, local commands,
/// and the two lifecycle timers via `tokio::select!`.
///
/// Exits when:
/// - The command channel closes (client handle dropped or shutdown called)
/// - The transport returns `None` (server closed connection)
/// - A transport error occurs
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<QuizWireEvent>,
    state: Arc<ClientState>,
    mut session: SessionStore,
    directory: impl GameDirectory,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("transport loop started");

    let mut machine = LifecycleMachine::new();
    let mut reconnect = ReconnectFlow::new();
    // Repeating 1 Hz feed for the lifecycle countdown. Replaced wholesale on
    // every round start so two feeds never race.
    let mut countdown: Option<Interval> = None;
    // Pending return from the results display to the waiting state.
    let mut results_return: Option<Pin<Box<Sleep>>> = None;

    // A reload restores the per-code player id before the server confirms
    // anything; rank lookups need it as soon as rounds arrive.
    if let Some(player_id) = session.session().player_id {
        machine.set_player_id(player_id);
    }

    // Emit the synthetic Connected event before entering the select loop.
    emit_event(&event_tx, QuizWireEvent::Connected).await;

    // Fresh connected state with a saved session: run the reconnection
    // protocol. Exactly one emission per connection; the channel's own
    // retry governs anything beyond that.
    if let Some(msg) = reconnect.on_connected(&session) {
        if let Err(e) = send_message(&mut transport, &msg).await {
            error!("transport send error: {e}");
            emit_disconnected(&event_tx, &state, Some(format!("transport send error: {e}"))).await;
            return;
        }
    }

    loop {
        tokio::select! {
            // Branch 1: local command from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        let effects = handle_command(
                            cmd,
                            &mut machine,
                            &mut reconnect,
                            &mut session,
                            &directory,
                            &state,
                        ).await;
                        if perform_effects(
                            effects,
                            &mut transport,
                            &event_tx,
                            &mut countdown,
                            &mut results_return,
                        ).await.is_err() {
                            emit_disconnected(&event_tx, &state, Some("transport send error".into())).await;
                            break;
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(server_msg) => {
                                let effects = handle_server_message(
                                    server_msg,
                                    &mut machine,
                                    &mut reconnect,
                                    &mut session,
                                    &state,
                                ).await;
                                if perform_effects(
                                    effects,
                                    &mut transport,
                                    &event_tx,
                                    &mut countdown,
                                    &mut results_return,
                                ).await.is_err() {
                                    emit_disconnected(&event_tx, &state, Some("transport send error".into())).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("failed to deserialize server message: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }

            // Branch 4: countdown tick (1 Hz while a round is open)
            _ = async {
                match countdown.as_mut() {
                    Some(interval) => { interval.tick().await; }
                    None => std::future::pending().await,
                }
            } => {
                let effects = machine.handle(LifecycleInput::CountdownTick);
                if perform_effects(
                    effects,
                    &mut transport,
                    &event_tx,
                    &mut countdown,
                    &mut results_return,
                ).await.is_err() {
                    emit_disconnected(&event_tx, &state, Some("transport send error".into())).await;
                    break;
                }
            }

            // Branch 5: results display interval elapsed
            _ = async {
                match results_return.as_mut() {
                    Some(sleep) => sleep.await,
                    None => std::future::pending().await,
                }
            } => {
                results_return = None;
                let effects = machine.handle(LifecycleInput::ResultsElapsed);
                if perform_effects(
                    effects,
                    &mut transport,
                    &event_tx,
                    &mut countdown,
                    &mut results_return,
                ).await.is_err() {
                    emit_disconnected(&event_tx, &state, Some("transport send error".into())).await;
                    break;
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Process a local command into effects.
async fn handle_command(
    cmd: Command,
    machine: &mut LifecycleMachine,
    reconnect: &mut ReconnectFlow,
    session: &mut SessionStore,
    directory: &impl GameDirectory,
    state: &ClientState,
) -> Vec<Effect> {
    match cmd {
        Command::JoinGame { game_code } => {
            // Confirm existence and non-terminal status before emitting.
            let lookup = directory
                .find_game(&game_code)
                .and_then(|summary| ensure_joinable(&game_code, summary));
            match lookup {
                Ok(()) => {
                    // A fresh join supersedes any unresolved reconnect
                    // attempt; its late reply becomes inert.
                    reconnect.abandon();
                    persist_or_warn(session.set_game_code(&game_code));
                    *state.game_code.lock().await = Some(game_code.clone());
                    vec![Effect::Send(ClientMessage::JoinGame { game_code })]
                }
                Err(e) => {
                    persist_or_warn(session.clear_game_code());
                    *state.game_code.lock().await = None;
                    vec![Effect::Emit(QuizWireEvent::JoinFailed {
                        message: e.to_string(),
                    })]
                }
            }
        }
        Command::SubmitAnswer { answer_index } => machine.handle(LifecycleInput::SubmitAnswer {
            answer_index,
            now_epoch_ms: epoch_ms(),
        }),
        Command::LeaveGame => {
            persist_or_warn(session.clear());
            state.in_game.store(false, Ordering::Release);
            *state.game_code.lock().await = None;
            *state.player_id.lock().await = None;
            *machine = LifecycleMachine::new();
            vec![
                Effect::StopCountdown,
                Effect::CancelResultsReturn,
                Effect::Send(ClientMessage::LeaveGame),
                Effect::Emit(QuizWireEvent::Navigate(Screen::Join)),
            ]
        }
        Command::Ping => vec![Effect::Send(ClientMessage::Ping {
            timestamp: epoch_ms(),
        })],
    }
}

/// Dispatch a received [`ServerMessage`] into the right stateful component
/// and collect the resulting effects.
async fn handle_server_message(
    msg: ServerMessage,
    machine: &mut LifecycleMachine,
    reconnect: &mut ReconnectFlow,
    session: &mut SessionStore,
    state: &ClientState,
) -> Vec<Effect> {
    match msg {
        ServerMessage::GameJoined {
            player_token,
            player_id,
        } => {
            persist_or_warn(session.set_player_token(&player_token));
            persist_or_warn(session.set_player_id(&player_id));
            machine.set_player_id(&player_id);

            state.in_game.store(true, Ordering::Release);
            *state.player_id.lock().await = Some(player_id.clone());
            let game_code = session.session().game_code.unwrap_or_default();
            debug!(game_code = %game_code, "joined game");

            vec![
                Effect::Emit(QuizWireEvent::Joined {
                    game_code,
                    player_id,
                }),
                Effect::Emit(QuizWireEvent::Navigate(Screen::Game)),
            ]
        }
        ServerMessage::JoinError { message } => {
            // Partial state (the entered code) is cleared so the join
            // control starts clean; the token, if any, survives.
            persist_or_warn(session.clear_game_code());
            *state.game_code.lock().await = None;
            vec![Effect::Emit(QuizWireEvent::JoinFailed { message })]
        }
        ServerMessage::PlayerReconnected {
            player_id,
            game_status,
        } => {
            let effects = match reconnect.on_reconnected(session, &player_id, game_status) {
                Ok(effects) => effects,
                Err(e) => {
                    warn!("session persistence failed during reconnect: {e}");
                    Vec::new()
                }
            };
            if !effects.is_empty() {
                machine.set_player_id(&player_id);
                state.in_game.store(true, Ordering::Release);
                *state.player_id.lock().await = Some(player_id);
                *state.game_code.lock().await = session.session().game_code;
            }
            effects
        }
        ServerMessage::ReconnectError { message } => {
            state.in_game.store(false, Ordering::Release);
            *state.player_id.lock().await = None;
            *state.game_code.lock().await = None;
            match reconnect.on_reconnect_error(session, message) {
                Ok(effects) => effects,
                Err(e) => {
                    warn!("session wipe failed after reconnect_error: {e}");
                    Vec::new()
                }
            }
        }
        ServerMessage::QuestionStarted(payload) => {
            machine.handle(LifecycleInput::QuestionStarted(payload))
        }
        ServerMessage::QuestionEnded(payload) => {
            machine.handle(LifecycleInput::QuestionEnded(payload))
        }
        ServerMessage::AnswerResult {
            correct,
            response_time_ms,
        } => machine.handle(LifecycleInput::AnswerVerdict {
            correct,
            response_time_ms,
        }),
        ServerMessage::Pong { timestamp } => {
            vec![Effect::Emit(QuizWireEvent::Pong { timestamp })]
        }
    }
}

/// Perform a transition's effects in order. Returns `Err` only for a
/// transport send failure, which tears the loop down.
async fn perform_effects(
    effects: Vec<Effect>,
    transport: &mut impl Transport,
    event_tx: &mpsc::Sender<QuizWireEvent>,
    countdown: &mut Option<Interval>,
    results_return: &mut Option<Pin<Box<Sleep>>>,
) -> Result<()> {
    for effect in effects {
        match effect {
            Effect::Send(msg) => send_message(transport, &msg).await?,
            Effect::Emit(event) => emit_event(event_tx, event).await,
            Effect::StartCountdown => {
                // First tick one second from now; `interval` would fire
                // immediately and eat a display second.
                *countdown = Some(tokio::time::interval_at(
                    Instant::now() + Duration::from_secs(1),
                    Duration::from_secs(1),
                ));
            }
            Effect::StopCountdown => *countdown = None,
            Effect::ScheduleResultsReturn => {
                *results_return = Some(Box::pin(tokio::time::sleep(Duration::from_secs(
                    RESULTS_DISPLAY_SECONDS,
                ))));
            }
            Effect::CancelResultsReturn => *results_return = None,
        }
    }
    Ok(())
}

/// Serialize and send one [`ClientMessage`].
async fn send_message(transport: &mut impl Transport, msg: &ClientMessage) -> Result<()> {
    debug!("sending client message: {:?}", std::mem::discriminant(msg));
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            // Serialization errors are programming bugs; don't kill the loop.
            error!("failed to serialize ClientMessage: {e}");
            return Ok(());
        }
    };
    transport.send(json).await
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the transport loop.
async fn emit_event(event_tx: &mpsc::Sender<QuizWireEvent>, event: QuizWireEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a [`Disconnected`](QuizWireEvent::Disconnected) event and update state.
///
/// Uses `send().await` (blocking) instead of `try_send` because `Disconnected`
/// is always the last event on the channel and must never be silently dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<QuizWireEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    let event = QuizWireEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::directory::{GameSummary, OpenDirectory};
    use crate::protocol::{GameStatus, LeaderboardEntry, QuestionStartedPayload};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records sent messages and replays scripted responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<String, QuizWireError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, QuizWireError>>>,
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
        async fn send(&mut self, message: String) -> std::result::Result<(), QuizWireError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, QuizWireError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted message or error.
                item
            } else {
                // All scripted messages have been delivered — hang forever
                // so the transport loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), QuizWireError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn game_joined_json() -> String {
        serde_json::to_string(&ServerMessage::GameJoined {
            player_token: "T1".into(),
            player_id: "P1".into(),
        })
        .unwrap()
    }

    fn question_started_json(time_limit: u32) -> String {
        serde_json::to_string(&ServerMessage::QuestionStarted(QuestionStartedPayload {
            question: "Largest planet?".into(),
            options: [
                "Mars".into(),
                "Jupiter".into(),
                "Venus".into(),
                "Saturn".into(),
            ],
            time_limit_seconds: time_limit,
        }))
        .unwrap()
    }

    fn question_ended_json(status: GameStatus) -> String {
        serde_json::to_string(&ServerMessage::QuestionEnded(
            crate::protocol::QuestionEndedPayload {
                correct_answer_index: 1,
                leaderboard: vec![LeaderboardEntry {
                    player_id: "P1".into(),
                    name: "Alice".into(),
                    score: 800,
                }],
                game_status: status,
            },
        ))
        .unwrap()
    }

    fn saved_session() -> SessionStore {
        let mut store = SessionStore::in_memory();
        store.set_game_code("123456").unwrap();
        store.set_player_token("T1").unwrap();
        store
    }

    fn parse_sent(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let first = events.recv().await.unwrap();
        assert!(
            matches!(first, QuizWireEvent::Connected),
            "expected Connected as first event, got {first:?}"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn no_saved_session_sends_nothing_on_start() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        settle().await;
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn saved_session_sends_reconnect_player_on_start() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            saved_session(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        settle().await;

        let messages = parse_sent(&sent);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            ClientMessage::ReconnectPlayer {
                game_code: "123456".into(),
                player_token: "T1".into(),
            }
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_sends_join_game_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        client.join("123456").unwrap();
        settle().await;

        let messages = parse_sent(&sent);
        assert_eq!(
            messages,
            vec![ClientMessage::JoinGame {
                game_code: "123456".into(),
            }]
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn short_code_is_rejected_locally() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        let err = client.join("12345").unwrap_err();
        assert!(matches!(err, QuizWireError::GameCodeTooShort));

        settle().await;
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    /// Directory that reports every game as finished.
    struct FinishedDirectory;

    impl GameDirectory for FinishedDirectory {
        fn find_game(&self, _code: &str) -> Result<GameSummary> {
            Ok(GameSummary {
                status: GameStatus::Finished,
            })
        }
    }

    #[tokio::test]
    async fn finished_game_fails_the_join_lookup() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            FinishedDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        client.join("123456").unwrap();

        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, QuizWireEvent::JoinFailed { .. }),
            "got {event:?}"
        );
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn game_joined_updates_state_and_navigates() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(game_joined_json()))]);
        let mut session = SessionStore::in_memory();
        session.set_game_code("123456").unwrap();
        let (mut client, mut events) =
            QuizWireClient::start(transport, session, OpenDirectory, QuizWireConfig::new());

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, QuizWireEvent::Joined { ref player_id, .. } if player_id == "P1"),
            "got {event:?}"
        );
        let event = events.recv().await.unwrap();
        assert_eq!(event, QuizWireEvent::Navigate(Screen::Game));

        assert!(client.is_in_game());
        assert_eq!(client.current_player_id().await.as_deref(), Some("P1"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_answer_sends_exactly_once() {
        let (transport, sent, _closed) =
            MockTransport::new(vec![Some(Ok(question_started_json(30)))]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        // Wait for the round to open before submitting.
        loop {
            match events.recv().await.unwrap() {
                QuizWireEvent::QuestionStarted { .. } => break,
                _ => continue,
            }
        }

        client.submit_answer(0).unwrap();
        client.submit_answer(3).unwrap();
        settle().await;

        let submits: Vec<_> = parse_sent(&sent)
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::SubmitAnswer { .. }))
            .collect();
        assert_eq!(submits.len(), 1);
        assert!(
            matches!(submits[0], ClientMessage::SubmitAnswer { answer_index: 0, .. }),
            "the first submission wins"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn out_of_range_answer_never_reaches_network() {
        let (transport, sent, _closed) =
            MockTransport::new(vec![Some(Ok(question_started_json(30)))]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        loop {
            match events.recv().await.unwrap() {
                QuizWireEvent::QuestionStarted { .. } => break,
                _ => continue,
            }
        }

        client.submit_answer(9).unwrap();
        settle().await;

        assert!(parse_sent(&sent)
            .iter()
            .all(|m| !matches!(m, ClientMessage::SubmitAnswer { .. })));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn round_ended_surfaces_rank() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(game_joined_json())),
            Some(Ok(question_started_json(30))),
            Some(Ok(question_ended_json(GameStatus::Results))),
        ]);
        let mut session = SessionStore::in_memory();
        session.set_game_code("123456").unwrap();
        let (mut client, mut events) =
            QuizWireClient::start(transport, session, OpenDirectory, QuizWireConfig::new());

        let round_ended = loop {
            match events.recv().await.unwrap() {
                QuizWireEvent::RoundEnded {
                    correct_answer_index,
                    rank,
                    ..
                } => break (correct_answer_index, rank),
                _ => continue,
            }
        };
        assert_eq!(round_ended, (1, Some(1)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn reconnect_error_expires_session_and_routes_to_join() {
        let reconnect_error = serde_json::to_string(&ServerMessage::ReconnectError {
            message: "unknown token".into(),
        })
        .unwrap();
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(reconnect_error))]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            saved_session(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, QuizWireEvent::SessionExpired { ref message } if message == "unknown token"),
            "got {event:?}"
        );
        let event = events.recv().await.unwrap();
        assert_eq!(event, QuizWireEvent::Navigate(Screen::Join));
        assert!(!client.is_in_game());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn reconnected_mid_question_notices_without_a_question() {
        let reconnected = serde_json::to_string(&ServerMessage::PlayerReconnected {
            player_id: "P1".into(),
            game_status: GameStatus::QuestionActive,
        })
        .unwrap();
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(reconnected))]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            saved_session(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuizWireEvent::Reconnected { .. }));
        let event = events.recv().await.unwrap();
        assert_eq!(event, QuizWireEvent::Navigate(Screen::Game));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuizWireEvent::Notice { .. }));

        assert!(client.is_in_game());
        assert_eq!(client.current_player_id().await.as_deref(), Some("P1"));

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_arrive_every_second() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Ok(question_started_json(3)))]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let mut ticks = Vec::new();
        while ticks.last() != Some(&0) {
            match events.recv().await.unwrap() {
                QuizWireEvent::CountdownTick { remaining_seconds } => {
                    ticks.push(remaining_seconds);
                }
                _ => continue,
            }
        }
        assert_eq!(ticks, vec![3, 2, 1, 0]);

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn results_return_to_waiting_after_display_interval() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(question_started_json(30))),
            Some(Ok(question_ended_json(GameStatus::Results))),
        ]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let mut saw_round_end = false;
        loop {
            match events.recv().await.unwrap() {
                QuizWireEvent::RoundEnded { .. } => saw_round_end = true,
                QuizWireEvent::WaitingForNextQuestion => break,
                _ => continue,
            }
        }
        assert!(saw_round_end);

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_game_never_returns_to_waiting() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(question_started_json(30))),
            Some(Ok(question_ended_json(GameStatus::Finished))),
        ]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        loop {
            match events.recv().await.unwrap() {
                QuizWireEvent::GameOver => break,
                QuizWireEvent::WaitingForNextQuestion => {
                    panic!("terminal results must not auto-return")
                }
                _ => continue,
            }
        }

        // Well past the display interval: still no auto-return.
        tokio::time::sleep(Duration::from_secs(30)).await;
        client.shutdown().await;
        while let Some(event) = events.recv().await {
            assert!(
                !matches!(event, QuizWireEvent::WaitingForNextQuestion),
                "terminal results must not auto-return"
            );
        }
    }

    #[tokio::test]
    async fn ping_sends_ping_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        client.ping().unwrap();
        settle().await;

        let messages = parse_sent(&sent);
        assert!(matches!(
            messages.last(),
            Some(ClientMessage::Ping { .. })
        ));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn leave_sends_message_and_resets_state() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(game_joined_json()))]);
        let mut session = SessionStore::in_memory();
        session.set_game_code("123456").unwrap();
        let (mut client, mut events) =
            QuizWireClient::start(transport, session, OpenDirectory, QuizWireConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Joined
        let _ = events.recv().await; // Navigate(Game)

        client.leave().unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event, QuizWireEvent::Navigate(Screen::Join));

        assert!(!client.is_in_game());
        assert!(client.current_player_id().await.is_none());
        assert!(matches!(
            parse_sent(&sent).last(),
            Some(ClientMessage::LeaveGame)
        ));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnected_on_transport_close() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            // Explicit None signals clean transport close.
            None,
        ]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuizWireEvent::Disconnected { .. }));
        assert!(!client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        let result = client.ping();
        assert!(matches!(result, Err(QuizWireError::NotConnected)));
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuizWireEvent::Disconnected { .. }));
        if let QuizWireEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        }

        // The transport should have been closed.
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected

        // Drop the client without calling shutdown.
        drop(client);

        // The transport loop should eventually exit; the event channel
        // will close. We just verify we don't hang or panic.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn malformed_server_message_is_skipped() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok("{not valid json".into())),
            Some(Ok(game_joined_json())),
        ]);
        let mut session = SessionStore::in_memory();
        session.set_game_code("123456").unwrap();
        let (mut client, mut events) =
            QuizWireClient::start(transport, session, OpenDirectory, QuizWireConfig::new());

        let _ = events.recv().await; // Connected
        // The malformed message is logged and skipped; the next one works.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuizWireEvent::Joined { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_recv_error_emits_disconnected() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
            QuizWireError::TransportReceive("boom".into()),
        ))]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, QuizWireEvent::Disconnected { .. }));
        if let QuizWireEvent::Disconnected { reason } = event {
            assert!(reason.unwrap().contains("boom"));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = QuizWireConfig::new();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let config = QuizWireConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = QuizWireClient::start(
            transport,
            SessionStore::in_memory(),
            OpenDirectory,
            QuizWireConfig::new(),
        );

        let _ = events.recv().await; // Connected
        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("QuizWireClient"));
        assert!(debug_str.contains("connected"));

        client.shutdown().await;
    }
}
