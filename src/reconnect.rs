//! Reconnection protocol and fresh-join validation.
//!
//! [`ReconnectFlow`] decides, on each connected signal, whether to attempt to
//! resume a prior session with the persisted token, and reconciles the
//! server's reply into session state. Like the lifecycle machine it performs
//! no I/O itself: it returns the message to send and [`Effect`]s for the
//! driver to perform.
//!
//! The flow is armed once per connection. Connect/disconnect signals are
//! idempotent: a duplicate connected signal while an attempt is unresolved,
//! or after it resolved on the same connection, never emits a second
//! `reconnect_player`. The underlying channel's own retry/backoff governs
//! when a whole new attempt is made (after the next disconnect/connect pair).

use tracing::debug;

use crate::error::{QuizWireError, Result};
use crate::event::{QuizWireEvent, Screen};
use crate::lifecycle::Effect;
use crate::protocol::{ClientMessage, GameStatus, MIN_GAME_CODE_LEN};
use crate::session::SessionStore;

/// Notice surfaced when reconnecting into a round already in progress. The
/// player cannot retroactively answer; the next `question_started` or
/// `question_ended` re-synchronizes the lifecycle.
const MID_QUESTION_NOTICE: &str =
    "A question is in progress. You can answer again from the next question.";

/// Identity snapshot of the attempt that was emitted, used to detect stale
/// replies after the session changed underneath (e.g. a fresh join
/// superseded the attempt).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attempt {
    game_code: String,
    player_token: String,
}

#[derive(Debug, Default)]
enum FlowState {
    /// No attempt on this connection yet.
    #[default]
    Idle,
    /// `reconnect_player` emitted; awaiting exactly one terminal reply.
    AwaitingReply(Attempt),
    /// Resolved (or superseded) on this connection; re-armed by the next
    /// disconnect.
    Resolved,
}

/// State of the reconnection protocol across connect/disconnect cycles.
#[derive(Debug, Default)]
pub struct ReconnectFlow {
    state: FlowState,
}

impl ReconnectFlow {
    /// Create an idle flow.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while an emitted attempt has not seen its terminal reply.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, FlowState::AwaitingReply(_))
    }

    /// React to a fresh connected signal. Returns the `reconnect_player`
    /// message to emit, or `None` when there is no saved session or an
    /// attempt was already made on this connection.
    pub fn on_connected(&mut self, store: &SessionStore) -> Option<ClientMessage> {
        if !matches!(self.state, FlowState::Idle) {
            debug!("duplicate connected signal, reconnect already attempted");
            return None;
        }
        let session = store.session();
        let (game_code, player_token) = match (session.game_code, session.player_token) {
            (Some(code), Some(token)) => (code, token),
            _ => return None,
        };

        self.state = FlowState::AwaitingReply(Attempt {
            game_code: game_code.clone(),
            player_token: player_token.clone(),
        });
        debug!(game_code = %game_code, "attempting session resume");
        Some(ClientMessage::ReconnectPlayer {
            game_code,
            player_token,
        })
    }

    /// React to a disconnect. Re-arms the flow for the next connection.
    pub fn on_disconnected(&mut self) {
        self.state = FlowState::Idle;
    }

    /// Abandon any unresolved attempt because a fresh join superseded it.
    /// A late reply for the old token is then ignored as stale.
    pub fn abandon(&mut self) {
        if self.is_in_flight() {
            debug!("reconnect attempt superseded by fresh join");
        }
        self.state = FlowState::Resolved;
    }

    /// `player_reconnected`: adopt the player id into the session and route
    /// into the game. A reply with no matching attempt in flight, or one
    /// whose attempt no longer matches the current session, is ignored.
    pub fn on_reconnected(
        &mut self,
        store: &mut SessionStore,
        player_id: &str,
        game_status: GameStatus,
    ) -> Result<Vec<Effect>> {
        let attempt = match &self.state {
            FlowState::AwaitingReply(attempt) => attempt.clone(),
            _ => {
                debug!("ignoring player_reconnected with no attempt in flight");
                return Ok(Vec::new());
            }
        };
        self.state = FlowState::Resolved;

        let session = store.session();
        if session.game_code.as_deref() != Some(attempt.game_code.as_str())
            || session.player_token.as_deref() != Some(attempt.player_token.as_str())
        {
            debug!("ignoring stale player_reconnected for a superseded session");
            return Ok(Vec::new());
        }

        store.set_player_id(player_id)?;

        let mut effects = vec![
            Effect::Emit(QuizWireEvent::Reconnected {
                player_id: player_id.to_string(),
                game_status,
            }),
            Effect::Emit(QuizWireEvent::Navigate(Screen::Game)),
        ];
        if game_status == GameStatus::QuestionActive {
            // The lifecycle machine stays in Waiting; no question is
            // fabricated for a round we never saw start.
            effects.push(Effect::Emit(QuizWireEvent::Notice {
                message: MID_QUESTION_NOTICE.to_string(),
            }));
        }
        Ok(effects)
    }

    /// `reconnect_error`: the token is permanently invalid. Wipe the whole
    /// persisted session and route back to the join screen.
    pub fn on_reconnect_error(
        &mut self,
        store: &mut SessionStore,
        message: String,
    ) -> Result<Vec<Effect>> {
        self.state = FlowState::Resolved;
        store.clear()?;
        Ok(vec![
            Effect::Emit(QuizWireEvent::SessionExpired { message }),
            Effect::Emit(QuizWireEvent::Navigate(Screen::Join)),
        ])
    }
}

/// Validate a game code the player entered. Rejected locally; never reaches
/// the network.
pub fn validate_game_code(code: &str) -> Result<()> {
    if code.len() < MIN_GAME_CODE_LEN {
        return Err(QuizWireError::GameCodeTooShort);
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

    fn saved_store() -> SessionStore {
        let mut store = SessionStore::in_memory();
        store.set_game_code("123456").unwrap();
        store.set_player_token("T1").unwrap();
        store
    }

    #[test]
    fn no_saved_session_means_no_attempt() {
        let mut flow = ReconnectFlow::new();
        let store = SessionStore::in_memory();
        assert!(flow.on_connected(&store).is_none());
        assert!(!flow.is_in_flight());
    }

    #[test]
    fn saved_session_emits_reconnect_player() {
        let mut flow = ReconnectFlow::new();
        let store = saved_store();

        let msg = flow.on_connected(&store).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ReconnectPlayer {
                game_code: "123456".into(),
                player_token: "T1".into(),
            }
        );
        assert!(flow.is_in_flight());
    }

    #[test]
    fn duplicate_connected_signal_emits_once() {
        let mut flow = ReconnectFlow::new();
        let store = saved_store();

        assert!(flow.on_connected(&store).is_some());
        assert!(flow.on_connected(&store).is_none());
        assert!(flow.on_connected(&store).is_none());
    }

    #[test]
    fn resolved_flow_does_not_rearm_until_disconnect() {
        let mut flow = ReconnectFlow::new();
        let mut store = saved_store();

        flow.on_connected(&store);
        flow.on_reconnected(&mut store, "P1", GameStatus::Lobby)
            .unwrap();

        // Still the same connection: no second emission.
        assert!(flow.on_connected(&store).is_none());

        // New connection after a drop: a fresh attempt is allowed.
        flow.on_disconnected();
        assert!(flow.on_connected(&store).is_some());
    }

    #[test]
    fn reconnected_adopts_player_id_and_navigates_in() {
        let mut flow = ReconnectFlow::new();
        let mut store = saved_store();
        flow.on_connected(&store);

        let effects = flow
            .on_reconnected(&mut store, "P1", GameStatus::Lobby)
            .unwrap();
        assert_eq!(store.session().player_id.as_deref(), Some("P1"));
        assert!(effects.contains(&Effect::Emit(QuizWireEvent::Navigate(Screen::Game))));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(QuizWireEvent::Notice { .. }))));
    }

    #[test]
    fn reconnected_mid_question_adds_a_notice() {
        let mut flow = ReconnectFlow::new();
        let mut store = saved_store();
        flow.on_connected(&store);

        let effects = flow
            .on_reconnected(&mut store, "P1", GameStatus::QuestionActive)
            .unwrap();
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(QuizWireEvent::Notice { .. }))));
    }

    #[test]
    fn unsolicited_reconnected_reply_is_ignored() {
        let mut flow = ReconnectFlow::new();
        let mut store = saved_store();

        let effects = flow
            .on_reconnected(&mut store, "P1", GameStatus::Lobby)
            .unwrap();
        assert!(effects.is_empty());
        assert!(store.session().player_id.is_none());
    }

    #[test]
    fn stale_reply_after_fresh_join_is_ignored() {
        let mut flow = ReconnectFlow::new();
        let mut store = saved_store();
        flow.on_connected(&store);

        // A fresh join replaced the session while the attempt was in flight.
        store.set_game_code("999999").unwrap();
        store.set_player_token("T2").unwrap();

        let effects = flow
            .on_reconnected(&mut store, "P-old", GameStatus::Lobby)
            .unwrap();
        assert!(effects.is_empty());
        assert!(store.saved_player_id("999999").is_none());
    }

    #[test]
    fn reconnect_error_wipes_session_and_routes_to_join() {
        let mut flow = ReconnectFlow::new();
        let mut store = saved_store();
        store.set_player_id("P1").unwrap();
        flow.on_connected(&store);

        let effects = flow
            .on_reconnect_error(&mut store, "session expired".into())
            .unwrap();

        assert!(!store.has_saved_session());
        assert!(store.saved_player_id("123456").is_none());
        assert!(effects.contains(&Effect::Emit(QuizWireEvent::Navigate(Screen::Join))));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Emit(QuizWireEvent::SessionExpired { message }) if message == "session expired"
        )));
    }

    #[test]
    fn abandon_suppresses_reemission_on_same_connection() {
        let mut flow = ReconnectFlow::new();
        let store = saved_store();
        flow.on_connected(&store);

        flow.abandon();
        assert!(!flow.is_in_flight());
        assert!(flow.on_connected(&store).is_none());
    }

    #[test]
    fn game_code_validation() {
        assert!(validate_game_code("123456").is_ok());
        assert!(validate_game_code("1234567").is_ok());
        assert!(matches!(
            validate_game_code("12345"),
            Err(QuizWireError::GameCodeTooShort)
        ));
        assert!(matches!(
            validate_game_code(""),
            Err(QuizWireError::GameCodeTooShort)
        ));
    }
}
