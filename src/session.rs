//! Persistent session identity for the QuizWire client.
//!
//! [`SessionStore`] owns the identity of the current game: the entered game
//! code, the long-lived player token issued on first join, and the per-game
//! player id. Token and ids survive process restarts via a JSON file so a
//! player can reconnect after a crash or reload. Player ids are keyed by game
//! code and are not transferable across games: a stale token with no stored
//! id for the current code forces a fresh join.
//!
//! The store has no network or UI side effects; it is pure state plus
//! persistence, constructed explicitly and passed into the client so tests
//! can supply an in-memory instance.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Snapshot of the current session identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Code of the game the player entered (or restored from disk).
    pub game_code: Option<String>,
    /// Opaque credential issued by the server on first join.
    pub player_token: Option<String>,
    /// Per-game-instance identifier for the current game code.
    pub player_id: Option<String>,
}

/// On-disk shape of the persisted session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedSession {
    game_code: Option<String>,
    player_token: Option<String>,
    /// Player ids keyed by game code.
    #[serde(default)]
    player_ids: HashMap<String, String>,
}

/// Durable store for session identity.
#[derive(Debug)]
pub struct SessionStore {
    state: PersistedSession,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// Create a store that never touches the filesystem. Used in tests and
    /// by embedders that manage persistence themselves.
    pub fn in_memory() -> Self {
        Self {
            state: PersistedSession::default(),
            path: None,
        }
    }

    /// Open (or create) a store backed by the given file.
    ///
    /// A missing file yields an empty session. A corrupt file is logged and
    /// treated as empty rather than failing the client: the worst case is a
    /// fresh join.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), "corrupt session file, starting fresh: {e}");
                    PersistedSession::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedSession::default(),
            Err(e) => {
                warn!(path = %path.display(), "cannot read session file, starting fresh: {e}");
                PersistedSession::default()
            }
        };
        Self {
            state,
            path: Some(path),
        }
    }

    /// Default platform location for the session file
    /// (e.g. `~/.local/share/quizwire/session.json` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("quizwire").join("session.json"))
    }

    /// Snapshot of the current session. `player_id` resolves through the
    /// per-game-code map, so a code with no stored id yields `None`.
    pub fn session(&self) -> Session {
        Session {
            game_code: self.state.game_code.clone(),
            player_token: self.state.player_token.clone(),
            player_id: self
                .state
                .game_code
                .as_deref()
                .and_then(|code| self.state.player_ids.get(code).cloned()),
        }
    }

    /// Set the current game code and persist it.
    pub fn set_game_code(&mut self, code: impl Into<String>) -> Result<()> {
        self.state.game_code = Some(code.into());
        self.persist()
    }

    /// Forget the current game code (e.g. after a rejected join), keeping
    /// the token and stored ids intact.
    pub fn clear_game_code(&mut self) -> Result<()> {
        self.state.game_code = None;
        self.persist()
    }

    /// Store the server-issued player token and persist it.
    pub fn set_player_token(&mut self, token: impl Into<String>) -> Result<()> {
        self.state.player_token = Some(token.into());
        self.persist()
    }

    /// Store the player id for the current game code and persist it.
    /// Without a game code set there is nothing to key the id by, so the
    /// call is a no-op.
    pub fn set_player_id(&mut self, player_id: impl Into<String>) -> Result<()> {
        let Some(code) = self.state.game_code.clone() else {
            debug!("set_player_id with no game code set, ignoring");
            return Ok(());
        };
        self.state.player_ids.insert(code, player_id.into());
        self.persist()
    }

    /// True iff a token exists and a game code is set — the precondition for
    /// attempting reconnection.
    pub fn has_saved_session(&self) -> bool {
        self.state.player_token.is_some() && self.state.game_code.is_some()
    }

    /// Look up the persisted player id for a specific game code.
    pub fn saved_player_id(&self, game_code: &str) -> Option<&str> {
        self.state.player_ids.get(game_code).map(String::as_str)
    }

    /// Wipe the token, the game code, and every stored per-game id.
    /// Called when the server declares the token invalid, or on logout.
    pub fn clear(&mut self) -> Result<()> {
        self.state = PersistedSession::default();
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        write_atomically(path, &json)?;
        debug!(path = %path.display(), "session persisted");
        Ok(())
    }
}

/// Write via a sibling temp file and rename, so a crash mid-write never
/// leaves a truncated session file.
fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
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
    fn empty_store_has_no_saved_session() {
        let store = SessionStore::in_memory();
        assert!(!store.has_saved_session());
        assert_eq!(store.session(), Session::default());
    }

    #[test]
    fn token_alone_is_not_a_saved_session() {
        let mut store = SessionStore::in_memory();
        store.set_player_token("T1").unwrap();
        assert!(!store.has_saved_session());

        store.set_game_code("123456").unwrap();
        assert!(store.has_saved_session());
    }

    #[test]
    fn player_ids_are_keyed_by_game_code() {
        let mut store = SessionStore::in_memory();
        store.set_game_code("111111").unwrap();
        store.set_player_id("P-first").unwrap();
        store.set_game_code("222222").unwrap();
        store.set_player_id("P-second").unwrap();

        assert_eq!(store.saved_player_id("111111"), Some("P-first"));
        assert_eq!(store.saved_player_id("222222"), Some("P-second"));
        assert_eq!(store.saved_player_id("333333"), None);

        // The session snapshot resolves through the current code.
        assert_eq!(store.session().player_id.as_deref(), Some("P-second"));
    }

    #[test]
    fn set_player_id_without_code_is_a_noop() {
        let mut store = SessionStore::in_memory();
        store.set_player_id("P1").unwrap();
        assert!(store.session().player_id.is_none());
    }

    #[test]
    fn clear_wipes_everything() {
        let mut store = SessionStore::in_memory();
        store.set_game_code("123456").unwrap();
        store.set_player_token("T1").unwrap();
        store.set_player_id("P1").unwrap();

        store.clear().unwrap();

        assert!(!store.has_saved_session());
        assert_eq!(store.saved_player_id("123456"), None);
        assert_eq!(store.session(), Session::default());
    }

    #[test]
    fn clear_game_code_keeps_token_and_ids() {
        let mut store = SessionStore::in_memory();
        store.set_game_code("123456").unwrap();
        store.set_player_token("T1").unwrap();
        store.set_player_id("P1").unwrap();

        store.clear_game_code().unwrap();

        assert!(!store.has_saved_session());
        assert_eq!(store.session().player_token.as_deref(), Some("T1"));
        assert_eq!(store.saved_player_id("123456"), Some("P1"));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let mut store = SessionStore::open(&path);
            store.set_game_code("123456").unwrap();
            store.set_player_token("T1").unwrap();
            store.set_player_id("P1").unwrap();
        }

        let reopened = SessionStore::open(&path);
        assert!(reopened.has_saved_session());
        let session = reopened.session();
        assert_eq!(session.game_code.as_deref(), Some("123456"));
        assert_eq!(session.player_token.as_deref(), Some("T1"));
        assert_eq!(session.player_id.as_deref(), Some("P1"));
    }

    #[test]
    fn missing_file_yields_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("nope.json"));
        assert!(!store.has_saved_session());
    }

    #[test]
    fn corrupt_file_yields_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        let store = SessionStore::open(&path);
        assert!(!store.has_saved_session());
    }

    #[test]
    fn stale_token_with_unknown_code_forces_fresh_join() {
        let mut store = SessionStore::in_memory();
        store.set_game_code("111111").unwrap();
        store.set_player_token("T1").unwrap();
        store.set_player_id("P1").unwrap();

        // A new game instance with a different code: token exists but no
        // stored id for it.
        store.set_game_code("999999").unwrap();
        assert!(store.has_saved_session());
        assert!(store.session().player_id.is_none());
        assert_eq!(store.saved_player_id("999999"), None);
    }
}
