//! Read-only bridge to the persisted login session.
//!
//! The UI's auth flow persists its state under a fixed storage key; both the
//! REST client and the header-authenticated export transport need the bearer
//! token from that record. Each goes through [`AuthSession::token`] so there
//! is exactly one copy of the parsing logic.

use std::path::{Path, PathBuf};

/// Storage key the auth flow persists its state under.
pub const STORAGE_KEY: &str = "auth-storage";

/// Persisted record shape: `{ "state": {...}, "version": N }`.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PersistedAuth {
    #[serde(default)]
    pub state: AuthState,
    #[serde(default)]
    pub version: u32,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct AuthState {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default, rename = "isAuthenticated")]
    pub is_authenticated: bool,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AuthUser {
    pub id: u64,
    #[serde(default)]
    pub username: String,
}

/// Accessor over the persisted auth record.
///
/// Reads are fail-soft: a missing or corrupt record means "not logged in",
/// never an error. Only the auth flow itself writes the record.
#[derive(Clone, Debug)]
pub struct AuthSession {
    path: PathBuf,
}

impl AuthSession {
    /// Session backed by `<storage_dir>/auth-storage.json`.
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            path: storage_dir.as_ref().join(format!("{STORAGE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<PersistedAuth> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ignoring unreadable auth record");
                None
            }
        }
    }

    /// Bearer token of the current login, if any.
    pub fn token(&self) -> Option<String> {
        self.load()?.state.token.filter(|t| !t.is_empty())
    }
}
