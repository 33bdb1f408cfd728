//! Client-held authentication state.
//!
//! [`SessionStore`] is the only owner of the [`Session`]. It is mutated
//! through [`set_auth`](SessionStore::set_auth),
//! [`set_access_token`](SessionStore::set_access_token),
//! [`update_user`](SessionStore::update_user) and
//! [`logout`](SessionStore::logout); each mutation is written through the
//! injected [`SessionPersistence`] port and broadcast to subscribers.

mod persist;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

pub use persist::{FilePersistence, MemoryPersistence, SessionPersistence};

/// Verification badge tier shown next to a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationType {
    #[default]
    None,
    Blue,
    Purple,
    Red,
}

fn default_language() -> String {
    "en".to_string()
}

/// The user summary the backend returns with auth responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub verification_type: VerificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_badge: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

/// Partial update merged into the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub status: Option<String>,
    pub verification_type: Option<VerificationType>,
    pub verification_badge: Option<String>,
    pub language: Option<String>,
}

impl UserPatch {
    fn apply(self, user: &mut UserSummary) {
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(email) = self.email {
            user.email = Some(email);
        }
        if let Some(avatar_url) = self.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        if let Some(bio) = self.bio {
            user.bio = Some(bio);
        }
        if let Some(status) = self.status {
            user.status = status;
        }
        if let Some(verification_type) = self.verification_type {
            user.verification_type = verification_type;
        }
        if let Some(badge) = self.verification_badge {
            user.verification_badge = Some(badge);
        }
        if let Some(language) = self.language {
            user.language = language;
        }
    }
}

impl From<UserSummary> for UserPatch {
    fn from(user: UserSummary) -> Self {
        Self {
            username: Some(user.username),
            email: user.email,
            avatar_url: user.avatar_url,
            bio: user.bio,
            status: Some(user.status),
            verification_type: Some(user.verification_type),
            verification_badge: user.verification_badge,
            language: Some(user.language),
        }
    }
}

/// Authentication state: the user plus both bearer credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Option<UserSummary>,
    /// Short-lived access credential attached to ordinary requests.
    pub access_token: Option<String>,
    /// Longer-lived credential used only against the refresh endpoint.
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub is_authenticated: bool,
}

/// On-disk envelope: `{"state": {...}, "version": 0}`.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    state: Session,
    #[serde(default)]
    version: u32,
}

const PERSIST_VERSION: u32 = 0;

struct Versioned {
    revision: u64,
    session: Session,
}

/// Owner of the [`Session`], persisted under a fixed key.
pub struct SessionStore {
    key: String,
    persistence: Arc<dyn SessionPersistence>,
    state: Mutex<Versioned>,
    /// Revision last handed to the persistence port.
    written: Mutex<u64>,
    changes: watch::Sender<Session>,
}

impl SessionStore {
    /// Open the store, hydrating from `persistence`.
    ///
    /// A missing or unreadable entry yields an empty session.
    pub fn open(key: impl Into<String>, persistence: Arc<dyn SessionPersistence>) -> Self {
        let key = key.into();
        let session = match persistence.load(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedSession>(&raw) {
                Ok(persisted) => {
                    debug!(key = %key, version = persisted.version, "Hydrated session");
                    persisted.state
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding unreadable persisted session");
                    Session::default()
                }
            },
            Ok(None) => Session::default(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load persisted session (non-fatal)");
                Session::default()
            }
        };

        let (changes, _) = watch::channel(session.clone());
        Self {
            key,
            persistence,
            state: Mutex::new(Versioned {
                revision: 0,
                session,
            }),
            written: Mutex::new(0),
            changes,
        }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::open(
            crate::config::DEFAULT_STORAGE_KEY,
            Arc::new(MemoryPersistence::new()),
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.state.lock().session.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.lock().session.access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.lock().session.refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserSummary> {
        self.state.lock().session.user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().session.is_authenticated
    }

    /// Watch every committed session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.changes.subscribe()
    }

    /// Replace the whole session after a login or registration.
    pub fn set_auth(
        &self,
        user: Option<UserSummary>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Session {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        self.mutate(move |session| {
            session.is_authenticated = user.is_some();
            session.user = user;
            session.access_token = Some(access_token);
            session.refresh_token = Some(refresh_token);
        })
    }

    /// Store a refreshed access credential, keeping the user and the
    /// refresh credential.
    pub fn set_access_token(&self, access_token: impl Into<String>) -> Session {
        let access_token = access_token.into();
        self.mutate(move |session| {
            session.access_token = Some(access_token);
            session.is_authenticated = session.user.is_some();
        })
    }

    /// Merge `patch` into the current user. No-op when logged out.
    pub fn update_user(&self, patch: UserPatch) -> Session {
        self.mutate(move |session| {
            if let Some(user) = session.user.as_mut() {
                patch.apply(user);
            }
        })
    }

    /// Clear the entire session.
    pub fn logout(&self) -> Session {
        self.mutate(|session| *session = Session::default())
    }

    /// Apply `f` under the state lock, then write the result through the
    /// port after the lock is released. Readers never wait on the port.
    fn mutate<F>(&self, f: F) -> Session
    where
        F: FnOnce(&mut Session),
    {
        let (revision, snapshot) = {
            let mut state = self.state.lock();
            f(&mut state.session);
            state.revision += 1;
            let snapshot = state.session.clone();
            self.changes.send_replace(snapshot.clone());
            (state.revision, snapshot)
        };
        self.persist(revision, &snapshot);
        snapshot
    }

    /// Write `session` unless a newer revision already reached the port.
    fn persist(&self, revision: u64, session: &Session) {
        let mut written = self.written.lock();
        if *written >= revision {
            debug!(key = %self.key, revision, "Skipping stale session write");
            return;
        }

        let envelope = PersistedSession {
            state: session.clone(),
            version: PERSIST_VERSION,
        };
        let result = serde_json::to_string(&envelope)
            .map_err(crate::ClientError::from)
            .and_then(|raw| self.persistence.save(&self.key, &raw));

        match result {
            Ok(()) => *written = revision,
            Err(e) => warn!(key = %self.key, error = %e, "Failed to persist session (non-fatal)"),
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("key", &self.key)
            .field("is_authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
