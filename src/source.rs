//! External collaborator boundaries — identity backend and profile store.
//!
//! DESIGN
//! ======
//! Both collaborators are injected as `Arc<dyn _>` trait objects so the
//! synchronizer can be driven by scripted doubles in tests. The push stream
//! is an unbounded mpsc channel: the source fans events out to every
//! subscriber, and dropping the receiver unsubscribes.
//!
//! Cooperative fetch cancellation is drop-based: the coordinator aborts the
//! task driving `fetch_profile`, which drops the in-flight future. The epoch
//! check on delivery remains the mandatory guard; abort is an optimization.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::{ProfileRecord, Role, Session, User};

// =============================================================================
// EVENTS
// =============================================================================

/// Kind of session-change notification pushed by the identity backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    /// Token bundle replaced for the same identity. Absorbed without
    /// restarting the profile fetch.
    TokenRefreshed,
}

/// A pushed session-change notification.
#[derive(Clone, Debug)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    /// The session now in effect, or `None` when signed out.
    pub session: Option<Session>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by the identity backend.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("identity backend unreachable: {0}")]
    Transport(String),
    #[error("identity backend rejected request: {0}")]
    Rejected(String),
    /// Sign-up created the user but the profile row could not be written.
    #[error("profile provisioning failed: {0}")]
    Provision(#[from] StoreError),
}

/// Errors surfaced by the profile store. "Row not found" is not an error;
/// `fetch_profile` expresses it as `Ok(None)`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StoreError {
    #[error("profile store unreachable: {0}")]
    Transport(String),
    #[error("profile store error: {0}")]
    Backend(String),
}

// =============================================================================
// ACTION INPUTS
// =============================================================================

/// Credentials for sign-in and sign-up.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Profile fields collected at sign-up, written to the store once the
/// identity backend has created the user.
#[derive(Clone, Debug)]
pub struct ProfileSeed {
    pub full_name: String,
    pub role: Role,
}

// =============================================================================
// SESSION SOURCE
// =============================================================================

/// Identity backend boundary: session issuance, push notifications, and
/// credential actions. Token storage and refresh live entirely behind this
/// trait.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// One-shot query for the session in effect right now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on transport failure; the synchronizer treats
    /// any error here as "no session".
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Register for push notifications of session changes. Dropping the
    /// receiver unsubscribes.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent>;

    /// Authenticate with credentials, establishing a new session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if authentication fails; no local state changes.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    /// Create a new account. Returns the created user; the caller provisions
    /// the profile row separately.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if account creation fails.
    async fn sign_up(&self, credentials: &Credentials) -> Result<User, AuthError>;

    /// Invalidate the current session at the backend. Best-effort: the
    /// synchronizer clears local state before calling this.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the backend call fails; local state is
    /// already cleared regardless.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

// =============================================================================
// PROFILE STORE
// =============================================================================

/// Profile-record store boundary: one row per user id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile row for `user_id`. `Ok(None)` means the row does
    /// not exist yet, a normal state for newly registered users.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any failure other than absence.
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<ProfileRecord>, StoreError>;

    /// Insert a freshly provisioned profile row. Invoked once by the
    /// sign-up flow, not part of the steady-state loop.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn insert_profile(&self, record: &ProfileRecord) -> Result<(), StoreError>;
}

// =============================================================================
// TEST HELPERS
// =============================================================================
