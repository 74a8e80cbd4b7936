//! Core data model — sessions, users, profiles, and the observable snapshot.
//!
//! DESIGN
//! ======
//! `AuthState` is the single consumer-visible value. It is owned and mutated
//! exclusively by the state machine; everything else sees cloned snapshots
//! through a watch channel, so no reader can observe a half-applied
//! transition. Two invariants hold in every published snapshot:
//!
//! - `user` and `session` are set and cleared together.
//! - a non-`None` `profile` always belongs to the current `user`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ROLE
// =============================================================================

/// Application-level role carried on a profile record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

// =============================================================================
// USER / SESSION
// =============================================================================

/// Identity record embedded in a session. 1:1 with the session while one exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier, shared with the profile store.
    pub id: Uuid,
    pub email: String,
    /// Display name, if the identity backend provides one.
    pub name: Option<String>,
}

/// Backend-issued proof of an authenticated identity.
///
/// Opaque to the synchronizer apart from `user.id` and `valid`; the token and
/// expiry metadata are held only so the latest reference can be handed back
/// to consumers. Never serialized by this crate.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    /// Validity flag maintained by the identity backend.
    pub valid: bool,
}

impl Session {
    /// Whether `other` represents the same session identity.
    ///
    /// Token refresh replaces the token bundle without changing identity, so
    /// only the user id and validity flag participate. A refresh delivered
    /// through the event stream is absorbed without restarting the profile
    /// fetch or bumping the epoch.
    #[must_use]
    pub fn identity_eq(&self, other: &Session) -> bool {
        self.user.id == other.user.id && self.valid == other.valid
    }
}

// =============================================================================
// PROFILE
// =============================================================================

/// Application profile row keyed by user id.
///
/// Absence is a valid terminal state: newly registered users have no profile
/// row until provisioning completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Equals the owning user's id.
    pub id: Uuid,
    pub full_name: String,
    pub role: Role,
    pub email: String,
}

// =============================================================================
// AUTH STATE
// =============================================================================

/// The consumer-visible snapshot of authentication state.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub user: Option<User>,
    pub profile: Option<ProfileRecord>,
    /// True only while the initial session query or a profile fetch for the
    /// current epoch is outstanding.
    pub loading: bool,
}

impl AuthState {
    /// State before any resolution has arrived: nothing known, loading.
    #[must_use]
    pub fn initial() -> Self {
        Self { session: None, user: None, profile: None, loading: true }
    }

    /// Fully resolved signed-out state.
    #[must_use]
    pub fn signed_out() -> Self {
        Self { session: None, user: None, profile: None, loading: false }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self.profile.as_ref().map(|p| p.role), Some(Role::Admin))
    }

    #[must_use]
    pub fn is_student(&self) -> bool {
        matches!(self.profile.as_ref().map(|p| p.role), Some(Role::Student))
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use rand::Rng;
    use std::fmt::Write;

    /// Random 32-byte hex access token.
    #[must_use]
    pub fn test_token() -> String {
        let bytes: [u8; 32] = rand::rng().random();
        let mut s = String::with_capacity(64);
        for b in bytes {
            let _ = write!(s, "{b:02x}");
        }
        s
    }

    #[must_use]
    pub fn test_user(email: &str) -> User {
        User { id: Uuid::new_v4(), email: email.to_owned(), name: None }
    }

    #[must_use]
    pub fn test_session(user: &User) -> Session {
        Session {
            user: user.clone(),
            access_token: test_token(),
            issued_at: OffsetDateTime::now_utc(),
            expires_at: None,
            valid: true,
        }
    }

    #[must_use]
    pub fn test_profile(user: &User, role: Role) -> ProfileRecord {
        ProfileRecord {
            id: user.id,
            full_name: format!("Test {}", user.email),
            role,
            email: user.email.clone(),
        }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
