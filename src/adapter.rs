//! Consumer adapter — lifecycle glue between the state machine and
//! rendering or route-guard code.
//!
//! DESIGN
//! ======
//! One `AuthHandle` is constructed per process and cloned into whatever
//! needs it. `attach` starts the machine (guarded; a second attach never
//! re-runs initialization) and hands back a watch receiver; dropping the
//! receiver is the detach. `wait_ready` is the bounded wait used by route
//! guards: block at most `max_wait` for `loading` to clear, then proceed
//! with whatever state is current. It composes with the machine's own
//! startup timer — the tighter of the two bounds governs what a caller
//! observes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::SyncConfig;
use crate::machine::AuthStateMachine;
use crate::source::{AuthError, Credentials, ProfileSeed, ProfileStore, SessionSource};
use crate::state::{AuthState, Session, User};

/// Process-wide handle over the auth state machine. Cheap to clone.
#[derive(Clone)]
pub struct AuthHandle {
    machine: AuthStateMachine,
}

impl AuthHandle {
    #[must_use]
    pub fn new(
        source: Arc<dyn SessionSource>,
        store: Arc<dyn ProfileStore>,
        config: SyncConfig,
    ) -> Self {
        Self { machine: AuthStateMachine::new(source, store, config) }
    }

    /// Start synchronizing (idempotent) and subscribe for updates.
    ///
    /// The returned receiver's `borrow()` is always the current snapshot;
    /// dropping it detaches this consumer without affecting others.
    #[must_use]
    pub fn attach(&self) -> watch::Receiver<AuthState> {
        self.machine.start();
        self.machine.subscribe()
    }

    /// Instantaneous snapshot without subscribing.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.machine.snapshot()
    }

    /// Wait at most `max_wait` for `loading` to clear, then return whatever
    /// state is current — possibly still loading if the bound elapsed.
    ///
    /// Never blocks indefinitely: the machine's startup timer guarantees
    /// `loading` resolves on its own schedule, and this bound caps the wait
    /// independently.
    pub async fn wait_ready(&self, max_wait: Duration) -> AuthState {
        let mut rx = self.machine.subscribe();
        if !rx.borrow().loading {
            return rx.borrow().clone();
        }
        let waited = tokio::time::timeout(max_wait, rx.wait_for(|state| !state.loading))
            .await
            .map(|result| result.map(|state| state.clone()));
        match waited {
            Ok(Ok(state)) => state,
            // Timed out, or the machine was dropped: proceed with what we have.
            _ => rx.borrow().clone(),
        }
    }

    /// See [`AuthStateMachine::sign_in`].
    ///
    /// # Errors
    ///
    /// Returns the backend's [`AuthError`]; state is unchanged on failure.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.machine.sign_in(credentials).await
    }

    /// See [`AuthStateMachine::sign_up`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if account creation or provisioning fails.
    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> Result<User, AuthError> {
        self.machine.sign_up(credentials, seed).await
    }

    /// See [`AuthStateMachine::sign_out`].
    ///
    /// # Errors
    ///
    /// Returns the backend's [`AuthError`]; local state clears regardless.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.machine.sign_out().await
    }

    /// Tear down background work. Further snapshots remain readable.
    pub fn dispose(&self) {
        self.machine.dispose();
    }
}

#[cfg(test)]
#[path = "adapter_test.rs"]
mod tests;
