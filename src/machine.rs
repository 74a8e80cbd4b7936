//! Authentication state machine — the single owner of the auth snapshot.
//!
//! ARCHITECTURE
//! ============
//! The one-shot session query, the push event stream, and settled profile
//! fetches all funnel into one reconciliation entry point. Session identity
//! changes bump a monotonic epoch; profile results are accepted only while
//! their epoch is still current, so overlapping fetches can never attribute
//! a profile to the wrong user. All transitions happen under one mutex that
//! is never held across an await, and are published atomically through a
//! watch channel.
//!
//! TRADE-OFFS
//! ==========
//! Sign-out clears local state and bumps the epoch *before* awaiting backend
//! confirmation. The UI can momentarily disagree with the backend, but local
//! state is authoritative for rendering and the ordering is race-free: any
//! fetch still in flight is invalidated no matter how slow the backend is.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::coordinator::{ProfileFetchCoordinator, ProfileSink};
use crate::source::{AuthError, Credentials, ProfileSeed, ProfileStore, SessionSource};
use crate::state::{AuthState, ProfileRecord, Session, User};

// =============================================================================
// RESOLVE ORIGIN
// =============================================================================

/// Which path delivered a session resolution. Only used for tracing; the
/// reconciliation logic is identical for all origins (no source priority).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResolveOrigin {
    Initial,
    Push,
    Action,
}

impl ResolveOrigin {
    fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Push => "push",
            Self::Action => "action",
        }
    }
}

// =============================================================================
// SHARED CORE
// =============================================================================

struct Inner {
    /// Monotonic session-identity counter. Bumped once per accepted
    /// identity change; in-flight fetches tagged with an older value are
    /// discarded on delivery.
    epoch: u64,
    started: bool,
    /// Set on the first resolution from any origin; gates the startup timer.
    resolved_once: bool,
    startup_timer: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

struct Shared {
    state_tx: watch::Sender<AuthState>,
    inner: Mutex<Inner>,
    source: Arc<dyn SessionSource>,
    store: Arc<dyn ProfileStore>,
    coordinator: ProfileFetchCoordinator,
    config: SyncConfig,
}

impl Shared {
    /// Reconciliation entry point for every session resolution.
    fn apply_session(&self, incoming: Option<Session>, origin: ResolveOrigin) {
        let mut inner = self.inner.lock().unwrap();
        inner.resolved_once = true;
        if let Some(timer) = inner.startup_timer.take() {
            timer.abort();
        }

        let current = self.state_tx.borrow().session.clone();

        // Same identity: absorb as a token refresh. The session reference
        // updates but the epoch, profile, and loading flag are untouched.
        let is_refresh =
            matches!((&current, &incoming), (Some(cur), Some(new)) if cur.identity_eq(new));
        if is_refresh {
            debug!(origin = origin.as_str(), "session refresh absorbed");
            self.state_tx.send_modify(|state| state.session = incoming);
            return;
        }

        // Signed out while already signed out: only make sure loading clears
        // (this is how the initial "no session" answer resolves).
        if current.is_none() && incoming.is_none() {
            debug!(origin = origin.as_str(), "signed-out state confirmed");
            self.state_tx.send_modify(|state| state.loading = false);
            return;
        }

        inner.epoch += 1;
        let epoch = inner.epoch;
        let user = incoming.as_ref().map(|s| s.user.clone());
        let user_id = user.as_ref().map(|u| u.id);

        self.state_tx.send_modify(|state| {
            state.session = incoming;
            state.user = user;
            state.profile = None;
            state.loading = user_id.is_some();
        });

        if let Some(user_id) = user_id {
            info!(%user_id, epoch, origin = origin.as_str(), "session established; fetching profile");
            self.coordinator.request(user_id, epoch);
        } else {
            info!(epoch, origin = origin.as_str(), "signed out");
            self.coordinator.cancel();
        }
    }

    /// Accept a settled profile fetch iff its epoch is still current.
    fn apply_profile(&self, epoch: u64, outcome: Option<ProfileRecord>) {
        let inner = self.inner.lock().unwrap();
        if epoch != inner.epoch {
            debug!(epoch, current_epoch = inner.epoch, "stale profile result discarded");
            return;
        }
        let found = outcome.is_some();
        self.state_tx.send_modify(|state| {
            state.profile = outcome;
            state.loading = false;
        });
        debug!(epoch, found, "profile resolved");
    }

    /// Startup timer body: fail open to signed-out if nothing resolved.
    fn force_signed_out_on_timeout(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.resolved_once {
            return;
        }
        inner.resolved_once = true;
        warn!(
            timeout = ?self.config.startup_timeout,
            "session query unresolved; failing open to signed out"
        );
        self.state_tx.send_modify(|state| *state = AuthState::signed_out());
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        for task in inner.tasks.drain(..) {
            task.abort();
        }
        if let Some(timer) = inner.startup_timer.take() {
            timer.abort();
        }
    }
}

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Reconciles session resolutions and profile fetches into one observable
/// [`AuthState`]. Cheap to clone; clones share the same core.
#[derive(Clone)]
pub struct AuthStateMachine {
    shared: Arc<Shared>,
}

impl AuthStateMachine {
    #[must_use]
    pub fn new(
        source: Arc<dyn SessionSource>,
        store: Arc<dyn ProfileStore>,
        config: SyncConfig,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let sink: ProfileSink = {
                let weak = weak.clone();
                Arc::new(move |epoch, outcome| {
                    if let Some(shared) = weak.upgrade() {
                        shared.apply_profile(epoch, outcome);
                    }
                })
            };
            let (state_tx, _) = watch::channel(AuthState::initial());
            Shared {
                state_tx,
                inner: Mutex::new(Inner {
                    epoch: 0,
                    started: false,
                    resolved_once: false,
                    startup_timer: None,
                    tasks: Vec::new(),
                }),
                coordinator: ProfileFetchCoordinator::new(
                    Arc::clone(&store),
                    config.fetch_timeout,
                    sink,
                ),
                source,
                store,
                config,
            }
        });
        Self { shared }
    }

    /// Begin synchronizing: issue the one-shot session query, register the
    /// push subscription, and arm the startup liveness timer.
    ///
    /// Idempotent — a second call is a no-op, so multiple consumers may
    /// attach without re-running initialization. Must be called within a
    /// tokio runtime.
    pub fn start(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().unwrap();
        if inner.started {
            return;
        }
        inner.started = true;

        // Push subscription. Exits when the source closes the stream or the
        // machine is dropped.
        let mut events = shared.source.subscribe();
        let weak = Arc::downgrade(shared);
        inner.tasks.push(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(shared) = weak.upgrade() else { break };
                debug!(kind = ?event.kind, "session event received");
                shared.apply_session(event.session, ResolveOrigin::Push);
            }
        }));

        // One-shot session query. A transport error reads as "no session".
        let source = Arc::clone(&shared.source);
        let weak = Arc::downgrade(shared);
        inner.tasks.push(tokio::spawn(async move {
            let session = match source.current_session().await {
                Ok(session) => session,
                Err(error) => {
                    warn!(error = %error, "initial session query failed; treating as signed out");
                    None
                }
            };
            if let Some(shared) = weak.upgrade() {
                shared.apply_session(session, ResolveOrigin::Initial);
            }
        }));

        // Startup liveness timer, aborted on the first natural resolution.
        let weak = Arc::downgrade(shared);
        let startup_timeout = shared.config.startup_timeout;
        inner.startup_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(startup_timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.force_signed_out_on_timeout();
            }
        }));
    }

    /// Subscribe for state updates. The receiver's `borrow()` yields the
    /// current snapshot synchronously, so a late subscriber misses nothing.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.shared.state_tx.subscribe()
    }

    /// Instantaneous snapshot for non-subscribing readers.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.shared.state_tx.borrow().clone()
    }

    /// Authenticate with credentials and apply the resulting session.
    ///
    /// The session flows through the same reconciliation entry point as push
    /// events, so a duplicate `SignedIn` push from the backend is absorbed
    /// as a no-op refresh.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`AuthError`]; state is unchanged on failure.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let session = self.shared.source.sign_in(credentials).await?;
        self.shared.apply_session(Some(session.clone()), ResolveOrigin::Action);
        Ok(session)
    }

    /// Create an account and provision its profile row.
    ///
    /// Does not sign the new user in; the backend pushes a session event if
    /// it establishes one.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if account creation or profile provisioning
    /// fails; state is unchanged either way.
    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> Result<User, AuthError> {
        let user = self.shared.source.sign_up(credentials).await?;
        let record = ProfileRecord {
            id: user.id,
            full_name: seed.full_name.clone(),
            role: seed.role,
            email: user.email.clone(),
        };
        self.shared.store.insert_profile(&record).await?;
        info!(user_id = %user.id, role = ?seed.role, "account created and profile provisioned");
        Ok(user)
    }

    /// Sign out: clear local state and bump the epoch immediately, then
    /// notify the backend.
    ///
    /// Any profile fetch in flight is invalidated before the backend call is
    /// even issued, so backend latency cannot resurrect the old session.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`AuthError`] if confirmation fails; local
    /// state is already cleared and stays cleared.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.epoch += 1;
            inner.resolved_once = true;
            if let Some(timer) = inner.startup_timer.take() {
                timer.abort();
            }
            self.shared.coordinator.cancel();
            self.shared.state_tx.send_modify(|state| *state = AuthState::signed_out());
            info!(epoch = inner.epoch, "signed out locally; notifying backend");
        }
        self.shared.source.sign_out().await.inspect_err(|error| {
            warn!(error = %error, "backend sign-out failed; local session already cleared");
        })
    }

    /// Tear down background tasks and cancel outstanding work.
    pub fn dispose(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        for task in inner.tasks.drain(..) {
            task.abort();
        }
        if let Some(timer) = inner.startup_timer.take() {
            timer.abort();
        }
        self.shared.coordinator.cancel();
    }

    #[cfg(test)]
    pub(crate) fn current_epoch(&self) -> u64 {
        self.shared.inner.lock().unwrap().epoch
    }

    /// Test seam for injecting a profile result for an arbitrary epoch.
    #[cfg(test)]
    pub(crate) fn deliver_profile_result(&self, epoch: u64, outcome: Option<ProfileRecord>) {
        self.shared.apply_profile(epoch, outcome);
    }
}

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;
