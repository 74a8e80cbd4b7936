//! Profile fetch coordination — one in-flight lookup, stale work aborted.
//!
//! DESIGN
//! ======
//! Every session-identity change asks for a fresh profile fetch tagged with
//! the epoch current at issue time. Issuing a request aborts the previous
//! one, dropping its in-flight future; the abort is an optimization, since
//! the state machine discards any delivery whose epoch no longer matches.
//!
//! ERROR HANDLING
//! ==============
//! A missing row is a normal outcome, not a failure: newly registered users
//! have no profile yet. Store errors and the fallback timeout both settle
//! the request to "no profile" so `loading` always clears; failures are
//! reported through tracing and never retried here.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::source::ProfileStore;
use crate::state::ProfileRecord;

/// Callback receiving `(epoch, outcome)` exactly once per settled request.
pub type ProfileSink = Arc<dyn Fn(u64, Option<ProfileRecord>) + Send + Sync>;

/// Issues profile fetches and guarantees at most one is in flight.
pub struct ProfileFetchCoordinator {
    store: Arc<dyn ProfileStore>,
    fetch_timeout: Duration,
    sink: ProfileSink,
    inflight: Mutex<Option<JoinHandle<()>>>,
}

impl ProfileFetchCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn ProfileStore>, fetch_timeout: Duration, sink: ProfileSink) -> Self {
        Self { store, fetch_timeout, sink, inflight: Mutex::new(None) }
    }

    /// Fetch the profile for `user_id`, superseding any outstanding request.
    ///
    /// The settled outcome is delivered to the sink tagged with `epoch`;
    /// an aborted request delivers nothing.
    pub fn request(&self, user_id: Uuid, epoch: u64) {
        let mut slot = self.inflight.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);
        let fetch_timeout = self.fetch_timeout;

        *slot = Some(tokio::spawn(async move {
            let outcome = match tokio::time::timeout(fetch_timeout, store.fetch_profile(user_id)).await {
                Ok(Ok(Some(profile))) => Some(profile),
                Ok(Ok(None)) => {
                    debug!(%user_id, "no profile row yet");
                    None
                }
                Ok(Err(error)) => {
                    warn!(%user_id, error = %error, "profile fetch failed");
                    None
                }
                Err(_) => {
                    warn!(%user_id, timeout = ?fetch_timeout, "profile fetch timed out");
                    None
                }
            };
            sink(epoch, outcome);
        }));
    }

    /// Abort the outstanding request, if any. Nothing is delivered for it.
    pub fn cancel(&self) {
        if let Some(previous) = self.inflight.lock().unwrap().take() {
            previous.abort();
        }
    }
}

impl Drop for ProfileFetchCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
