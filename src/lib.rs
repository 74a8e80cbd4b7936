//! Client-side authentication session synchronizer.
//!
//! ARCHITECTURE
//! ============
//! Three independently-arriving sources of truth — a one-shot "what session
//! exists right now" query, a push stream of session-change events, and a
//! dependent profile lookup that must follow every session change — are
//! reconciled into a single consistent snapshot `{ session, user, profile,
//! loading }` that rendering and route-guard code observe through a
//! [`tokio::sync::watch`] channel.
//!
//! The identity backend and the profile store are injected behind the
//! [`SessionSource`] and [`ProfileStore`] traits; this crate owns only the
//! reconciliation logic. Every session-identity change bumps a monotonic
//! epoch, and a profile fetch result is accepted only if its epoch still
//! matches, so a slow fetch for a user who has since signed out (or switched
//! accounts) can never overwrite newer state.
//!
//! LIVENESS
//! ========
//! `loading` always resolves to `false`: the initial query is backstopped by
//! a startup timer that fails open to "signed out", profile fetches carry
//! their own fallback timeout, and the consumer adapter's bounded wait caps
//! how long a route guard can block. The tighter of the bounds governs.

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod machine;
pub mod source;
pub mod state;

pub use adapter::AuthHandle;
pub use config::SyncConfig;
pub use coordinator::ProfileFetchCoordinator;
pub use machine::AuthStateMachine;
pub use source::{
    AuthError, Credentials, ProfileSeed, ProfileStore, SessionEvent, SessionEventKind,
    SessionSource, StoreError,
};
pub use state::{AuthState, ProfileRecord, Role, Session, User};
