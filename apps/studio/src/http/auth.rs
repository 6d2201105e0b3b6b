use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Valid,
    /// A credential failure could not be recovered; the user must sign in again.
    Invalid,
}

/// Whether the current credential is presumed valid.
///
/// Created once at startup and injected into `ApiClient`. Starts valid and
/// flips to invalid on an unrecoverable credential failure; login restores it.
/// Each `ApiClient::send` call tracks its own single retry.
#[derive(Clone)]
pub struct AuthSession {
    state: Arc<watch::Sender<AuthState>>,
}

impl AuthSession {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::Valid);
        Self {
            state: Arc::new(tx),
        }
    }

    #[allow(dead_code)]
    pub fn is_valid(&self) -> bool {
        *self.state.borrow() == AuthState::Valid
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Marks the session invalid. Returns `true` only on the valid → invalid edge,
    /// so concurrent failures produce a single session-invalid signal.
    pub fn invalidate(&self) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == AuthState::Valid {
                *state = AuthState::Invalid;
                true
            } else {
                false
            }
        });
        if changed {
            warn!("Session invalidated; re-authentication required");
        }
        changed
    }

    pub fn reinitialize(&self) {
        if self.state.send_replace(AuthState::Valid) == AuthState::Invalid {
            info!("Session re-initialised after sign-in");
        }
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}
