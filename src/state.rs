use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use crate::domain::InterceptorState;
use crate::error::InterceptorError;

/// Holds the current Proxying/Caching state and gates callers on transitions
/// out of Caching.
///
/// The gate is a `Notify` that gets *replaced*, not reset, on every
/// transition into Caching. Replacing it means a waiter that already holds a
/// clone of the old `Notify` from before the most recent Caching entry can
/// never be spuriously woken by a notification meant for a later entry.
pub struct StateController {
    state: RwLock<InterceptorState>,
    gate: RwLock<Arc<Notify>>,
    shutdown: Arc<Notify>,
}

impl StateController {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(InterceptorState::default()),
            gate: RwLock::new(Arc::new(Notify::new())),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Builds a controller whose barrier waits are also cancelled by the
    /// given shutdown signal, so in-flight requests blocked on `Caching`
    /// don't outlive process shutdown.
    pub fn with_shutdown(shutdown: Arc<Notify>) -> Self {
        Self {
            state: RwLock::new(InterceptorState::default()),
            gate: RwLock::new(Arc::new(Notify::new())),
            shutdown,
        }
    }

    pub async fn current(&self) -> InterceptorState {
        *self.state.read().await
    }

    /// Transition to `new_state`. Transitioning into Caching from Proxying
    /// installs a fresh gate; any other transition (including Caching ->
    /// Caching or Proxying -> Proxying) is a no-op beyond recording the
    /// state, and on Caching -> Proxying the current gate is released so
    /// every caller blocked in `wait_if_caching` wakes up.
    pub async fn transition(&self, new_state: InterceptorState) {
        let mut state = self.state.write().await;
        let previous = *state;
        *state = new_state;

        match (previous, new_state) {
            (InterceptorState::Proxying, InterceptorState::Caching) => {
                let mut gate = self.gate.write().await;
                *gate = Arc::new(Notify::new());
            }
            (InterceptorState::Caching, InterceptorState::Proxying) => {
                let gate = self.gate.read().await;
                gate.notify_waiters();
            }
            _ => {}
        }
    }

    /// Blocks until the state is Proxying, if it is currently Caching.
    /// Returns immediately if already Proxying. Returns `Cancelled` if
    /// process shutdown is signalled while still waiting.
    pub async fn wait_if_caching(&self) -> Result<(), InterceptorError> {
        loop {
            if self.current().await == InterceptorState::Proxying {
                return Ok(());
            }
            let gate = self.gate.read().await.clone();
            // Re-check after acquiring the clone: a transition to Proxying
            // between the check above and this clone would otherwise be
            // missed, since `notify_waiters` only wakes current waiters.
            if self.current().await == InterceptorState::Proxying {
                return Ok(());
            }
            tokio::select! {
                _ = gate.notified() => {}
                _ = self.shutdown.notified() => {
                    return Err(InterceptorError::Cancelled);
                }
            }
        }
    }
}

impl Default for StateController {
    fn default() -> Self {
        Self::new()
    }
}
