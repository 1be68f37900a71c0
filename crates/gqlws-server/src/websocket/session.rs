//! Per-connection protocol state: the init flag and the live operation map.
//!
//! The dispatcher inserts entries, runners remove their own entry when they
//! finish, and teardown drains everything. Every handle's token is a child of
//! the session token, so cancelling the session reaches every operation even
//! if a runner is between removing its entry and exiting. A handle's `exited`
//! token fires once its runner has queued its last packet.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::gauge;
use tokio_util::sync::CancellationToken;

use crate::metrics::SUBSCRIPTIONS_ACTIVE;

/// Cancellable reference to one running operation.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    /// Client-chosen operation ID.
    pub id: String,
    /// Distinguishes successive operations that reuse the same ID.
    pub generation: u64,
    /// Cancelled when the operation must stop.
    pub token: CancellationToken,
    /// Cancelled when the runner task has exited.
    pub exited: CancellationToken,
}

impl SubscriptionHandle {
    /// Request cancellation. Idempotent and non-blocking.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Per-connection session state.
pub struct Session {
    initialized: AtomicBool,
    subscriptions: DashMap<String, SubscriptionHandle>,
    token: CancellationToken,
    next_generation: AtomicU64,
}

impl Session {
    /// Create an uninitialised session with no operations.
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            subscriptions: DashMap::new(),
            token: CancellationToken::new(),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Flip `initialized` from false to true.
    ///
    /// Returns `false` if the session was already initialised.
    pub fn try_initialize(&self) -> bool {
        self.initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether `connection_init` has been accepted.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Insert a handle for `id` unless one is already live.
    ///
    /// Returns `None` if `id` is live or the session has been torn down.
    pub fn register_subscription(&self, id: &str) -> Option<SubscriptionHandle> {
        if self.is_closed() {
            return None;
        }
        match self.subscriptions.entry(id.to_owned()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let handle = SubscriptionHandle {
                    id: id.to_owned(),
                    generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
                    token: self.token.child_token(),
                    exited: CancellationToken::new(),
                };
                let _ = slot.insert(handle.clone());
                gauge!(SUBSCRIPTIONS_ACTIVE).increment(1.0);
                Some(handle)
            }
        }
    }

    /// Cancel and remove `id`. A no-op when `id` is not live.
    ///
    /// Returns whether an operation was cancelled.
    pub fn cancel(&self, id: &str) -> bool {
        match self.subscriptions.remove(id) {
            Some((_, handle)) => {
                handle.cancel();
                gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
                true
            }
            None => false,
        }
    }

    /// Remove `id` if it still belongs to `generation`.
    ///
    /// Called by a runner on its way out; a newer operation that reused the
    /// ID is left alone.
    pub fn complete(&self, id: &str, generation: u64) -> bool {
        let removed = self
            .subscriptions
            .remove_if(id, |_, handle| handle.generation == generation)
            .is_some();
        if removed {
            gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
        }
        removed
    }

    /// Cancel every live operation and refuse new ones.
    ///
    /// Returns the number of operations that were live.
    pub fn cancel_all(&self) -> usize {
        self.token.cancel();
        let ids: Vec<String> = self.subscriptions.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Whether `id` is live.
    pub fn is_live(&self, id: &str) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Number of live operations.
    pub fn live_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
