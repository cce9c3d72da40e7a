//! Call registry/store
//!
//! Holds the canonical set of in-progress calls and the terminated-call
//! log, plus the "selected call" pointer the CRM call bar tracks. All
//! business logic lives in the session manager; the store only maintains
//! the active/log partition invariant and notifies subscribers.
//!
//! A single `RwLock` guards the whole state so that the active→log move and
//! the selection invalidation that rides along with it are one logical
//! update: no reader can ever observe a call in both collections, in
//! neither, or a selection pointing at a logged call.
//!
//! Subscription is an explicit observer list. Listeners get the full
//! current snapshot of the collection they subscribed to after every
//! mutation of it, invoked after the state lock is released so a listener
//! can call back into the store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use switchboard_voip_core::{Call, CallId, VoipError, VoipResult};

/// Identifier handed out by `subscribe_*`, used to unsubscribe
pub type SubscriptionId = Uuid;

/// Observer of the active call set
pub trait ActiveCallsListener: Send + Sync {
    /// Called with the full active snapshot after every mutation of it
    fn on_active_calls(&self, calls: &[Call]);
}

/// Observer of the terminated-call log
pub trait CallLogListener: Send + Sync {
    /// Called with the full log snapshot (most recent first) after every
    /// append
    fn on_call_log(&self, calls: &[Call]);
}

/// Where a call id currently lives
#[derive(Debug, Clone)]
pub enum CallSlot {
    /// In the active set
    Active(Call),
    /// In the terminated log
    Logged(Call),
}

#[derive(Default)]
struct StoreState {
    active: HashMap<CallId, Call>,
    /// Most-recent-first
    log: Vec<Call>,
    selected_call: Option<CallId>,
}

/// Canonical storage for in-progress and terminated calls
pub struct CallStore {
    state: RwLock<StoreState>,
    active_listeners: RwLock<Vec<(SubscriptionId, Arc<dyn ActiveCallsListener>)>>,
    log_listeners: RwLock<Vec<(SubscriptionId, Arc<dyn CallLogListener>)>>,
}

impl CallStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            active_listeners: RwLock::new(Vec::new()),
            log_listeners: RwLock::new(Vec::new()),
        }
    }

    // ===== subscriptions =====

    /// Subscribe to active-set snapshots
    pub async fn subscribe_active_calls(&self, listener: Arc<dyn ActiveCallsListener>) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.active_listeners.write().await.push((id, listener));
        id
    }

    /// Subscribe to call-log snapshots
    pub async fn subscribe_call_log(&self, listener: Arc<dyn CallLogListener>) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.log_listeners.write().await.push((id, listener));
        id
    }

    /// Drop a subscription created by either `subscribe_*` method
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.active_listeners.write().await.retain(|(sid, _)| *sid != id);
        self.log_listeners.write().await.retain(|(sid, _)| *sid != id);
    }

    // ===== mutation (manager-only by convention) =====

    /// Insert a freshly created call into the active set
    pub async fn insert_active(&self, call: Call) -> VoipResult<()> {
        {
            let mut state = self.state.write().await;
            if state.active.contains_key(&call.id) || state.log.iter().any(|c| c.id == call.id) {
                return Err(VoipError::internal(format!("call {} already exists", call.id)));
            }
            state.active.insert(call.id, call);
        }
        self.notify_active().await;
        Ok(())
    }

    /// Mutate an active call in place and publish the new snapshot
    ///
    /// Returns the updated record. Fails with `CallNotFound` if the id is
    /// not in the active set (terminated calls are immutable).
    pub async fn update_active<F>(&self, call_id: CallId, mutate: F) -> VoipResult<Call>
    where
        F: FnOnce(&mut Call),
    {
        let updated = {
            let mut state = self.state.write().await;
            let call = state
                .active
                .get_mut(&call_id)
                .ok_or(VoipError::CallNotFound { call_id })?;
            mutate(call);
            call.clone()
        };
        self.notify_active().await;
        Ok(updated)
    }

    /// Move a terminated call from the active set to the log
    ///
    /// One logical update: removes from active, prepends to the log, and
    /// clears the selection pointer if it referenced this call. Returns
    /// whether the selection was cleared.
    pub async fn complete(&self, call: Call) -> VoipResult<bool> {
        let selection_cleared = {
            let mut state = self.state.write().await;
            if state.active.remove(&call.id).is_none() {
                return Err(VoipError::CallNotFound { call_id: call.id });
            }
            let cleared = state.selected_call == Some(call.id);
            if cleared {
                state.selected_call = None;
            }
            state.log.insert(0, call);
            cleared
        };
        self.notify_active().await;
        self.notify_log().await;
        Ok(selection_cleared)
    }

    /// Set or clear the selected call
    ///
    /// A non-null selection must reference an id currently in the active
    /// set.
    pub async fn set_selected_call(&self, call_id: Option<CallId>) -> VoipResult<()> {
        let mut state = self.state.write().await;
        if let Some(id) = call_id {
            if !state.active.contains_key(&id) {
                return Err(VoipError::CallNotFound { call_id: id });
            }
        }
        state.selected_call = call_id;
        debug!("Selected call is now {:?}", call_id);
        Ok(())
    }

    // ===== queries =====

    /// Currently selected call id, if any
    pub async fn selected_call(&self) -> Option<CallId> {
        self.state.read().await.selected_call
    }

    /// Find a call wherever it lives
    pub async fn locate(&self, call_id: CallId) -> Option<CallSlot> {
        let state = self.state.read().await;
        if let Some(call) = state.active.get(&call_id) {
            return Some(CallSlot::Active(call.clone()));
        }
        state
            .log
            .iter()
            .find(|c| c.id == call_id)
            .map(|c| CallSlot::Logged(c.clone()))
    }

    /// Get a call record from either collection
    pub async fn get(&self, call_id: CallId) -> Option<Call> {
        match self.locate(call_id).await {
            Some(CallSlot::Active(call)) | Some(CallSlot::Logged(call)) => Some(call),
            None => None,
        }
    }

    /// Snapshot of the active set, oldest call first
    pub async fn active_calls(&self) -> Vec<Call> {
        let state = self.state.read().await;
        let mut calls: Vec<Call> = state.active.values().cloned().collect();
        calls.sort_by_key(|c| c.start_time);
        calls
    }

    /// Snapshot of the terminated log, most recent first
    pub async fn call_log(&self) -> Vec<Call> {
        self.state.read().await.log.clone()
    }

    /// Number of calls in the active set
    pub async fn active_count(&self) -> usize {
        self.state.read().await.active.len()
    }

    /// Number of terminated calls in the log
    pub async fn log_count(&self) -> usize {
        self.state.read().await.log.len()
    }

    // ===== notification =====

    async fn notify_active(&self) {
        let snapshot = self.active_calls().await;
        let listeners: Vec<_> = self
            .active_listeners
            .read()
            .await
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_active_calls(&snapshot);
        }
    }

    async fn notify_log(&self) {
        let snapshot = self.call_log().await;
        let listeners: Vec<_> = self
            .log_listeners
            .read()
            .await
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_call_log(&snapshot);
        }
    }
}

impl Default for CallStore {
    fn default() -> Self {
        Self::new()
    }
}
