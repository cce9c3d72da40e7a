//! Manager struct, lifecycle, and adapter wiring

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use switchboard_voip_core::{
    Call, CallEvent, CallId, EventSink, SessionId, VoipAdapter, VoipError, VoipResult,
};

use crate::config::EngineConfig;
use crate::events::EngineEvent;
use crate::registry::AdapterRegistry;
use crate::store::CallStore;

/// Broadcast channel capacity; slow subscribers lag rather than block
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Snapshot of the engine's operational state
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Whether the event consumer is running
    pub is_running: bool,
    /// Calls handled since the manager was created
    pub total_calls: usize,
    /// Calls currently in the active set
    pub active_calls: usize,
    /// Active calls that are answered or on hold
    pub connected_calls: usize,
    /// Calls in the terminated log
    pub terminated_calls: usize,
}

#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    pub total_calls: usize,
}

/// Orchestrator for call commands, adapter events, and the call store
///
/// Constructed once, wrapped in an `Arc`, and passed by reference to
/// whatever owns it. There is no global instance: lifecycle is explicit
/// (`new` → `start` → `stop`).
pub struct CallSessionManager {
    pub(crate) config: EngineConfig,
    pub(crate) registry: Arc<AdapterRegistry>,
    pub(crate) store: Arc<CallStore>,

    /// Canonical call id -> adapter-native session id
    pub(crate) session_mapping: DashMap<CallId, SessionId>,
    /// Adapter-native session id -> canonical call id
    pub(crate) call_mapping: DashMap<SessionId, CallId>,
    /// Per-call serialization slots; commands and events for the same call
    /// take this lock before reading-modifying-writing the record
    pub(crate) call_locks: DashMap<CallId, Arc<Mutex<()>>>,
    /// Setup watchdog tasks keyed by call id
    pub(crate) watchdogs: DashMap<CallId, JoinHandle<()>>,

    /// Broadcast channel for engine events
    pub(crate) event_tx: broadcast::Sender<EngineEvent>,
    /// Sender cloned into every adapter's event sink
    pub(crate) sink_tx: mpsc::UnboundedSender<CallEvent>,
    /// Receiver side; stays owned by the manager so the consumer task can
    /// be re-spawned across stop/start cycles
    pub(crate) sink_rx: Mutex<mpsc::UnboundedReceiver<CallEvent>>,

    pub(crate) is_running: Arc<RwLock<bool>>,
    pub(crate) counters: Arc<Mutex<EngineCounters>>,
    event_task: Mutex<Option<JoinHandle<()>>>,

    /// Self-reference so background tasks (event loop, watchdogs) can hold
    /// the manager without the caller threading an `Arc` through every call
    pub(crate) self_ref: Weak<CallSessionManager>,
}

impl CallSessionManager {
    /// Create a manager with the given configuration
    ///
    /// Fails fast on invalid configuration; this is the one place where a
    /// caller is expected to treat the error as fatal.
    pub fn new(config: EngineConfig) -> VoipResult<Arc<Self>> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(AdapterRegistry::new(config.default_adapter.clone()));

        Ok(Arc::new_cyclic(|self_ref| Self {
            config,
            registry,
            store: Arc::new(CallStore::new()),
            session_mapping: DashMap::new(),
            call_mapping: DashMap::new(),
            call_locks: DashMap::new(),
            watchdogs: DashMap::new(),
            event_tx,
            sink_tx,
            sink_rx: Mutex::new(sink_rx),
            is_running: Arc::new(RwLock::new(false)),
            counters: Arc::new(Mutex::new(EngineCounters::default())),
            event_task: Mutex::new(None),
            self_ref: self_ref.clone(),
        }))
    }

    /// Start the event consumer
    ///
    /// Idempotent: starting a running manager is a no-op.
    pub async fn start(&self) -> VoipResult<()> {
        let mut running = self.is_running.write().await;
        if *running {
            return Ok(());
        }

        let manager = self
            .self_ref
            .upgrade()
            .ok_or_else(|| VoipError::internal("manager dropped during start"))?;
        let handle = tokio::spawn(async move {
            manager.run_event_loop().await;
        });
        *self.event_task.lock().await = Some(handle);
        *running = true;
        info!("Call session manager started");
        Ok(())
    }

    /// Stop the event consumer and cancel all setup watchdogs
    ///
    /// Active calls stay in the store; adapters keep their backend links.
    /// Idempotent.
    pub async fn stop(&self) {
        let mut running = self.is_running.write().await;
        if !*running {
            return;
        }
        *running = false;

        if let Some(handle) = self.event_task.lock().await.take() {
            handle.abort();
        }
        let stale: Vec<CallId> = self.watchdogs.iter().map(|e| *e.key()).collect();
        for call_id in stale {
            if let Some((_, handle)) = self.watchdogs.remove(&call_id) {
                handle.abort();
            }
        }
        info!("Call session manager stopped");
    }

    /// Whether the event consumer is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    // ===== adapter wiring =====

    /// Register a telephony adapter and hand it an event sink
    ///
    /// The adapter starts not-ready; call [`connect_adapter`] to bring its
    /// backend link up.
    ///
    /// [`connect_adapter`]: CallSessionManager::connect_adapter
    pub async fn register_adapter(&self, adapter: Arc<dyn VoipAdapter>) -> VoipResult<()> {
        let sink = EventSink::new(adapter.system_name(), self.sink_tx.clone());
        adapter.register_event_sink(sink).await;
        self.registry.register(adapter).await
    }

    /// Remove an adapter registration
    pub async fn unregister_adapter(&self, system_name: &str) -> VoipResult<()> {
        self.registry.unregister(system_name).await
    }

    /// Connect an adapter's backend and mark it ready
    pub async fn connect_adapter(&self, system_name: &str) -> VoipResult<()> {
        self.registry.connect_adapter(system_name).await?;
        self.emit(EngineEvent::AdapterStatusChanged {
            system: system_name.to_string(),
            ready: true,
        });
        Ok(())
    }

    /// Disconnect an adapter's backend and revoke its readiness
    pub async fn disconnect_adapter(&self, system_name: &str) -> VoipResult<()> {
        self.registry.disconnect_adapter(system_name).await?;
        self.emit(EngineEvent::AdapterStatusChanged {
            system: system_name.to_string(),
            ready: false,
        });
        Ok(())
    }

    /// The adapter registry (selection policy, readiness queries)
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// The call store (snapshot subscriptions)
    pub fn store(&self) -> &Arc<CallStore> {
        &self.store
    }

    // ===== observation =====

    /// Subscribe to the engine's broadcast events
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe a listener to active-set snapshots
    pub async fn subscribe_active_calls(
        &self,
        listener: Arc<dyn crate::store::ActiveCallsListener>,
    ) -> crate::store::SubscriptionId {
        self.store.subscribe_active_calls(listener).await
    }

    /// Subscribe a listener to call-log snapshots
    pub async fn subscribe_call_log(
        &self,
        listener: Arc<dyn crate::store::CallLogListener>,
    ) -> crate::store::SubscriptionId {
        self.store.subscribe_call_log(listener).await
    }

    /// Drop a snapshot subscription
    pub async fn unsubscribe(&self, id: crate::store::SubscriptionId) {
        self.store.unsubscribe(id).await
    }

    /// Get a call record from either the active set or the log
    pub async fn get_call(&self, call_id: CallId) -> VoipResult<Call> {
        self.store
            .get(call_id)
            .await
            .ok_or(VoipError::CallNotFound { call_id })
    }

    /// Snapshot of the active calls, oldest first
    pub async fn active_calls(&self) -> Vec<Call> {
        self.store.active_calls().await
    }

    /// Snapshot of the terminated log, most recent first
    pub async fn call_log(&self) -> Vec<Call> {
        self.store.call_log().await
    }

    /// Operational statistics
    pub async fn get_stats(&self) -> EngineStats {
        let connected = self
            .store
            .active_calls()
            .await
            .iter()
            .filter(|c| c.status.is_connected())
            .count();
        EngineStats {
            is_running: self.is_running().await,
            total_calls: self.counters.lock().await.total_calls,
            active_calls: self.store.active_count().await,
            connected_calls: connected,
            terminated_calls: self.store.log_count().await,
        }
    }

    // ===== internal helpers =====

    /// Per-call serialization slot
    pub(crate) fn call_lock(&self, call_id: CallId) -> Arc<Mutex<()>> {
        self.call_locks
            .entry(call_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Publish an engine event; subscriber lag is not an error
    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Drop the per-call bookkeeping after a terminal transition
    pub(crate) fn forget_call(&self, call_id: CallId) {
        if let Some((_, session_id)) = self.session_mapping.remove(&call_id) {
            self.call_mapping.remove(&session_id);
        }
        self.call_locks.remove(&call_id);
        if let Some((_, handle)) = self.watchdogs.remove(&call_id) {
            handle.abort();
        }
    }
}
