//! Adapter registry
//!
//! Tracks the telephony backends registered with the engine, their
//! readiness, and the selection policy for outbound calls. Registration
//! order is preserved because it is the selection tiebreak when no
//! preference is given and no default is configured.
//!
//! Readiness is adapter-reported: an adapter becomes ready after a
//! successful `connect()` and may be marked not-ready again when it loses
//! its backend link, without losing its registration. Reconnection policy
//! (retry cadence, backoff) belongs to the adapter itself; the registry
//! only records the flips.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use switchboard_voip_core::{VoipAdapter, VoipError, VoipResult};

/// One registered telephony backend
#[derive(Clone)]
pub struct AdapterRegistration {
    /// Unique system name (registry key)
    pub system_name: String,
    /// Whether the adapter currently has a usable backend link
    pub ready: bool,
    /// When the adapter was registered
    pub registered_at: DateTime<Utc>,
    /// The adapter instance
    pub adapter: Arc<dyn VoipAdapter>,
}

impl std::fmt::Debug for AdapterRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistration")
            .field("system_name", &self.system_name)
            .field("ready", &self.ready)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Registry of pluggable telephony backends
pub struct AdapterRegistry {
    /// Registrations in registration order
    registrations: RwLock<Vec<AdapterRegistration>>,
    /// Default system for outbound selection when no preference is given
    default_system: Option<String>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new(default_system: Option<String>) -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            default_system,
        }
    }

    /// Register an adapter; it starts not-ready
    ///
    /// Fails if an adapter with the same system name is already registered.
    pub async fn register(&self, adapter: Arc<dyn VoipAdapter>) -> VoipResult<()> {
        let system_name = adapter.system_name().to_string();
        let mut registrations = self.registrations.write().await;
        if registrations.iter().any(|r| r.system_name == system_name) {
            return Err(VoipError::internal(format!(
                "adapter '{}' is already registered",
                system_name
            )));
        }
        registrations.push(AdapterRegistration {
            system_name: system_name.clone(),
            ready: false,
            registered_at: Utc::now(),
            adapter,
        });
        info!("Registered telephony adapter '{}'", system_name);
        Ok(())
    }

    /// Remove an adapter's registration entirely
    pub async fn unregister(&self, system_name: &str) -> VoipResult<()> {
        let mut registrations = self.registrations.write().await;
        let before = registrations.len();
        registrations.retain(|r| r.system_name != system_name);
        if registrations.len() == before {
            return Err(VoipError::adapter_unavailable(format!(
                "adapter '{}' is not registered",
                system_name
            )));
        }
        info!("Unregistered telephony adapter '{}'", system_name);
        Ok(())
    }

    /// Record an adapter-reported readiness flip
    ///
    /// Marking an adapter not-ready keeps its registration so calls it
    /// already owns can still be commanded once it reconnects.
    pub async fn set_ready(&self, system_name: &str, ready: bool) -> VoipResult<()> {
        let mut registrations = self.registrations.write().await;
        match registrations.iter_mut().find(|r| r.system_name == system_name) {
            Some(registration) => {
                if registration.ready != ready {
                    info!(
                        "Adapter '{}' is now {}",
                        system_name,
                        if ready { "ready" } else { "not ready" }
                    );
                }
                registration.ready = ready;
                Ok(())
            }
            None => Err(VoipError::adapter_unavailable(format!(
                "adapter '{}' is not registered",
                system_name
            ))),
        }
    }

    /// Connect an adapter and mark it ready on success
    pub async fn connect_adapter(&self, system_name: &str) -> VoipResult<()> {
        let adapter = self.get(system_name).await?;
        if let Err(err) = adapter.connect().await {
            warn!("Adapter '{}' failed to connect: {}", system_name, err);
            return Err(err.into());
        }
        self.set_ready(system_name, true).await
    }

    /// Disconnect an adapter and mark it not-ready
    pub async fn disconnect_adapter(&self, system_name: &str) -> VoipResult<()> {
        let adapter = self.get(system_name).await?;
        // Mark not-ready first so no new outbound call races onto a link
        // that is going away.
        self.set_ready(system_name, false).await?;
        adapter.disconnect().await.map_err(VoipError::from)
    }

    /// Look up a registered adapter by system name, ready or not
    pub async fn get(&self, system_name: &str) -> VoipResult<Arc<dyn VoipAdapter>> {
        let registrations = self.registrations.read().await;
        registrations
            .iter()
            .find(|r| r.system_name == system_name)
            .map(|r| Arc::clone(&r.adapter))
            .ok_or_else(|| {
                VoipError::adapter_unavailable(format!("adapter '{}' is not registered", system_name))
            })
    }

    /// Select the adapter for a new outbound call
    ///
    /// Policy: the preferred system if registered and ready, else the
    /// configured default if ready, else the first ready adapter in
    /// registration order.
    pub async fn select_for_outbound(
        &self,
        preferred: Option<&str>,
    ) -> VoipResult<Arc<dyn VoipAdapter>> {
        let registrations = self.registrations.read().await;

        let pick = |name: &str| {
            registrations
                .iter()
                .find(|r| r.system_name == name && r.ready)
                .map(|r| Arc::clone(&r.adapter))
        };

        if let Some(name) = preferred {
            if let Some(adapter) = pick(name) {
                return Ok(adapter);
            }
            // Preference for an unknown or unready system falls through to
            // the default policy rather than failing the call outright.
            warn!("Preferred adapter '{}' not ready, falling back", name);
        }

        if let Some(name) = &self.default_system {
            if let Some(adapter) = pick(name) {
                return Ok(adapter);
            }
        }

        registrations
            .iter()
            .find(|r| r.ready)
            .map(|r| Arc::clone(&r.adapter))
            .ok_or_else(|| VoipError::adapter_unavailable("no ready telephony adapter"))
    }

    /// System names in registration order
    pub async fn registered_systems(&self) -> Vec<String> {
        self.registrations
            .read()
            .await
            .iter()
            .map(|r| r.system_name.clone())
            .collect()
    }

    /// Number of adapters currently ready
    pub async fn ready_count(&self) -> usize {
        self.registrations.read().await.iter().filter(|r| r.ready).count()
    }

    /// Whether a given system is registered and ready
    pub async fn is_ready(&self, system_name: &str) -> bool {
        self.registrations
            .read()
            .await
            .iter()
            .any(|r| r.system_name == system_name && r.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockVoipAdapter;

    fn mock(name: &str) -> Arc<dyn VoipAdapter> {
        Arc::new(MockVoipAdapter::builder(name).build())
    }

    #[tokio::test]
    async fn registration_is_unique_by_system_name() {
        let registry = AdapterRegistry::new(None);
        registry.register(mock("pbx")).await.unwrap();
        assert!(registry.register(mock("pbx")).await.is_err());
    }

    #[tokio::test]
    async fn selection_requires_a_ready_adapter() {
        let registry = AdapterRegistry::new(None);
        registry.register(mock("pbx")).await.unwrap();

        // Registered but never connected: nothing to select.
        let err = registry.select_for_outbound(None).await.err().unwrap();
        assert!(matches!(err, VoipError::AdapterUnavailable { .. }));

        registry.connect_adapter("pbx").await.unwrap();
        let adapter = registry.select_for_outbound(None).await.unwrap();
        assert_eq!(adapter.system_name(), "pbx");
    }

    #[tokio::test]
    async fn selection_prefers_requested_then_default_then_order() {
        let registry = AdapterRegistry::new(Some("cloud".to_string()));
        for name in ["pbx", "cloud", "backup"] {
            registry.register(mock(name)).await.unwrap();
            registry.connect_adapter(name).await.unwrap();
        }

        let picked = registry.select_for_outbound(Some("backup")).await.unwrap();
        assert_eq!(picked.system_name(), "backup");

        let picked = registry.select_for_outbound(None).await.unwrap();
        assert_eq!(picked.system_name(), "cloud");

        registry.set_ready("cloud", false).await.unwrap();
        let picked = registry.select_for_outbound(None).await.unwrap();
        assert_eq!(picked.system_name(), "pbx");
    }

    #[tokio::test]
    async fn unready_preference_falls_back() {
        let registry = AdapterRegistry::new(None);
        registry.register(mock("pbx")).await.unwrap();
        registry.connect_adapter("pbx").await.unwrap();

        let picked = registry.select_for_outbound(Some("missing")).await.unwrap();
        assert_eq!(picked.system_name(), "pbx");
    }

    #[tokio::test]
    async fn disconnect_revokes_readiness_but_keeps_registration() {
        let registry = AdapterRegistry::new(None);
        registry.register(mock("pbx")).await.unwrap();
        registry.connect_adapter("pbx").await.unwrap();
        assert_eq!(registry.ready_count().await, 1);

        registry.disconnect_adapter("pbx").await.unwrap();
        assert_eq!(registry.ready_count().await, 0);
        assert!(registry.get("pbx").await.is_ok());
    }
}
