//! In-process registrar and call router

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::endpoint::{EndpointCore, LoopbackEndpoint};
use crate::address::EndpointAddress;
use crate::agent::{AgentConfig, CaptureStreamManager, SignalingBackend, SignalingEndpoint};

/// Reason reported when the registration limit is reached
pub const REGISTRATION_LIMIT_REASON: &str = "Max registration limit hit";

#[derive(Debug, Default)]
pub(crate) struct NetworkInner {
    registrar: Mutex<HashMap<EndpointAddress, Arc<EndpointCore>>>,
    max_registrations: Option<usize>,
}

impl NetworkInner {
    /// Bind `core` to its address; the error string is the failure reason
    pub(crate) fn register(&self, core: &Arc<EndpointCore>) -> Result<(), String> {
        let mut registrar = self.registrar.lock();

        if let Some(existing) = registrar.get(&core.address) {
            if Arc::ptr_eq(existing, core) {
                return Ok(());
            }
            return Err(format!("{} is already registered", core.address));
        }
        if let Some(max) = self.max_registrations {
            if registrar.len() >= max {
                return Err(REGISTRATION_LIMIT_REASON.to_string());
            }
        }

        registrar.insert(core.address.clone(), core.clone());
        Ok(())
    }

    /// Remove the binding if it belongs to `core`
    pub(crate) fn unregister(&self, core: &Arc<EndpointCore>) -> bool {
        let mut registrar = self.registrar.lock();
        match registrar.get(&core.address) {
            Some(existing) if Arc::ptr_eq(existing, core) => {
                registrar.remove(&core.address);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn lookup(&self, address: &EndpointAddress) -> Option<Arc<EndpointCore>> {
        self.registrar.lock().get(address).cloned()
    }
}

/// A signaling network that lives entirely inside the process.
///
/// Endpoints register into a shared registrar and invites are routed to
/// whoever is registered under the target address. Media endpoints without a
/// custom strategy share one simulated capture device.
///
/// # Examples
///
/// ```rust
/// use sipduet_core::address::EndpointAddress;
/// use sipduet_core::agent::{AgentFactory, EndpointEvent};
/// use sipduet_core::loopback::LoopbackNetwork;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let network = LoopbackNetwork::with_max_registrations(1);
/// let factory = AgentFactory::new(network.clone(), false);
///
/// let alice = factory.create_media_agent(&EndpointAddress::new("alice.t@example.com"), "Alice");
/// let bob = factory.create_media_agent(&EndpointAddress::new("bob.t@example.com"), "Bob");
///
/// let mut bob_events = bob.subscribe();
/// alice.register().await?;
/// bob.register().await?;
///
/// assert!(network.is_registered(alice.address()));
/// assert!(matches!(bob_events.recv().await?, EndpointEvent::RegistrationFailed { .. }));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
    capture: Arc<CaptureStreamManager>,
}

impl LoopbackNetwork {
    /// A network without a registration limit
    pub fn new() -> Self {
        Self::default()
    }

    /// A network that refuses registrations beyond `max`
    pub fn with_max_registrations(max: usize) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                registrar: Mutex::new(HashMap::new()),
                max_registrations: Some(max),
            }),
            capture: Arc::new(CaptureStreamManager::new()),
        }
    }

    pub fn max_registrations(&self) -> Option<usize> {
        self.inner.max_registrations
    }

    pub fn registered_count(&self) -> usize {
        self.inner.registrar.lock().len()
    }

    pub fn is_registered(&self, address: &EndpointAddress) -> bool {
        self.inner.registrar.lock().contains_key(address)
    }

    /// The simulated capture device shared by media endpoints
    pub fn capture_device(&self) -> &Arc<CaptureStreamManager> {
        &self.capture
    }
}

impl SignalingBackend for LoopbackNetwork {
    fn create_endpoint(&self, config: AgentConfig) -> Arc<dyn SignalingEndpoint> {
        Arc::new(LoopbackEndpoint::new(
            config,
            self.inner.clone(),
            self.capture.clone(),
        ))
    }
}
