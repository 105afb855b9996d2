//! Construction of media and data-only endpoints

use std::sync::Arc;

use tracing::debug;

use super::endpoint::{AgentConfig, SignalingBackend, SignalingEndpoint};
use super::media::NullStreamManager;
use crate::address::{AgentKind, EndpointAddress};

/// Builds endpoints for the demo users on a given backend
///
/// # Examples
///
/// ```rust
/// use sipduet_core::address::EndpointAddress;
/// use sipduet_core::agent::AgentFactory;
/// use sipduet_core::loopback::LoopbackNetwork;
///
/// let factory = AgentFactory::new(LoopbackNetwork::new(), true);
/// let alice = EndpointAddress::for_user("alice", "tok", "sipjs.onsip.com");
///
/// let media = factory.create_media_agent(&alice, "Alice");
/// let data = factory.create_data_agent(&alice, "Alice");
///
/// assert_eq!(media.address().as_str(), "alice.tok@sipjs.onsip.com");
/// assert_eq!(data.address().as_str(), "data.alice.tok@sipjs.onsip.com");
/// ```
pub struct AgentFactory<B> {
    backend: B,
    trace_sip: bool,
}

impl<B: SignalingBackend> AgentFactory<B> {
    pub fn new(backend: B, trace_sip: bool) -> Self {
        Self { backend, trace_sip }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Configuration for an audio/video endpoint
    pub fn media_config(&self, address: &EndpointAddress, display_name: &str) -> AgentConfig {
        AgentConfig {
            address: address.for_kind(AgentKind::Media),
            display_name: display_name.to_string(),
            kind: AgentKind::Media,
            trace_sip: self.trace_sip,
            stream_manager: None,
        }
    }

    /// Configuration for a data-only endpoint: `data.`-prefixed address and a
    /// media strategy that never opens capture devices
    pub fn data_config(&self, address: &EndpointAddress, display_name: &str) -> AgentConfig {
        AgentConfig {
            address: address.for_kind(AgentKind::Data),
            display_name: display_name.to_string(),
            kind: AgentKind::Data,
            trace_sip: self.trace_sip,
            stream_manager: Some(Arc::new(NullStreamManager)),
        }
    }

    pub fn create_media_agent(
        &self,
        address: &EndpointAddress,
        display_name: &str,
    ) -> Arc<dyn SignalingEndpoint> {
        let config = self.media_config(address, display_name);
        debug!("Creating media agent {} ({})", config.address, display_name);
        self.backend.create_endpoint(config)
    }

    /// `address` is the user's base address; the `data.` prefix is added here
    pub fn create_data_agent(
        &self,
        address: &EndpointAddress,
        display_name: &str,
    ) -> Arc<dyn SignalingEndpoint> {
        let config = self.data_config(address, display_name);
        debug!("Creating data agent {} ({})", config.address, display_name);
        self.backend.create_endpoint(config)
    }
}
