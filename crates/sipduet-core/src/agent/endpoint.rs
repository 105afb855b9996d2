//! Signaling seam
//!
//! The demo never talks SIP itself. It drives endpoints through the traits in
//! this module, and a backend (the in-process loopback network, or an adapter
//! around a real SIP stack) supplies the implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::media::{MediaOptions, MediaStreamManager};
use crate::address::{AgentKind, EndpointAddress};
use crate::error::DuetResult;

/// Identifier of one call session
pub type SessionId = Uuid;

/// Registration lifecycle of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Failed,
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationState::Unregistered => write!(f, "Unregistered"),
            RegistrationState::Registering => write!(f, "Registering"),
            RegistrationState::Registered => write!(f, "Registered"),
            RegistrationState::Failed => write!(f, "Failed"),
        }
    }
}

/// Lifecycle of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Invite sent or received, not answered yet
    Offered,
    /// Answered; media flowing
    Established,
    /// Ended by either side, or rejected
    Terminated,
}

/// Events emitted by an endpoint
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// Registration accepted by the registrar
    Registered,
    /// Registration refused
    RegistrationFailed { reason: String },
    /// Someone is calling this endpoint
    InboundInvite(Arc<dyn CallSession>),
    /// Endpoint deregistered after `stop`
    Unregistered,
}

/// Events emitted by a call session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The callee accepted
    Accepted,
    /// The callee turned the invite down
    Rejected { reason: String },
    /// The remote side hung up
    Bye,
}

/// One negotiated call between two endpoints
#[async_trait]
pub trait CallSession: Send + Sync + std::fmt::Debug {
    fn id(&self) -> SessionId;

    /// The other party
    fn remote(&self) -> &EndpointAddress;

    fn state(&self) -> SessionState;

    /// Options this side sent with its invite or accept, if any yet
    fn local_options(&self) -> Option<MediaOptions>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Answer an inbound invite
    async fn accept(&self, options: MediaOptions) -> DuetResult<()>;

    /// Decline an inbound invite
    async fn reject(&self, reason: &str) -> DuetResult<()>;

    /// Hang up
    async fn bye(&self) -> DuetResult<()>;
}

/// A registered identity on the signaling network
#[async_trait]
pub trait SignalingEndpoint: Send + Sync + std::fmt::Debug {
    fn address(&self) -> &EndpointAddress;

    fn display_name(&self) -> &str;

    fn kind(&self) -> AgentKind;

    fn registration_state(&self) -> RegistrationState;

    /// Subscribe before calling [`register`](Self::register) or the outcome
    /// may be missed.
    fn subscribe(&self) -> broadcast::Receiver<EndpointEvent>;

    /// Start registering; the outcome arrives as an [`EndpointEvent`]
    async fn register(&self) -> DuetResult<()>;

    /// Place a call to `target`
    async fn invite(
        &self,
        target: &EndpointAddress,
        options: MediaOptions,
    ) -> DuetResult<Arc<dyn CallSession>>;

    /// End all sessions and deregister
    async fn stop(&self) -> DuetResult<()>;
}

/// Everything needed to build one endpoint
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub address: EndpointAddress,
    pub display_name: String,
    pub kind: AgentKind,
    /// Log every signaling message
    pub trace_sip: bool,
    /// Custom media strategy; `None` means the backend's device capture
    pub stream_manager: Option<Arc<dyn MediaStreamManager>>,
}

/// Something that can turn an [`AgentConfig`] into a live endpoint
pub trait SignalingBackend: Send + Sync {
    fn create_endpoint(&self, config: AgentConfig) -> Arc<dyn SignalingEndpoint>;
}

impl<B: SignalingBackend + ?Sized> SignalingBackend for Arc<B> {
    fn create_endpoint(&self, config: AgentConfig) -> Arc<dyn SignalingEndpoint> {
        (**self).create_endpoint(config)
    }
}
