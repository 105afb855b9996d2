//! Loopback endpoints

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::network::NetworkInner;
use super::session::{LoopbackSession, SessionLink, Side};
use crate::address::{AgentKind, EndpointAddress};
use crate::agent::{
    AgentConfig, CallSession, EndpointEvent, MediaOptions, MediaStreamManager,
    RegistrationState, SessionId, SignalingEndpoint,
};
use crate::error::{DuetError, DuetResult};
use crate::logging::SIP_TRACE_TARGET;

const ENDPOINT_EVENT_CAPACITY: usize = 64;

/// Parts of an endpoint the network and sessions need to reach
#[derive(Debug)]
pub(crate) struct EndpointCore {
    pub(crate) address: EndpointAddress,
    pub(crate) display_name: String,
    pub(crate) kind: AgentKind,
    pub(crate) trace_sip: bool,
    pub(crate) events: broadcast::Sender<EndpointEvent>,
    pub(crate) stream_manager: Arc<dyn MediaStreamManager>,
    pub(crate) sessions: DashMap<SessionId, Arc<LoopbackSession>>,
    pub(crate) state: Mutex<RegistrationState>,
}

impl EndpointCore {
    pub(crate) fn trace(&self, message: &str) {
        if self.trace_sip {
            debug!(target: SIP_TRACE_TARGET, endpoint = %self.address, "{}", message);
        }
    }

    fn set_state(&self, state: RegistrationState) {
        *self.state.lock() = state;
    }
}

/// Endpoint on a [`LoopbackNetwork`](super::LoopbackNetwork)
#[derive(Debug)]
pub struct LoopbackEndpoint {
    core: Arc<EndpointCore>,
    network: Arc<NetworkInner>,
}

impl LoopbackEndpoint {
    pub(crate) fn new(
        config: AgentConfig,
        network: Arc<NetworkInner>,
        default_streams: Arc<dyn MediaStreamManager>,
    ) -> Self {
        let (events, _) = broadcast::channel(ENDPOINT_EVENT_CAPACITY);
        let core = EndpointCore {
            address: config.address,
            display_name: config.display_name,
            kind: config.kind,
            trace_sip: config.trace_sip,
            events,
            stream_manager: config.stream_manager.unwrap_or(default_streams),
            sessions: DashMap::new(),
            state: Mutex::new(RegistrationState::Unregistered),
        };
        Self {
            core: Arc::new(core),
            network,
        }
    }

    /// Sessions this endpoint is part of that have not ended yet
    pub fn active_sessions(&self) -> usize {
        self.core.sessions.len()
    }
}

#[async_trait]
impl SignalingEndpoint for LoopbackEndpoint {
    fn address(&self) -> &EndpointAddress {
        &self.core.address
    }

    fn display_name(&self) -> &str {
        &self.core.display_name
    }

    fn kind(&self) -> AgentKind {
        self.core.kind
    }

    fn registration_state(&self) -> RegistrationState {
        *self.core.state.lock()
    }

    fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.core.events.subscribe()
    }

    async fn register(&self) -> DuetResult<()> {
        self.core.set_state(RegistrationState::Registering);
        self.core.trace(&format!(
            "REGISTER sip:{} SIP/2.0 (From: \"{}\" <{}>)",
            self.core.address.domain().unwrap_or_default(),
            self.core.display_name,
            self.core.address.to_sip_uri()
        ));

        match self.network.register(&self.core) {
            Ok(()) => {
                self.core.set_state(RegistrationState::Registered);
                self.core.trace("SIP/2.0 200 OK");
                info!("Registered {}", self.core.address);
                let _ = self.core.events.send(EndpointEvent::Registered);
            }
            Err(reason) => {
                self.core.set_state(RegistrationState::Failed);
                self.core.trace(&format!("SIP/2.0 403 Forbidden ({})", reason));
                warn!("Registration of {} failed: {}", self.core.address, reason);
                let _ = self
                    .core
                    .events
                    .send(EndpointEvent::RegistrationFailed { reason });
            }
        }
        Ok(())
    }

    async fn invite(
        &self,
        target: &EndpointAddress,
        options: MediaOptions,
    ) -> DuetResult<Arc<dyn CallSession>> {
        self.core.trace(&format!("INVITE {} SIP/2.0", target.to_sip_uri()));

        let callee = self.network.lookup(target).ok_or_else(|| {
            self.core.trace("SIP/2.0 480 Temporarily Unavailable");
            DuetError::call_setup(target.to_sip_uri(), "target is not registered")
        })?;

        let streams = self.core.stream_manager.acquire(&options.constraints).await?;

        let link = SessionLink::new(Side::new(&self.core), Side::new(&callee));
        let outbound = LoopbackSession::caller_half(&link);
        let inbound = LoopbackSession::callee_half(&link);
        outbound.set_offer(options, streams);

        self.core.sessions.insert(outbound.id(), outbound.clone());
        callee.sessions.insert(inbound.id(), inbound.clone());

        debug!(
            "Session {} offered from {} to {}",
            outbound.id(),
            self.core.address,
            target
        );
        if callee
            .events
            .send(EndpointEvent::InboundInvite(inbound))
            .is_err()
        {
            debug!("Nobody is listening on {} yet", target);
        }

        Ok(outbound)
    }

    async fn stop(&self) -> DuetResult<()> {
        let live: Vec<Arc<LoopbackSession>> = self
            .core
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in live {
            session.bye().await?;
        }
        self.core.sessions.clear();

        if self.network.unregister(&self.core) {
            self.core.trace(&format!(
                "REGISTER sip:{} SIP/2.0 (Expires: 0)",
                self.core.address.domain().unwrap_or_default()
            ));
            info!("Unregistered {}", self.core.address);
        }
        self.core.set_state(RegistrationState::Unregistered);
        let _ = self.core.events.send(EndpointEvent::Unregistered);
        Ok(())
    }
}
