//! Loopback call sessions
//!
//! Both halves of a call share one [`SessionLink`]. Each half only ever
//! publishes to the *other* half's event channel, the way a BYE or a 200 OK
//! travels to the peer on a real network.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::endpoint::EndpointCore;
use crate::address::EndpointAddress;
use crate::agent::{
    CallSession, MediaOptions, MediaStream, MediaStreamManager, SessionEvent, SessionId,
    SessionState,
};
use crate::error::{DuetError, DuetResult};

const SESSION_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Caller,
    Callee,
}

/// One party of a call
#[derive(Debug)]
pub(crate) struct Side {
    address: EndpointAddress,
    owner: Weak<EndpointCore>,
    events: broadcast::Sender<SessionEvent>,
    stream_manager: Arc<dyn MediaStreamManager>,
    streams: Mutex<Vec<MediaStream>>,
    options: Mutex<Option<MediaOptions>>,
}

impl Side {
    pub(crate) fn new(owner: &Arc<EndpointCore>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            address: owner.address.clone(),
            owner: Arc::downgrade(owner),
            events,
            stream_manager: owner.stream_manager.clone(),
            streams: Mutex::new(Vec::new()),
            options: Mutex::new(None),
        }
    }

    fn set_media(&self, options: MediaOptions, streams: Vec<MediaStream>) {
        *self.options.lock() = Some(options);
        *self.streams.lock() = streams;
    }

    fn release_streams(&self) {
        let streams = std::mem::take(&mut *self.streams.lock());
        if !streams.is_empty() {
            self.stream_manager.release(&streams);
        }
    }

    fn trace(&self, message: &str) {
        if let Some(owner) = self.owner.upgrade() {
            owner.trace(message);
        }
    }

    fn forget(&self, id: SessionId) {
        if let Some(owner) = self.owner.upgrade() {
            owner.sessions.remove(&id);
        }
    }
}

/// State shared by both halves of a call
#[derive(Debug)]
pub(crate) struct SessionLink {
    id: SessionId,
    state: Mutex<SessionState>,
    caller: Side,
    callee: Side,
}

impl SessionLink {
    pub(crate) fn new(caller: Side, callee: Side) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new_v4(),
            state: Mutex::new(SessionState::Offered),
            caller,
            callee,
        })
    }

    /// Move to `Terminated` unless already there; returns whether this call
    /// did the transition
    fn terminate(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Terminated {
            return false;
        }
        *state = SessionState::Terminated;
        drop(state);

        self.caller.release_streams();
        self.callee.release_streams();
        self.caller.forget(self.id);
        self.callee.forget(self.id);
        true
    }
}

/// One half of a loopback call
#[derive(Debug)]
pub struct LoopbackSession {
    link: Arc<SessionLink>,
    role: Role,
    remote: EndpointAddress,
}

impl LoopbackSession {
    pub(crate) fn caller_half(link: &Arc<SessionLink>) -> Arc<Self> {
        Arc::new(Self {
            link: link.clone(),
            role: Role::Caller,
            remote: link.callee.address.clone(),
        })
    }

    pub(crate) fn callee_half(link: &Arc<SessionLink>) -> Arc<Self> {
        Arc::new(Self {
            link: link.clone(),
            role: Role::Callee,
            remote: link.caller.address.clone(),
        })
    }

    pub(crate) fn set_offer(&self, options: MediaOptions, streams: Vec<MediaStream>) {
        self.local().set_media(options, streams);
    }

    fn local(&self) -> &Side {
        match self.role {
            Role::Caller => &self.link.caller,
            Role::Callee => &self.link.callee,
        }
    }

    fn peer(&self) -> &Side {
        match self.role {
            Role::Caller => &self.link.callee,
            Role::Callee => &self.link.caller,
        }
    }

    /// Streams this side currently holds
    pub fn local_streams(&self) -> Vec<MediaStream> {
        self.local().streams.lock().clone()
    }

    fn ensure_callee(&self, operation: &str) -> DuetResult<()> {
        if self.role != Role::Callee {
            return Err(DuetError::invalid_state(format!(
                "only the called party can {}",
                operation
            )));
        }
        Ok(())
    }

    fn ensure_offered(&self, operation: &str) -> DuetResult<()> {
        let state = *self.link.state.lock();
        if state != SessionState::Offered {
            return Err(DuetError::invalid_state(format!(
                "cannot {} session {} in state {:?}",
                operation, self.link.id, state
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CallSession for LoopbackSession {
    fn id(&self) -> SessionId {
        self.link.id
    }

    fn remote(&self) -> &EndpointAddress {
        &self.remote
    }

    fn state(&self) -> SessionState {
        *self.link.state.lock()
    }

    fn local_options(&self) -> Option<MediaOptions> {
        self.local().options.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.local().events.subscribe()
    }

    async fn accept(&self, options: MediaOptions) -> DuetResult<()> {
        self.ensure_callee("accept")?;
        self.ensure_offered("accept")?;

        let streams = self.local().stream_manager.acquire(&options.constraints).await?;

        {
            let mut state = self.link.state.lock();
            if *state != SessionState::Offered {
                drop(state);
                self.local().stream_manager.release(&streams);
                return Err(DuetError::invalid_state("session ended while answering"));
            }
            *state = SessionState::Established;
            self.local().set_media(options, streams);
        }

        self.local()
            .trace(&format!("SIP/2.0 200 OK -> {}", self.remote.to_sip_uri()));
        let _ = self.peer().events.send(SessionEvent::Accepted);
        debug!("Session {} established", self.link.id);
        Ok(())
    }

    async fn reject(&self, reason: &str) -> DuetResult<()> {
        self.ensure_callee("reject")?;
        self.ensure_offered("reject")?;

        if self.link.terminate() {
            self.local()
                .trace(&format!("SIP/2.0 486 Busy Here -> {}", self.remote.to_sip_uri()));
            let _ = self.peer().events.send(SessionEvent::Rejected {
                reason: reason.to_string(),
            });
            debug!("Session {} rejected: {}", self.link.id, reason);
        }
        Ok(())
    }

    async fn bye(&self) -> DuetResult<()> {
        if self.link.terminate() {
            self.local()
                .trace(&format!("BYE {} SIP/2.0", self.remote.to_sip_uri()));
            let _ = self.peer().events.send(SessionEvent::Bye);
            debug!("Session {} ended by {}", self.link.id, self.local().address);
        }
        Ok(())
    }
}
