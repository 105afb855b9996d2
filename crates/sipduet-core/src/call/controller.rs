//! Per-user call controller
//!
//! A [`CallController`] binds one button and one remote video surface to a
//! signaling endpoint. It is an explicit two-state machine:
//!
//! ```text
//!            click / invite sent
//!          ┌──────────────────────┐
//!          │   inbound invite     ▼
//!        Idle ◀──────────────── OnCall
//!             click (bye) / remote bye / rejected
//! ```
//!
//! Every transition goes through [`CallController::handle`], so a click and
//! an inbound invite can never interleave half-way. What happens to an invite
//! that arrives while a call is active is decided by [`BusyPolicy`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::address::EndpointAddress;
use crate::agent::{
    CallSession, MediaOptions, SessionEvent, SessionId, SessionState, SignalingEndpoint,
};
use crate::ui::{CALL_LABEL, CallButton, HANG_UP_LABEL, VideoSurface, Visibility};

/// Reason sent when an invite is turned down because a call is active
pub const BUSY_REASON: &str = "Busy Here";

/// What to do with an inbound invite while already on a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Decline the new invite and keep the active call
    #[default]
    Reject,
    /// Hang up the active call and take the new one
    Replace,
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Idle,
    OnCall,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "Idle"),
            ControllerState::OnCall => write!(f, "OnCall"),
        }
    }
}

/// Inputs that drive the controller
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// The button was pressed
    Click,
    /// Someone is calling
    Invite(Arc<dyn CallSession>),
    /// A session ended on the remote side
    SessionEnded(SessionId),
    /// Stop the controller task
    Shutdown,
}

/// Call/hang-up state machine for one user
pub struct CallController {
    pub(super) endpoint: Arc<dyn SignalingEndpoint>,
    target: EndpointAddress,
    surface: Arc<dyn VideoSurface>,
    button: Arc<dyn CallButton>,
    busy_policy: BusyPolicy,
    session: Option<Arc<dyn CallSession>>,
    watcher: Option<JoinHandle<()>>,
    pub(super) inbox_tx: mpsc::UnboundedSender<ControllerEvent>,
    pub(super) inbox_rx: Option<mpsc::UnboundedReceiver<ControllerEvent>>,
    pub(super) state_tx: watch::Sender<ControllerState>,
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallController")
            .field("endpoint", &self.endpoint.address())
            .field("target", &self.target)
            .field("busy_policy", &self.busy_policy)
            .field("state", &self.state())
            .field("session", &self.session.as_ref().map(|s| s.id()))
            .finish()
    }
}

impl CallController {
    pub fn new(
        endpoint: Arc<dyn SignalingEndpoint>,
        target: EndpointAddress,
        surface: Arc<dyn VideoSurface>,
        button: Arc<dyn CallButton>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ControllerState::Idle);

        button.set_label(CALL_LABEL);
        surface.set_visibility(Visibility::Hidden);

        Self {
            endpoint,
            target,
            surface,
            button,
            busy_policy: BusyPolicy::default(),
            session: None,
            watcher: None,
            inbox_tx,
            inbox_rx: Some(inbox_rx),
            state_tx,
        }
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    pub fn state(&self) -> ControllerState {
        if self.session.is_some() {
            ControllerState::OnCall
        } else {
            ControllerState::Idle
        }
    }

    /// The active session, if any
    pub fn session(&self) -> Option<&Arc<dyn CallSession>> {
        self.session.as_ref()
    }

    pub fn target(&self) -> &EndpointAddress {
        &self.target
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    /// Next event queued by the controller's own session watchers. Only
    /// useful when driving the controller by hand instead of spawning it.
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        match self.inbox_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Apply one event
    pub async fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Click => self.click().await,
            ControllerEvent::Invite(session) => self.inbound_invite(session).await,
            ControllerEvent::SessionEnded(id) => self.session_ended(id),
            ControllerEvent::Shutdown => {}
        }
    }

    async fn click(&mut self) {
        if let Some(session) = self.enter_idle() {
            info!("{} hanging up session {}", self.endpoint.address(), session.id());
            if let Err(e) = session.bye().await {
                warn!("Failed to send BYE for session {}: {}", session.id(), e);
            }
            return;
        }

        let options = MediaOptions::video_only(Some(self.surface.id().to_string()));
        info!("{} calling {}", self.endpoint.address(), self.target.to_sip_uri());
        match self.endpoint.invite(&self.target, options).await {
            Ok(session) => self.enter_call(session),
            Err(e) => warn!("Call from {} failed: {}", self.endpoint.address(), e),
        }
    }

    async fn inbound_invite(&mut self, session: Arc<dyn CallSession>) {
        if self.session.is_some() {
            match self.busy_policy {
                BusyPolicy::Reject => {
                    info!(
                        "{} busy, rejecting invite from {}",
                        self.endpoint.address(),
                        session.remote()
                    );
                    if let Err(e) = session.reject(BUSY_REASON).await {
                        warn!("Failed to reject session {}: {}", session.id(), e);
                    }
                    return;
                }
                BusyPolicy::Replace => {
                    if let Some(previous) = self.enter_idle() {
                        info!(
                            "{} replacing session {} with a new invite",
                            self.endpoint.address(),
                            previous.id()
                        );
                        if let Err(e) = previous.bye().await {
                            warn!("Failed to send BYE for session {}: {}", previous.id(), e);
                        }
                    }
                }
            }
        }

        info!(
            "{} auto-answering call from {}",
            self.endpoint.address(),
            session.remote()
        );
        self.enter_call(session.clone());

        let options = MediaOptions::video_only(Some(self.surface.id().to_string()));
        if let Err(e) = session.accept(options).await {
            warn!("Failed to answer session {}: {}", session.id(), e);
            if self.is_current(session.id()) {
                self.enter_idle();
            }
        }
    }

    fn session_ended(&mut self, id: SessionId) {
        if self.is_current(id) {
            info!("{} call ended by remote party", self.endpoint.address());
            self.enter_idle();
        } else {
            debug!("Ignoring end of stale session {}", id);
        }
    }

    fn is_current(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == id)
    }

    fn enter_call(&mut self, session: Arc<dyn CallSession>) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.watcher = Some(self.watch_session(&session));
        self.session = Some(session);

        self.button.set_label(HANG_UP_LABEL);
        self.surface.set_visibility(Visibility::Visible);
        self.publish();
    }

    /// Reset to `Idle`, handing back the session that was active
    fn enter_idle(&mut self) -> Option<Arc<dyn CallSession>> {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        let previous = self.session.take();

        self.button.set_label(CALL_LABEL);
        self.surface.set_visibility(Visibility::Hidden);
        self.publish();
        previous
    }

    fn publish(&self) {
        let state = self.state();
        debug!("{} -> {}", self.endpoint.address(), state);
        self.state_tx.send_replace(state);
    }

    fn watch_session(&self, session: &Arc<dyn CallSession>) -> JoinHandle<()> {
        let id = session.id();
        let mut events = session.subscribe();
        let already_over = session.state() == SessionState::Terminated;
        let inbox = self.inbox_tx.clone();

        tokio::spawn(async move {
            if already_over {
                let _ = inbox.send(ControllerEvent::SessionEnded(id));
                return;
            }
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Bye) | Ok(SessionEvent::Rejected { .. }) => {
                        let _ = inbox.send(ControllerEvent::SessionEnded(id));
                        break;
                    }
                    Ok(SessionEvent::Accepted) => debug!("Session {} accepted", id),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Session {} watcher missed {} event(s)", id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AgentKind;
    use crate::agent::{EndpointEvent, RegistrationState};
    use crate::error::{DuetError, DuetResult};
    use crate::ui::{HeadlessButton, HeadlessSurface};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeSession {
        id: SessionId,
        remote: EndpointAddress,
        state: Mutex<SessionState>,
        events: broadcast::Sender<SessionEvent>,
        accepted_with: Mutex<Option<MediaOptions>>,
        rejects: AtomicUsize,
        byes: AtomicUsize,
    }

    impl FakeSession {
        fn new(remote: &str) -> Arc<Self> {
            let (events, _) = broadcast::channel(8);
            Arc::new(Self {
                id: SessionId::new_v4(),
                remote: EndpointAddress::new(remote),
                state: Mutex::new(SessionState::Offered),
                events,
                accepted_with: Mutex::new(None),
                rejects: AtomicUsize::new(0),
                byes: AtomicUsize::new(0),
            })
        }

        fn remote_hangs_up(&self) {
            *self.state.lock() = SessionState::Terminated;
            let _ = self.events.send(SessionEvent::Bye);
        }
    }

    #[async_trait]
    impl CallSession for FakeSession {
        fn id(&self) -> SessionId {
            self.id
        }

        fn remote(&self) -> &EndpointAddress {
            &self.remote
        }

        fn state(&self) -> SessionState {
            *self.state.lock()
        }

        fn local_options(&self) -> Option<MediaOptions> {
            self.accepted_with.lock().clone()
        }

        fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
            self.events.subscribe()
        }

        async fn accept(&self, options: MediaOptions) -> DuetResult<()> {
            *self.accepted_with.lock() = Some(options);
            *self.state.lock() = SessionState::Established;
            Ok(())
        }

        async fn reject(&self, _reason: &str) -> DuetResult<()> {
            self.rejects.fetch_add(1, Ordering::SeqCst);
            *self.state.lock() = SessionState::Terminated;
            Ok(())
        }

        async fn bye(&self) -> DuetResult<()> {
            self.byes.fetch_add(1, Ordering::SeqCst);
            *self.state.lock() = SessionState::Terminated;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FakeEndpoint {
        address: EndpointAddress,
        events: broadcast::Sender<EndpointEvent>,
        invites: Mutex<Vec<(EndpointAddress, MediaOptions)>>,
        sessions: Mutex<Vec<Arc<FakeSession>>>,
        refuse_invites: bool,
    }

    impl FakeEndpoint {
        fn new(refuse_invites: bool) -> Arc<Self> {
            let (events, _) = broadcast::channel(8);
            Arc::new(Self {
                address: EndpointAddress::new("alice.tok@example.com"),
                events,
                invites: Mutex::new(Vec::new()),
                sessions: Mutex::new(Vec::new()),
                refuse_invites,
            })
        }

        fn invite_count(&self) -> usize {
            self.invites.lock().len()
        }

        fn last_session(&self) -> Arc<FakeSession> {
            self.sessions.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl SignalingEndpoint for FakeEndpoint {
        fn address(&self) -> &EndpointAddress {
            &self.address
        }

        fn display_name(&self) -> &str {
            "Alice"
        }

        fn kind(&self) -> AgentKind {
            AgentKind::Media
        }

        fn registration_state(&self) -> RegistrationState {
            RegistrationState::Registered
        }

        fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
            self.events.subscribe()
        }

        async fn register(&self) -> DuetResult<()> {
            Ok(())
        }

        async fn invite(
            &self,
            target: &EndpointAddress,
            options: MediaOptions,
        ) -> DuetResult<Arc<dyn CallSession>> {
            self.invites.lock().push((target.clone(), options));
            if self.refuse_invites {
                return Err(DuetError::call_setup(target.to_sip_uri(), "refused"));
            }
            let session = FakeSession::new(target.as_str());
            self.sessions.lock().push(session.clone());
            Ok(session)
        }

        async fn stop(&self) -> DuetResult<()> {
            Ok(())
        }
    }

    struct Rig {
        endpoint: Arc<FakeEndpoint>,
        button: Arc<HeadlessButton>,
        surface: Arc<HeadlessSurface>,
        controller: CallController,
    }

    fn rig(refuse_invites: bool) -> Rig {
        rig_with_policy(refuse_invites, BusyPolicy::default())
    }

    fn rig_with_policy(refuse_invites: bool, policy: BusyPolicy) -> Rig {
        let endpoint = FakeEndpoint::new(refuse_invites);
        let button = Arc::new(HeadlessButton::new("alice-video-button"));
        let surface = Arc::new(HeadlessSurface::new("video-of-bob"));
        let controller = CallController::new(
            endpoint.clone(),
            EndpointAddress::new("bob.tok@example.com"),
            surface.clone(),
            button.clone(),
        )
        .with_busy_policy(policy);
        Rig {
            endpoint,
            button,
            surface,
            controller,
        }
    }

    #[tokio::test]
    async fn test_click_when_idle_places_one_call() {
        let mut rig = rig(false);

        rig.controller.handle(ControllerEvent::Click).await;

        assert_eq!(rig.controller.state(), ControllerState::OnCall);
        assert_eq!(rig.endpoint.invite_count(), 1);
        assert_eq!(rig.button.label(), HANG_UP_LABEL);
        assert_eq!(rig.surface.visibility(), Visibility::Visible);

        let (target, options) = rig.endpoint.invites.lock()[0].clone();
        assert_eq!(target.as_str(), "bob.tok@example.com");
        assert!(!options.constraints.audio);
        assert!(options.constraints.video);
        assert_eq!(options.render.remote.as_deref(), Some("video-of-bob"));
    }

    #[tokio::test]
    async fn test_click_when_on_call_hangs_up_once() {
        let mut rig = rig(false);
        rig.controller.handle(ControllerEvent::Click).await;
        let session = rig.endpoint.last_session();

        rig.controller.handle(ControllerEvent::Click).await;

        assert_eq!(rig.controller.state(), ControllerState::Idle);
        assert!(rig.controller.session().is_none());
        assert_eq!(session.byes.load(Ordering::SeqCst), 1);
        assert_eq!(rig.endpoint.invite_count(), 1);
        assert_eq!(rig.button.label(), CALL_LABEL);
        assert_eq!(rig.surface.visibility(), Visibility::Hidden);
    }

    #[tokio::test]
    async fn test_inbound_invite_auto_answers_video_only() {
        let mut rig = rig(false);
        let inbound = FakeSession::new("bob.tok@example.com");

        rig.controller
            .handle(ControllerEvent::Invite(inbound.clone()))
            .await;

        assert_eq!(rig.controller.state(), ControllerState::OnCall);
        assert_eq!(rig.endpoint.invite_count(), 0);
        assert_eq!(rig.button.label(), HANG_UP_LABEL);
        assert_eq!(rig.surface.visibility(), Visibility::Visible);

        let options = inbound.accepted_with.lock().clone().unwrap();
        assert!(!options.constraints.audio);
        assert!(options.constraints.video);
    }

    #[tokio::test]
    async fn test_remote_bye_returns_to_idle() {
        let mut rig = rig(false);
        rig.controller.handle(ControllerEvent::Click).await;
        let session = rig.endpoint.last_session();

        session.remote_hangs_up();
        let event = rig.controller.next_event().await.unwrap();
        assert!(matches!(event, ControllerEvent::SessionEnded(id) if id == session.id));
        rig.controller.handle(event).await;

        assert_eq!(rig.controller.state(), ControllerState::Idle);
        assert!(rig.controller.session().is_none());
        assert_eq!(rig.button.label(), CALL_LABEL);
        assert_eq!(rig.surface.visibility(), Visibility::Hidden);
        assert_eq!(session.byes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_session_end_is_ignored() {
        let mut rig = rig(false);
        rig.controller.handle(ControllerEvent::Click).await;

        rig.controller
            .handle(ControllerEvent::SessionEnded(SessionId::new_v4()))
            .await;

        assert_eq!(rig.controller.state(), ControllerState::OnCall);
    }

    #[tokio::test]
    async fn test_busy_invite_is_rejected_by_default() {
        let mut rig = rig(false);
        rig.controller.handle(ControllerEvent::Click).await;
        let active = rig.endpoint.last_session();

        let second = FakeSession::new("carol.tok@example.com");
        rig.controller
            .handle(ControllerEvent::Invite(second.clone()))
            .await;

        assert_eq!(second.rejects.load(Ordering::SeqCst), 1);
        assert_eq!(rig.controller.session().unwrap().id(), active.id);
        assert_eq!(active.byes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_busy_invite_replaces_when_configured() {
        let mut rig = rig_with_policy(false, BusyPolicy::Replace);

        rig.controller.handle(ControllerEvent::Click).await;
        let active = rig.endpoint.last_session();

        let second = FakeSession::new("carol.tok@example.com");
        rig.controller
            .handle(ControllerEvent::Invite(second.clone()))
            .await;

        assert_eq!(active.byes.load(Ordering::SeqCst), 1);
        assert_eq!(second.rejects.load(Ordering::SeqCst), 0);
        assert_eq!(rig.controller.session().unwrap().id(), second.id);
        assert_eq!(rig.controller.state(), ControllerState::OnCall);
    }

    #[tokio::test]
    async fn test_refused_invite_stays_idle() {
        let mut rig = rig(true);
        rig.controller.handle(ControllerEvent::Click).await;

        assert_eq!(rig.endpoint.invite_count(), 1);
        assert_eq!(rig.controller.state(), ControllerState::Idle);
        assert_eq!(rig.button.label(), CALL_LABEL);
    }

    #[tokio::test]
    async fn test_state_is_published() {
        let mut rig = rig(false);
        let states = rig.controller.subscribe_state();
        assert_eq!(*states.borrow(), ControllerState::Idle);

        rig.controller.handle(ControllerEvent::Click).await;
        assert_eq!(*states.borrow(), ControllerState::OnCall);
    }
}
