//! Running a controller as its own task

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::controller::{CallController, ControllerEvent, ControllerState};
use crate::agent::EndpointEvent;
use crate::error::{DuetError, DuetResult};

/// Handle to a spawned [`CallController`]
#[derive(Debug)]
pub struct ControllerHandle {
    inbox: mpsc::UnboundedSender<ControllerEvent>,
    state: watch::Receiver<ControllerState>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Press the button
    pub fn click(&self) -> DuetResult<()> {
        self.inbox
            .send(ControllerEvent::Click)
            .map_err(|_| DuetError::invalid_state("controller has stopped"))
    }

    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.clone()
    }

    /// Resolve once the controller reaches `target`
    pub async fn wait_for(&self, target: ControllerState) -> DuetResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| DuetError::invalid_state("controller has stopped"))
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.inbox.send(ControllerEvent::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Controller task ended abnormally: {}", e);
        }
    }
}

impl CallController {
    /// Move the controller onto a task that serves clicks, inbound invites
    /// from its endpoint and the end of its sessions, one at a time.
    pub fn spawn(mut self) -> ControllerHandle {
        // Subscribe before returning so no invite sent after spawn is missed
        let endpoint_events = self.endpoint.subscribe();
        let inbox_rx = match self.inbox_rx.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.inbox_tx = tx;
                rx
            }
        };
        let inbox = self.inbox_tx.clone();
        let state = self.state_tx.subscribe();

        let task = tokio::spawn(self.run(inbox_rx, endpoint_events));

        ControllerHandle { inbox, state, task }
    }

    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<ControllerEvent>,
        mut endpoint_events: broadcast::Receiver<EndpointEvent>,
    ) {
        debug!("Controller for {} started", self.endpoint.address());
        loop {
            tokio::select! {
                event = inbox.recv() => match event {
                    Some(ControllerEvent::Shutdown) | None => break,
                    Some(event) => self.handle(event).await,
                },
                event = endpoint_events.recv() => match event {
                    Ok(EndpointEvent::InboundInvite(session)) => {
                        self.handle(ControllerEvent::Invite(session)).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Controller for {} missed {} endpoint event(s)", self.endpoint.address(), n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("Controller for {} stopped", self.endpoint.address());
    }
}
