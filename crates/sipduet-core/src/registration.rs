//! Registration quorum
//!
//! The demo only makes sense once every endpoint is reachable, so the UI is
//! held back until a quorum of endpoints reports a successful registration.
//! A single failure disables the demo for good.
//!
//! # State Transitions
//!
//! ```text
//! Idle ──start()──▶ AwaitingQuorum ──(registered ≥ quorum)──▶ Ready
//!   │                     │
//!   └──── any failure ────┴──────────────────────────────────▶ Failed
//! ```
//!
//! `Ready` and `Failed` are terminal. Each callback runs at most once.
//!
//! # Examples
//!
//! ```rust
//! use sipduet_core::registration::{CoordinatorState, RegistrationCoordinator, RegistrationOutcome};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let ready = Arc::new(AtomicUsize::new(0));
//! let counter = ready.clone();
//!
//! let mut coordinator = RegistrationCoordinator::new(2)
//!     .on_ready(move || { counter.fetch_add(1, Ordering::SeqCst); });
//! coordinator.start();
//!
//! coordinator.handle(RegistrationOutcome::Registered);
//! assert_eq!(coordinator.state(), CoordinatorState::AwaitingQuorum);
//! coordinator.handle(RegistrationOutcome::Registered);
//! assert_eq!(coordinator.state(), CoordinatorState::Ready);
//! assert_eq!(ready.load(Ordering::SeqCst), 1);
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, error, info, warn};

use crate::address::EndpointAddress;
use crate::agent::{EndpointEvent, SignalingEndpoint};

type ReadyCallback = Box<dyn FnOnce() + Send>;
type FailureCallback = Box<dyn FnOnce(&str) + Send>;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Counting outcomes, not yet deciding
    Idle,
    /// Waiting for enough registrations
    AwaitingQuorum,
    /// Quorum reached, UI enabled
    Ready,
    /// A registration failed, demo disabled
    Failed,
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Ready | CoordinatorState::Failed)
    }
}

/// Registration result reported by one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Failed { reason: String },
}

impl RegistrationOutcome {
    /// Registration outcome carried by an endpoint event, if any
    pub fn from_event(event: &EndpointEvent) -> Option<Self> {
        match event {
            EndpointEvent::Registered => Some(Self::Registered),
            EndpointEvent::RegistrationFailed { reason } => Some(Self::Failed {
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// Quorum state machine gating the demo UI
pub struct RegistrationCoordinator {
    quorum: usize,
    registered: usize,
    failure: Option<String>,
    state: CoordinatorState,
    on_ready: Option<ReadyCallback>,
    on_failure: Option<FailureCallback>,
}

impl std::fmt::Debug for RegistrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationCoordinator")
            .field("quorum", &self.quorum)
            .field("registered", &self.registered)
            .field("failure", &self.failure)
            .field("state", &self.state)
            .finish()
    }
}

impl RegistrationCoordinator {
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum,
            registered: 0,
            failure: None,
            state: CoordinatorState::Idle,
            on_ready: None,
            on_failure: None,
        }
    }

    /// Callback run once when the quorum is reached
    pub fn on_ready(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }

    /// Callback run once, with the failure reason, when a registration fails
    pub fn on_failure(mut self, f: impl FnOnce(&str) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn registered_count(&self) -> usize {
        self.registered
    }

    /// Reason of the first failure, if any
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Begin deciding. Outcomes seen while `Idle` are taken into account.
    pub fn start(&mut self) -> CoordinatorState {
        if self.state == CoordinatorState::Idle {
            debug!("Awaiting {} registration(s)", self.quorum);
            self.state = CoordinatorState::AwaitingQuorum;
            self.evaluate();
        }
        self.state
    }

    /// Feed one outcome
    pub fn handle(&mut self, outcome: RegistrationOutcome) -> CoordinatorState {
        if self.state.is_terminal() {
            debug!("Ignoring {:?} in terminal state {:?}", outcome, self.state);
            return self.state;
        }

        match outcome {
            RegistrationOutcome::Registered => {
                self.registered += 1;
                debug!("{}/{} registered", self.registered, self.quorum);
            }
            RegistrationOutcome::Failed { reason } => {
                if self.failure.is_none() {
                    self.failure = Some(reason);
                }
            }
        }
        self.evaluate();
        self.state
    }

    fn evaluate(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        if let Some(reason) = self.failure.clone() {
            self.state = CoordinatorState::Failed;
            error!("Registration failed, disabling: {}", reason);
            if let Some(callback) = self.on_failure.take() {
                callback(&reason);
            }
            return;
        }

        if self.state == CoordinatorState::AwaitingQuorum && self.registered >= self.quorum {
            self.state = CoordinatorState::Ready;
            info!("All {} user agents registered", self.quorum);
            if let Some(callback) = self.on_ready.take() {
                callback();
            }
        }
    }

    /// Feed registration outcomes from the given subscriptions until a
    /// terminal state is reached. If every subscription closes first, that
    /// counts as a failure.
    pub async fn run(
        &mut self,
        subscriptions: Vec<(EndpointAddress, broadcast::Receiver<EndpointEvent>)>,
    ) -> CoordinatorState {
        self.start();

        let mut events = StreamMap::new();
        for (address, receiver) in subscriptions {
            events.insert(address, BroadcastStream::new(receiver));
        }

        while !self.state.is_terminal() {
            match events.next().await {
                Some((address, Ok(event))) => {
                    if let Some(outcome) = RegistrationOutcome::from_event(&event) {
                        debug!("{} reported {:?}", address, outcome);
                        self.handle(outcome);
                    }
                }
                Some((address, Err(BroadcastStreamRecvError::Lagged(n)))) => {
                    warn!("Missed {} event(s) from {}", n, address);
                }
                None => {
                    self.handle(RegistrationOutcome::Failed {
                        reason: "signaling endpoints closed before registering".to_string(),
                    });
                }
            }
        }
        self.state
    }
}

/// Subscribe to every endpoint, keyed by address. Call before registering.
pub fn subscribe_all(
    endpoints: &[Arc<dyn SignalingEndpoint>],
) -> Vec<(EndpointAddress, broadcast::Receiver<EndpointEvent>)> {
    endpoints
        .iter()
        .map(|endpoint| (endpoint.address().clone(), endpoint.subscribe()))
        .collect()
}
