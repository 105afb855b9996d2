//! Demo orchestration
//!
//! Ties the pieces together in order: identity token, four endpoints,
//! registration quorum, then one call controller per user. If any endpoint
//! fails to register the user is alerted once and no controller is created.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::address::EndpointAddress;
use crate::agent::{AgentFactory, RegistrationState, SignalingBackend, SignalingEndpoint};
use crate::call::{CallController, ControllerHandle, ControllerState};
use crate::config::{DemoConfig, UserConfig};
use crate::error::{DuetError, DuetResult};
use crate::identity::{Clock, IdentityProvisioner, IdentityToken, TokenSettings, TokenStore};
use crate::registration::{
    CoordinatorState, RegistrationCoordinator, RegistrationOutcome, subscribe_all,
};
use crate::ui::DemoUi;

/// Shown when not every endpoint could register
pub const REGISTRATION_FAILED_ALERT: &str = "Max registration limit hit. Could not register all user agents, so they cannot communicate. The app is disabled.";

/// Media and data endpoint of each user
pub const REGISTRATION_QUORUM: usize = 4;

/// Both endpoints of one user
#[derive(Debug, Clone)]
pub struct UserAgents {
    pub user: UserConfig,
    /// Base address, `<handle>.<token>@<domain>`
    pub address: EndpointAddress,
    pub media: Arc<dyn SignalingEndpoint>,
    pub data: Arc<dyn SignalingEndpoint>,
}

impl UserAgents {
    fn create<B: SignalingBackend>(
        factory: &AgentFactory<B>,
        user: &UserConfig,
        token: &IdentityToken,
        domain: &str,
    ) -> Self {
        let address = EndpointAddress::for_user(&user.handle, token.value(), domain);
        Self {
            user: user.clone(),
            media: factory.create_media_agent(&address, &user.display_name),
            data: factory.create_data_agent(&address, &user.display_name),
            address,
        }
    }
}

/// Entry point
pub struct Demo;

impl Demo {
    /// Provision, register and wire up both users.
    ///
    /// Returns [`DuetError::RegistrationFailed`] after alerting through
    /// `ui.notifier` when the quorum cannot be reached. The provisioner must
    /// have been built with [`TokenSettings::from`] the same `config`.
    pub async fn start<B, S, C>(
        config: &DemoConfig,
        backend: B,
        provisioner: &IdentityProvisioner<S, C>,
        ui: DemoUi,
    ) -> DuetResult<DemoSession>
    where
        B: SignalingBackend,
        S: TokenStore,
        C: Clock,
    {
        config.validate()?;
        let expected = TokenSettings::from(config);
        let actual = provisioner.settings();
        if actual.key != expected.key
            || actual.length != expected.length
            || actual.ttl_secs != expected.ttl_secs
        {
            return Err(DuetError::config(format!(
                "provisioner settings {:?} do not match the configured token settings {:?}",
                actual, expected
            )));
        }

        let token = provisioner.get_or_create_token();
        info!("Using identity token {} (expires {})", token.value(), token.expires_at());

        let factory = AgentFactory::new(backend, config.trace_sip);
        let alice = UserAgents::create(&factory, &config.alice, &token, &config.domain);
        let bob = UserAgents::create(&factory, &config.bob, &token, &config.domain);
        let endpoints = vec![
            alice.media.clone(),
            bob.media.clone(),
            alice.data.clone(),
            bob.data.clone(),
        ];

        let subscriptions = subscribe_all(&endpoints);
        let notifier = ui.notifier.clone();
        let mut coordinator = RegistrationCoordinator::new(REGISTRATION_QUORUM)
            .on_ready(|| info!("Demo enabled"))
            .on_failure(move |reason| {
                warn!("Disabling demo: {}", reason);
                notifier.alert(REGISTRATION_FAILED_ALERT);
            });

        for endpoint in &endpoints {
            if let Err(e) = endpoint.register().await {
                warn!("Register of {} errored: {}", endpoint.address(), e);
                coordinator.handle(RegistrationOutcome::Failed {
                    reason: format!("{}: {}", endpoint.address(), e),
                });
                break;
            }
        }

        if coordinator.run(subscriptions).await != CoordinatorState::Ready {
            let reason = coordinator
                .failure_reason()
                .unwrap_or("registration did not complete")
                .to_string();
            stop_all(&endpoints).await;
            return Err(DuetError::registration_failed(reason));
        }

        let alice_controller = CallController::new(
            alice.media.clone(),
            bob.address.clone(),
            ui.video_of_bob.clone(),
            ui.alice_button.clone(),
        )
        .with_busy_policy(config.busy_policy)
        .spawn();

        let bob_controller = CallController::new(
            bob.media.clone(),
            alice.address.clone(),
            ui.video_of_alice.clone(),
            ui.bob_button.clone(),
        )
        .with_busy_policy(config.busy_policy)
        .spawn();

        Ok(DemoSession {
            token,
            alice,
            bob,
            alice_controller,
            bob_controller,
        })
    }
}

/// A running demo
#[derive(Debug)]
pub struct DemoSession {
    token: IdentityToken,
    alice: UserAgents,
    bob: UserAgents,
    alice_controller: ControllerHandle,
    bob_controller: ControllerHandle,
}

impl DemoSession {
    pub fn token(&self) -> &IdentityToken {
        &self.token
    }

    pub fn alice(&self) -> &UserAgents {
        &self.alice
    }

    pub fn bob(&self) -> &UserAgents {
        &self.bob
    }

    pub fn alice_controller(&self) -> &ControllerHandle {
        &self.alice_controller
    }

    pub fn bob_controller(&self) -> &ControllerHandle {
        &self.bob_controller
    }

    /// All four endpoints, media first
    pub fn endpoints(&self) -> Vec<Arc<dyn SignalingEndpoint>> {
        vec![
            self.alice.media.clone(),
            self.bob.media.clone(),
            self.alice.data.clone(),
            self.bob.data.clone(),
        ]
    }

    /// Point-in-time view of the demo
    pub fn status(&self) -> DemoStatus {
        DemoStatus {
            token_expires_at: self.token.expires_at(),
            users: vec![
                UserStatus::of(&self.alice, self.alice_controller.state()),
                UserStatus::of(&self.bob, self.bob_controller.state()),
            ],
        }
    }

    /// Stop both controllers, then every endpoint
    pub async fn shutdown(self) {
        let endpoints = self.endpoints();
        self.alice_controller.shutdown().await;
        self.bob_controller.shutdown().await;
        stop_all(&endpoints).await;
        info!("Demo stopped");
    }
}

/// Serializable snapshot of a running demo
#[derive(Debug, Clone, Serialize)]
pub struct DemoStatus {
    pub token_expires_at: DateTime<Utc>,
    pub users: Vec<UserStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub display_name: String,
    pub media_address: String,
    pub data_address: String,
    pub media_registration: RegistrationState,
    pub data_registration: RegistrationState,
    pub call_state: ControllerState,
}

impl UserStatus {
    fn of(agents: &UserAgents, call_state: ControllerState) -> Self {
        Self {
            display_name: agents.user.display_name.clone(),
            media_address: agents.media.address().to_sip_uri(),
            data_address: agents.data.address().to_sip_uri(),
            media_registration: agents.media.registration_state(),
            data_registration: agents.data.registration_state(),
            call_state,
        }
    }
}

async fn stop_all(endpoints: &[Arc<dyn SignalingEndpoint>]) {
    let results = join_all(endpoints.iter().map(|endpoint| endpoint.stop())).await;
    for (endpoint, result) in endpoints.iter().zip(results) {
        if let Err(e) = result {
            warn!("Failed to stop {}: {}", endpoint.address(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AgentKind;
    use crate::agent::{AgentConfig, CallSession, EndpointEvent, MediaOptions};
    use crate::identity::{ManualClock, MemoryTokenStore};
    use crate::loopback::LoopbackNetwork;
    use crate::ui::HeadlessUi;
    use async_trait::async_trait;
    use chrono::{SubsecRound, Utc};
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tracing_test::traced_test;

    /// Endpoints whose registrar cannot be reached. Event channels stay open.
    #[derive(Default)]
    struct UnreachableBackend {
        endpoints: Mutex<Vec<Arc<UnreachableEndpoint>>>,
    }

    impl UnreachableBackend {
        fn stopped(&self) -> usize {
            self.endpoints.lock().iter().filter(|e| *e.stopped.lock()).count()
        }
    }

    impl SignalingBackend for UnreachableBackend {
        fn create_endpoint(&self, config: AgentConfig) -> Arc<dyn SignalingEndpoint> {
            let (events, _) = broadcast::channel(8);
            let endpoint = Arc::new(UnreachableEndpoint {
                config,
                events,
                stopped: Mutex::new(false),
            });
            self.endpoints.lock().push(endpoint.clone());
            endpoint
        }
    }

    #[derive(Debug)]
    struct UnreachableEndpoint {
        config: AgentConfig,
        events: broadcast::Sender<EndpointEvent>,
        stopped: Mutex<bool>,
    }

    #[async_trait]
    impl SignalingEndpoint for UnreachableEndpoint {
        fn address(&self) -> &EndpointAddress {
            &self.config.address
        }

        fn display_name(&self) -> &str {
            &self.config.display_name
        }

        fn kind(&self) -> AgentKind {
            self.config.kind
        }

        fn registration_state(&self) -> RegistrationState {
            RegistrationState::Unregistered
        }

        fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
            self.events.subscribe()
        }

        async fn register(&self) -> DuetResult<()> {
            Err(DuetError::internal("registrar unreachable"))
        }

        async fn invite(
            &self,
            target: &EndpointAddress,
            _options: MediaOptions,
        ) -> DuetResult<Arc<dyn CallSession>> {
            Err(DuetError::call_setup(target.to_sip_uri(), "not registered"))
        }

        async fn stop(&self) -> DuetResult<()> {
            *self.stopped.lock() = true;
            Ok(())
        }
    }

    fn provisioner() -> IdentityProvisioner<MemoryTokenStore, ManualClock> {
        IdentityProvisioner::new(MemoryTokenStore::new(), ManualClock::new(Utc::now())).with_seed(7)
    }

    #[tokio::test]
    async fn test_start_registers_four_endpoints() {
        let config = DemoConfig::default().with_trace_sip(false);
        let network = LoopbackNetwork::new();
        let ui = HeadlessUi::new(&config);

        let session = Demo::start(&config, network.clone(), &provisioner(), ui.handles())
            .await
            .unwrap();

        assert_eq!(network.registered_count(), 4);
        let token = session.token().value().to_string();
        assert_eq!(
            session.alice().media.address().as_str(),
            format!("alice.{}@sipjs.onsip.com", token)
        );
        assert_eq!(
            session.bob().data.address().as_str(),
            format!("data.bob.{}@sipjs.onsip.com", token)
        );
        assert_eq!(session.alice_controller().state(), ControllerState::Idle);
        assert!(ui.notifier.alerts().is_empty());

        let status = serde_json::to_value(session.status()).unwrap();
        assert_eq!(status["users"][0]["display_name"], "Alice");
        assert_eq!(status["users"][1]["media_registration"], "Registered");
        assert_eq!(status["users"][1]["call_state"], "Idle");

        session.shutdown().await;
        assert_eq!(network.registered_count(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_start_fails_below_quorum() {
        let config = DemoConfig::default().with_trace_sip(false);
        let network = LoopbackNetwork::with_max_registrations(3);
        let ui = HeadlessUi::new(&config);

        let err = Demo::start(&config, network.clone(), &provisioner(), ui.handles())
            .await
            .unwrap_err();

        assert!(matches!(err, DuetError::RegistrationFailed { .. }));
        assert_eq!(ui.notifier.alerts(), vec![REGISTRATION_FAILED_ALERT.to_string()]);
        assert_eq!(network.registered_count(), 0);
        assert!(logs_contain("ALERT: Max registration limit hit"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_refused() {
        let config = DemoConfig::default().with_domain("");
        let ui = HeadlessUi::new(&config);

        let err = Demo::start(&config, LoopbackNetwork::new(), &provisioner(), ui.handles())
            .await
            .unwrap_err();
        assert!(matches!(err, DuetError::Configuration { .. }));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_register_error_disables_demo() {
        let config = DemoConfig::default().with_trace_sip(false);
        let backend = Arc::new(UnreachableBackend::default());
        let ui = HeadlessUi::new(&config);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Demo::start(&config, backend.clone(), &provisioner(), ui.handles()),
        )
        .await
        .expect("start should not hang when register errors");

        let err = result.unwrap_err();
        assert!(matches!(err, DuetError::RegistrationFailed { .. }));
        assert!(err.to_string().contains("registrar unreachable"));
        assert_eq!(ui.notifier.alerts(), vec![REGISTRATION_FAILED_ALERT.to_string()]);
        assert_eq!(backend.stopped(), REGISTRATION_QUORUM);
        assert!(logs_contain("Register of alice."));
    }

    #[tokio::test]
    async fn test_provisioner_must_follow_config() {
        let config = DemoConfig::default().with_token_ttl_secs(60);
        let network = LoopbackNetwork::new();
        let ui = HeadlessUi::new(&config);

        let err = Demo::start(&config, network.clone(), &provisioner(), ui.handles())
            .await
            .unwrap_err();
        assert!(matches!(err, DuetError::Configuration { .. }));
        assert_eq!(network.registered_count(), 0);

        let now = Utc::now();
        let matching = IdentityProvisioner::with_settings(
            MemoryTokenStore::new(),
            ManualClock::new(now),
            TokenSettings::from(&config),
        );
        let session = Demo::start(&config, network.clone(), &matching, ui.handles())
            .await
            .unwrap();
        assert_eq!(
            session.token().expires_at(),
            (now + chrono::Duration::seconds(60)).trunc_subsecs(0)
        );
        session.shutdown().await;
    }
}
