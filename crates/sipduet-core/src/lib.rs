//! # sipduet - two-user SIP video calling demo
//!
//! Two users, Alice and Bob, each get an audio/video endpoint and a data-only
//! endpoint on a shared signaling domain. Once all four endpoints are
//! registered, each user has one button that calls the other party or hangs
//! up, and calls are answered automatically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sipduet_core::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DemoConfig::default();
//!     let ui = HeadlessUi::new(&config);
//!     let provisioner = IdentityProvisioner::new(MemoryTokenStore::new(), SystemClock);
//!
//!     let demo = Demo::start(&config, LoopbackNetwork::new(), &provisioner, ui.handles()).await?;
//!
//!     demo.alice_controller().click()?;
//!     demo.bob_controller().wait_for(ControllerState::OnCall).await?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     demo.alice_controller().click()?;
//!
//!     demo.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - [`identity`] - per-installation token, persisted for a day
//! - [`agent`] - signaling seam and the factory for media/data endpoints
//! - [`registration`] - all-or-nothing registration quorum
//! - [`call`] - the call/hang-up state machine
//! - [`message`] - chat message rendering
//! - [`demo`] - wires everything together
//! - [`loopback`] - in-process signaling backend

pub mod address;
pub mod agent;
pub mod call;
pub mod config;
pub mod demo;
pub mod error;
pub mod identity;
pub mod logging;
pub mod loopback;
pub mod message;
pub mod registration;
pub mod ui;

pub use error::{DuetError, DuetResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used types
pub mod prelude {
    pub use crate::address::{AgentKind, EndpointAddress};
    pub use crate::agent::{
        AgentFactory, CallSession, EndpointEvent, MediaOptions, SessionEvent, SignalingBackend,
        SignalingEndpoint,
    };
    pub use crate::call::{BusyPolicy, CallController, ControllerHandle, ControllerState};
    pub use crate::config::{DemoConfig, UserConfig};
    pub use crate::demo::{Demo, DemoSession};
    pub use crate::error::{DuetError, DuetResult};
    pub use crate::identity::{
        FileTokenStore, IdentityProvisioner, IdentityToken, MemoryTokenStore, SystemClock,
    };
    pub use crate::loopback::LoopbackNetwork;
    pub use crate::message::render_message;
    pub use crate::registration::RegistrationCoordinator;
    pub use crate::ui::{DemoUi, HeadlessUi};
}
