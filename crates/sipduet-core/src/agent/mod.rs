//! Signaling endpoints ("agents")
//!
//! - **endpoint** - the traits a signaling backend implements, and their events
//! - **media** - media options and local stream strategies
//! - **factory** - builds the media and data-only endpoint of a user

pub mod endpoint;
pub mod factory;
pub mod media;

pub use endpoint::{
    AgentConfig, CallSession, EndpointEvent, RegistrationState, SessionEvent, SessionId,
    SessionState, SignalingBackend, SignalingEndpoint,
};
pub use factory::AgentFactory;
pub use media::{
    CaptureStreamManager, MediaConstraints, MediaKind, MediaOptions, MediaStream,
    MediaStreamManager, NullStreamManager, RenderTargets,
};
