//! In-process signaling backend
//!
//! Stands in for a real SIP stack so the demo runs headlessly: registration
//! is a map insert, an invite is a channel send, and media devices are
//! simulated. With `trace_sip` enabled every simulated request and response
//! is logged under the `sipduet_core::sip` target.

mod endpoint;
mod network;
mod session;

pub use endpoint::LoopbackEndpoint;
pub use network::{LoopbackNetwork, REGISTRATION_LIMIT_REASON};
pub use session::LoopbackSession;
