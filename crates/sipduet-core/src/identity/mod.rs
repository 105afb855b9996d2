//! Per-installation identity tokens
//!
//! The demo registers its users on a public signaling domain. To keep
//! concurrent runs of the demo apart, every address carries a random token
//! that is kept for a day and then replaced.
//!
//! # Key Components
//!
//! - **IdentityToken** - token text plus expiry
//! - **TokenStore** - where tokens are persisted (memory or cookie-jar file)
//! - **Clock** - injected time source
//! - **IdentityProvisioner** - get-or-create logic tying the three together

pub mod clock;
pub mod provisioner;
pub mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use provisioner::{DEFAULT_TOKEN_KEY, DEFAULT_TOKEN_TTL_SECS, IdentityProvisioner, TokenSettings};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, format_record, parse_record};
pub use token::{ALPHANUMERIC, DEFAULT_TOKEN_LENGTH, IdentityToken, random_token};
