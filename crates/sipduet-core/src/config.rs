//! Demo configuration
//!
//! [`DemoConfig`] carries everything the demo needs to know up front: the
//! signaling domain, how identity tokens are shaped, and who the two users
//! are. Every field has a default matching the public demo, so an empty TOML
//! file is a valid configuration.
//!
//! ```rust
//! use sipduet_core::config::DemoConfig;
//!
//! let config = DemoConfig::from_toml_str(r#"
//!     domain = "sip.example.org"
//!     trace_sip = false
//!
//!     [alice]
//!     handle = "carol"
//!     display_name = "Carol"
//! "#).unwrap();
//!
//! assert_eq!(config.domain, "sip.example.org");
//! assert_eq!(config.alice.display_name, "Carol");
//! assert_eq!(config.bob.handle, "bob");
//! assert_eq!(config.token_length, 32);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::call::BusyPolicy;
use crate::error::{DuetError, DuetResult};
use crate::identity::{DEFAULT_TOKEN_KEY, DEFAULT_TOKEN_LENGTH, DEFAULT_TOKEN_TTL_SECS};

/// A user with this handle would share its address with its data endpoint
const RESERVED_HANDLE: &str = "data";

/// Public demo domain that accepts unauthenticated registrations
pub const DEFAULT_DOMAIN: &str = "sipjs.onsip.com";

/// Longest token lifetime accepted by [`DemoConfig::validate`] (ten years)
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// One of the two demo users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Address prefix, e.g. `alice`
    pub handle: String,
    /// Name shown to the remote party
    pub display_name: String,
}

impl UserConfig {
    pub fn new(handle: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            display_name: display_name.into(),
        }
    }

    pub fn alice() -> Self {
        Self::new("alice", "Alice")
    }

    pub fn bob() -> Self {
        Self::new("bob", "Bob")
    }

    /// Id of this user's call button
    pub fn button_id(&self) -> String {
        format!("{}-video-button", self.handle)
    }

    /// Id of the surface that shows this user's video to the other party
    pub fn video_id(&self) -> String {
        format!("video-of-{}", self.handle)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Signaling domain all four endpoints register on
    pub domain: String,
    /// Storage key of the identity token record
    pub token_key: String,
    /// Characters per identity token
    pub token_length: usize,
    /// Identity token lifetime in seconds
    pub token_ttl_secs: u64,
    /// Log every signaling message
    pub trace_sip: bool,
    /// First user
    pub alice: UserConfig,
    /// Second user
    pub bob: UserConfig,
    /// What a controller does with an invite while it is already on a call
    pub busy_policy: BusyPolicy,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            token_length: DEFAULT_TOKEN_LENGTH,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            trace_sip: true,
            alice: UserConfig::alice(),
            bob: UserConfig::bob(),
            busy_policy: BusyPolicy::default(),
        }
    }
}

impl DemoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> DuetResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> DuetResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length;
        self
    }

    pub fn with_token_ttl_secs(mut self, ttl: u64) -> Self {
        self.token_ttl_secs = ttl;
        self
    }

    pub fn with_trace_sip(mut self, trace: bool) -> Self {
        self.trace_sip = trace;
        self
    }

    pub fn with_users(mut self, alice: UserConfig, bob: UserConfig) -> Self {
        self.alice = alice;
        self.bob = bob;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// Check the configuration for values the demo cannot work with
    pub fn validate(&self) -> DuetResult<()> {
        if self.domain.trim().is_empty() {
            return Err(DuetError::config("domain must not be empty"));
        }
        if self.domain.contains('@') || self.domain.contains(char::is_whitespace) {
            return Err(DuetError::config(format!("invalid domain '{}'", self.domain)));
        }
        if self.token_key.trim().is_empty() || self.token_key.contains(['=', ';']) {
            return Err(DuetError::config(format!("invalid token key '{}'", self.token_key)));
        }
        if self.token_length == 0 {
            return Err(DuetError::config("token length must be greater than zero"));
        }
        if self.token_ttl_secs == 0 || self.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(DuetError::config(format!(
                "token TTL must be between 1 and {} seconds",
                MAX_TOKEN_TTL_SECS
            )));
        }
        for user in [&self.alice, &self.bob] {
            if user.handle.is_empty()
                || !user
                    .handle
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(DuetError::config(format!("invalid user handle '{}'", user.handle)));
            }
            // `data.` prefixes the data-only endpoint address
            if user.handle == RESERVED_HANDLE {
                return Err(DuetError::config(format!(
                    "user handle '{}' is reserved for data endpoints",
                    user.handle
                )));
            }
        }
        if self.alice.handle == self.bob.handle {
            return Err(DuetError::config("the two users need distinct handles"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_public_demo() {
        let config = DemoConfig::default();
        assert_eq!(config.domain, "sipjs.onsip.com");
        assert_eq!(config.token_key, "onsipToken");
        assert_eq!(config.token_length, 32);
        assert_eq!(config.token_ttl_secs, 86_400);
        assert!(config.trace_sip);
        assert_eq!(config.busy_policy, BusyPolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ui_ids() {
        let alice = UserConfig::alice();
        assert_eq!(alice.button_id(), "alice-video-button");
        assert_eq!(alice.video_id(), "video-of-alice");
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(DemoConfig::from_toml_str("").unwrap(), DemoConfig::default());
    }

    #[test]
    fn test_busy_policy_from_toml() {
        let config = DemoConfig::from_toml_str("busy_policy = \"replace\"").unwrap();
        assert_eq!(config.busy_policy, BusyPolicy::Replace);
    }

    #[test]
    fn test_validation_failures() {
        assert!(DemoConfig::new().with_domain("").validate().is_err());
        assert!(DemoConfig::new().with_domain("a@b").validate().is_err());
        assert!(DemoConfig::new().with_token_length(0).validate().is_err());
        assert!(DemoConfig::new().with_token_ttl_secs(0).validate().is_err());
        assert!(
            DemoConfig::new()
                .with_users(UserConfig::alice(), UserConfig::new("alice", "Other"))
                .validate()
                .is_err()
        );
        assert!(
            DemoConfig::new()
                .with_users(UserConfig::new("al ice", "A"), UserConfig::bob())
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_data_handle_is_reserved() {
        let err = DemoConfig::new()
            .with_users(UserConfig::alice(), UserConfig::new("data", "Data"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, DuetError::Configuration { .. }));
        assert!(
            DemoConfig::new()
                .with_users(UserConfig::new("database", "D"), UserConfig::bob())
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_invalid_toml() {
        let err = DemoConfig::from_toml_str("token_length = \"long\"").unwrap_err();
        assert!(matches!(err, DuetError::Toml(_)));
    }
}
