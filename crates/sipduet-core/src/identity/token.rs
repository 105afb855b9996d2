//! Identity token value type and generator

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Digits followed by lower and upper case ASCII letters
pub const ALPHANUMERIC: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default number of characters in a generated token
pub const DEFAULT_TOKEN_LENGTH: usize = 32;

/// A per-installation pseudo-identity together with the instant it stops
/// being valid.
///
/// Tokens namespace the demo users on the shared signaling domain so that two
/// people running the demo at the same time do not end up calling each other.
///
/// # Examples
///
/// ```rust
/// use sipduet_core::identity::IdentityToken;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let token = IdentityToken::new("abc123", now + Duration::hours(24));
///
/// assert!(token.is_valid_at(now));
/// assert!(!token.is_valid_at(now + Duration::hours(25)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl IdentityToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The token text used inside endpoint addresses
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// A token is usable while it is non-empty and `now` is before its expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.value.is_empty() && now < self.expires_at
    }
}

impl std::fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Draw `length` independent uniform samples from `alphabet`.
///
/// An empty alphabet yields an empty string.
pub fn random_token<R: Rng + ?Sized>(rng: &mut R, length: usize, alphabet: &str) -> String {
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    (0..length)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect()
}
