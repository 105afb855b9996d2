//! Get-or-create provisioning of the identity token

use chrono::{Duration, SubsecRound};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::store::TokenStore;
use super::token::{ALPHANUMERIC, DEFAULT_TOKEN_LENGTH, IdentityToken, random_token};
use crate::config::DemoConfig;

/// Storage key used for the token record
pub const DEFAULT_TOKEN_KEY: &str = "onsipToken";

/// Default token lifetime: one day
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60 * 24;

/// How tokens are named, shaped and aged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    pub key: String,
    pub length: usize,
    pub alphabet: String,
    pub ttl_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            key: DEFAULT_TOKEN_KEY.to_string(),
            length: DEFAULT_TOKEN_LENGTH,
            alphabet: ALPHANUMERIC.to_string(),
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

impl From<&DemoConfig> for TokenSettings {
    fn from(config: &DemoConfig) -> Self {
        Self {
            key: config.token_key.clone(),
            length: config.token_length,
            alphabet: ALPHANUMERIC.to_string(),
            ttl_secs: config.token_ttl_secs,
        }
    }
}

/// Hands out the identity token, creating and persisting a new one when the
/// stored record is missing or has expired.
///
/// The store and clock are injected so expiry can be exercised without
/// waiting a day.
///
/// # Examples
///
/// ```rust
/// use sipduet_core::identity::{IdentityProvisioner, ManualClock, MemoryTokenStore};
/// use chrono::{Duration, Utc};
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::new(Utc::now()));
/// let provisioner = IdentityProvisioner::new(MemoryTokenStore::new(), clock.clone());
///
/// let first = provisioner.get_or_create_token();
/// clock.advance(Duration::hours(23));
/// assert_eq!(provisioner.get_or_create_token(), first);
///
/// clock.advance(Duration::hours(2));
/// assert_ne!(provisioner.get_or_create_token().expires_at(), first.expires_at());
/// ```
pub struct IdentityProvisioner<S, C> {
    store: S,
    clock: C,
    settings: TokenSettings,
    rng: Mutex<StdRng>,
}

impl<S: TokenStore, C: Clock> IdentityProvisioner<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self::with_settings(store, clock, TokenSettings::default())
    }

    pub fn with_settings(store: S, clock: C, settings: TokenSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a deterministic generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return the stored token if it is still valid, otherwise mint and store
    /// a fresh one. Store failures are logged and never surfaced.
    pub fn get_or_create_token(&self) -> IdentityToken {
        let now = self.clock.now();
        let key = &self.settings.key;

        match self.store.load(key) {
            Ok(Some(token)) if token.is_valid_at(now) => {
                debug!("Reusing identity token (expires {})", token.expires_at());
                return token;
            }
            Ok(Some(token)) => {
                info!("Identity token expired at {}, minting a new one", token.expires_at());
            }
            Ok(None) => {
                debug!("No identity token stored under {}", key);
            }
            Err(e) => {
                warn!("Could not read identity token, treating as absent: {}", e);
            }
        }

        let value = random_token(
            &mut *self.rng.lock(),
            self.settings.length,
            &self.settings.alphabet,
        );
        let ttl = Duration::seconds(i64::try_from(self.settings.ttl_secs).unwrap_or(i64::MAX / 1000));
        // Stored records carry whole seconds only
        let token = IdentityToken::new(value, (now + ttl).trunc_subsecs(0));

        if let Err(e) = self.store.save(key, &token) {
            warn!("Could not persist identity token: {}", e);
        } else {
            info!("Minted identity token valid until {}", token.expires_at());
        }
        token
    }
}
