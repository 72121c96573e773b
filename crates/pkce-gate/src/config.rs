//! Configuration for the bearer-token gate.

use std::time::Duration;

use anyhow::Context;

/// Default values for gate configuration.
pub mod defaults {
    use std::time::Duration;

    /// Allowed clock drift on `exp` / `nbf`.
    pub const CLOCK_SKEW: Duration = Duration::from_secs(5);

    /// Resolved signing key TTL (10 minutes).
    pub const KEY_CACHE_TTL: Duration = Duration::from_secs(600);

    /// Maximum number of cached signing keys.
    pub const KEY_CACHE_MAX_SIZE: u64 = 64;

    /// Minimum time between two key set fetches triggered by unknown key ids.
    pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

    /// How long keys from the last fetched set may still be served while the
    /// key set endpoint is unreachable.
    pub const STALE_KEY_GRACE: Duration = Duration::from_secs(3600);

    /// Retries for a failed key set fetch.
    pub const JWKS_MAX_RETRIES: u32 = 2;

    /// Key set request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// HTTP listen port.
    pub const PORT: u16 = 3001;

    /// Well-known key set path under the issuer.
    pub const JWKS_PATH: &str = ".well-known/jwks.json";
}

/// Gate configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Expected `iss` claim.
    pub issuer: String,

    /// Expected `aud` claim.
    pub audience: String,

    /// Key set endpoint.
    pub jwks_url: String,

    /// Tolerated clock drift.
    pub clock_skew: Duration,

    /// Signing key TTL in the cache.
    pub key_cache_ttl: Duration,

    /// Maximum cached signing keys.
    pub key_cache_max_size: u64,

    /// Minimum interval between refetches for unknown key ids.
    pub min_refresh_interval: Duration,

    /// Age limit for serving keys from the last fetched set when a refetch fails.
    pub stale_key_grace: Duration,

    /// Retries for transient key set fetch failures.
    pub jwks_max_retries: u32,

    /// Key set request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Config {
    /// Create a configuration for an issuer and audience.
    ///
    /// The key set URL defaults to `<issuer>/.well-known/jwks.json`.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        let issuer = issuer.into();
        Self {
            jwks_url: default_jwks_url(&issuer),
            issuer,
            audience: audience.into(),
            clock_skew: defaults::CLOCK_SKEW,
            key_cache_ttl: defaults::KEY_CACHE_TTL,
            key_cache_max_size: defaults::KEY_CACHE_MAX_SIZE,
            min_refresh_interval: defaults::MIN_REFRESH_INTERVAL,
            stale_key_grace: defaults::STALE_KEY_GRACE,
            jwks_max_retries: defaults::JWKS_MAX_RETRIES,
            request_timeout: defaults::REQUEST_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
        }
    }

    /// Override the key set URL.
    #[must_use]
    pub fn with_jwks_url(mut self, jwks_url: impl Into<String>) -> Self {
        self.jwks_url = jwks_url.into();
        self
    }

    /// Override the allowed clock skew.
    #[must_use]
    pub const fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Override the signing key TTL.
    #[must_use]
    pub const fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl = ttl;
        self
    }

    /// Override how long stale keys may be served during a key set outage.
    #[must_use]
    pub const fn with_stale_key_grace(mut self, grace: Duration) -> Self {
        self.stale_key_grace = grace;
        self
    }

    /// Create a test configuration against a mock issuer.
    ///
    /// Unknown key ids always refetch and failed fetches are not retried.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            issuer: base_url.to_string(),
            audience: "https://api.pkce-gate.test".to_string(),
            jwks_url: default_jwks_url(base_url),
            clock_skew: defaults::CLOCK_SKEW,
            key_cache_ttl: Duration::from_secs(60),
            key_cache_max_size: 16,
            min_refresh_interval: Duration::ZERO,
            stale_key_grace: Duration::from_secs(300),
            jwks_max_retries: 0,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `ISSUER_URL` and `AUDIENCE` (required), `JWKS_URL`,
    /// `CLOCK_SKEW_SECS`, `JWKS_CACHE_TTL_SECS` and `JWKS_STALE_GRACE_SECS`
    /// (optional).
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing or a value is invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        let issuer = std::env::var("ISSUER_URL").context("ISSUER_URL must be set")?;
        url::Url::parse(&issuer).context("ISSUER_URL is not a valid URL")?;
        let audience = std::env::var("AUDIENCE").context("AUDIENCE must be set")?;

        let mut config = Self::new(issuer, audience);
        if let Ok(jwks_url) = std::env::var("JWKS_URL") {
            config.jwks_url = jwks_url;
        }
        if let Some(secs) = env_secs("CLOCK_SKEW_SECS")? {
            config.clock_skew = secs;
        }
        if let Some(secs) = env_secs("JWKS_CACHE_TTL_SECS")? {
            config.key_cache_ttl = secs;
        }
        if let Some(secs) = env_secs("JWKS_STALE_GRACE_SECS")? {
            config.stale_key_grace = secs;
        }
        Ok(config)
    }
}

fn env_secs(name: &str) -> anyhow::Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw.trim().parse().with_context(|| format!("{name} must be whole seconds"))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

/// Derive the well-known key set URL for an issuer.
#[must_use]
pub fn default_jwks_url(issuer: &str) -> String {
    format!("{}/{}", issuer.trim_end_matches('/'), defaults::JWKS_PATH)
}
