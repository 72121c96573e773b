//! Signing key resolution from an issuer's JWK set.
//!
//! Provides:
//! - Key lookup by `kid` with a bounded TTL cache
//! - Single-flight refresh: concurrent misses for one `kid` share a fetch
//! - Retry middleware with exponential backoff on the key set request
//! - A minimum refetch interval for unknown key ids
//! - Stale keys from the last fetched set while the endpoint is unreachable

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use moka::future::Cache;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{KeyError, KeyResult};

/// A verification key taken from the issuer's key set.
pub struct SigningKey {
    /// Key id.
    pub kid: String,

    /// Algorithm pinned by the key's `alg` member, if published.
    pub algorithm: Option<Algorithm>,

    key: DecodingKey,
}

impl SigningKey {
    /// Build a verification key from a JWK.
    ///
    /// Symmetric keys and keys published for encryption are refused.
    pub fn from_jwk(jwk: &Jwk) -> KeyResult<Self> {
        let kid = jwk.common.key_id.clone().unwrap_or_default();

        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return Err(KeyError::unsupported(kid, "key is published for encryption"));
        }
        if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
            return Err(KeyError::unsupported(kid, "symmetric keys are not accepted"));
        }

        let key = DecodingKey::from_jwk(jwk).map_err(|e| KeyError::unsupported(&kid, e.to_string()))?;
        let algorithm = jwk.common.key_algorithm.and_then(signing_algorithm);

        Ok(Self { kid, algorithm, key })
    }

    /// Key material for signature verification.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

fn signing_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

struct FetchedSet {
    fetched_at: Instant,
    set: Arc<JwkSet>,
}

/// Cache of one issuer's signing keys, keyed by `kid`.
#[derive(Clone)]
pub struct JwksCache {
    /// HTTP client with retry middleware.
    client: ClientWithMiddleware,

    /// Key set endpoint.
    jwks_url: String,

    /// Resolved keys.
    keys: Cache<String, Arc<SigningKey>>,

    /// Most recently fetched set, reused for unknown ids inside the refresh interval.
    last_set: Arc<RwLock<Option<FetchedSet>>>,

    /// Minimum time between fetches caused by unknown key ids.
    min_refresh_interval: Duration,

    /// Age limit on `last_set` when serving it during a key set outage.
    stale_key_grace: Duration,
}

impl JwksCache {
    /// Create a key cache for the configured key set endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(200), Duration::from_secs(5))
            .build_with_max_retries(config.jwks_max_retries);

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let keys = Cache::builder()
            .max_capacity(config.key_cache_max_size)
            .time_to_live(config.key_cache_ttl)
            .build();

        Ok(Self {
            client,
            jwks_url: config.jwks_url.clone(),
            keys,
            last_set: Arc::new(RwLock::new(None)),
            min_refresh_interval: config.min_refresh_interval,
            stale_key_grace: config.stale_key_grace,
        })
    }

    /// Key set endpoint this cache reads from.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Resolve the signing key for `kid`.
    ///
    /// Hits are served without I/O. A miss fetches the key set once for all
    /// concurrent callers asking for the same `kid`; if the fetching caller is
    /// dropped, a waiting caller takes the fetch over. Failures are not cached.
    ///
    /// If the key set endpoint is unreachable, a key from the last fetched set
    /// is served as long as that set is within the stale grace period. Stale
    /// keys are not cached, so the next request tries the endpoint again.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, Arc<KeyError>> {
        match self.keys.try_get_with(kid.to_owned(), self.load(kid)).await {
            Err(err) if err.is_resolution_failure() => match self.stale_key(kid).await {
                Some(key) => {
                    tracing::warn!(kid, error = %err, "Key set unreachable, serving stale signing key");
                    Ok(key)
                }
                None => Err(err),
            },
            result => result,
        }
    }

    /// Fetch the key set now and cache every usable key.
    ///
    /// Returns the number of keys cached.
    pub async fn prefetch(&self) -> KeyResult<usize> {
        let set = Arc::new(self.fetch().await?);

        let mut cached = 0;
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.as_deref() else {
                continue;
            };
            if let Ok(key) = SigningKey::from_jwk(jwk) {
                self.keys.insert(kid.to_owned(), Arc::new(key)).await;
                cached += 1;
            }
        }

        self.remember(set).await;
        Ok(cached)
    }

    /// Drop every cached key.
    pub fn invalidate_all(&self) {
        self.keys.invalidate_all();
    }

    async fn load(&self, kid: &str) -> KeyResult<Arc<SigningKey>> {
        let set = self.current_set().await?;

        let mut wanted = None;
        for jwk in &set.keys {
            let Some(id) = jwk.common.key_id.as_deref() else {
                continue;
            };
            match SigningKey::from_jwk(jwk) {
                Ok(key) if id == kid => wanted = Some(Ok(Arc::new(key))),
                Ok(key) => self.keys.insert(id.to_owned(), Arc::new(key)).await,
                Err(err) if id == kid => wanted = Some(Err(err)),
                Err(err) => tracing::debug!(kid = id, error = %err, "Skipping unusable key"),
            }
        }

        wanted.unwrap_or_else(|| {
            tracing::debug!(kid, "Key id not present in key set");
            Err(KeyError::unknown_key(kid))
        })
    }

    /// The last fetched set if it is recent enough, otherwise a fresh one.
    async fn current_set(&self) -> KeyResult<Arc<JwkSet>> {
        {
            let guard = self.last_set.read().await;
            if let Some(fetched) = guard.as_ref() {
                if fetched.fetched_at.elapsed() < self.min_refresh_interval {
                    return Ok(Arc::clone(&fetched.set));
                }
            }
        }

        let set = Arc::new(self.fetch().await?);
        self.remember(Arc::clone(&set)).await;
        Ok(set)
    }

    /// `kid` from the last fetched set, if that set is inside the grace period.
    async fn stale_key(&self, kid: &str) -> Option<Arc<SigningKey>> {
        let guard = self.last_set.read().await;
        let fetched = guard.as_ref()?;
        if fetched.fetched_at.elapsed() > self.stale_key_grace {
            return None;
        }

        let jwk = fetched.set.keys.iter().find(|jwk| jwk.common.key_id.as_deref() == Some(kid))?;
        SigningKey::from_jwk(jwk).ok().map(Arc::new)
    }

    async fn remember(&self, set: Arc<JwkSet>) {
        *self.last_set.write().await = Some(FetchedSet { fetched_at: Instant::now(), set });
    }

    async fn fetch(&self) -> KeyResult<JwkSet> {
        tracing::debug!(url = %self.jwks_url, "Fetching signing key set");

        let response = self.client.get(&self.jwks_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.jwks_url, status = status.as_u16(), "Key set fetch failed");
            return Err(KeyError::Status { status: status.as_u16(), url: self.jwks_url.clone() });
        }

        let body = response.bytes().await?;
        let set: JwkSet = serde_json::from_slice(&body)?;

        tracing::info!(url = %self.jwks_url, keys = set.keys.len(), "Fetched signing key set");
        Ok(set)
    }
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("jwks_url", &self.jwks_url)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .field("stale_key_grace", &self.stale_key_grace)
            .finish()
    }
}
