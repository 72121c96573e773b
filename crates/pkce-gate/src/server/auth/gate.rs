//! Bearer-token gate for protected routes.
//!
//! Each request runs through one decision:
//!
//! 1. No `Authorization: Bearer <token>` header: `MissingToken` (401)
//! 2. Signing key for the token's `kid` cannot be fetched: `KeyResolutionFailed` (503)
//! 3. Signature, `exp`/`nbf`, `iss` or `aud` check fails: `InvalidToken` (401)
//! 4. Otherwise the request is admitted and [`Claims`] are inserted into the
//!    request extensions, the only place handlers read them from.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use jsonwebtoken::{Algorithm, Validation};

use super::claims::Claims;
use super::jwks::JwksCache;
use crate::config::Config;
use crate::error::{InvalidTokenReason, Rejection};

/// Signature algorithms the gate accepts. Symmetric algorithms are excluded
/// so a public key can never be used as an HMAC secret.
pub const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Claims every admitted token must carry.
const REQUIRED_CLAIMS: &[&str] = &["exp", "iss", "aud"];

/// Validates bearer tokens against one issuer.
#[derive(Debug)]
pub struct TokenValidator {
    keys: JwksCache,
    issuer: String,
    audience: String,
    clock_skew: Duration,
}

impl TokenValidator {
    #[must_use]
    pub fn new(keys: JwksCache, config: &Config) -> Self {
        Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            clock_skew: config.clock_skew,
        }
    }

    /// Key cache backing this validator.
    #[must_use]
    pub const fn keys(&self) -> &JwksCache {
        &self.keys
    }

    /// Validate a raw token and return its claims.
    pub async fn validate(&self, token: &str) -> Result<Claims, Rejection> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| Rejection::invalid(InvalidTokenReason::Malformed))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(Rejection::invalid(InvalidTokenReason::UnsupportedAlgorithm));
        }
        let Some(kid) = header.kid else {
            return Err(Rejection::invalid(InvalidTokenReason::MissingKeyId));
        };

        let key = self.keys.resolve(&kid).await.map_err(|err| {
            let rejection = Rejection::from(err.as_ref());
            if err.is_resolution_failure() {
                tracing::warn!(kid = %kid, error = %err, "Signing key resolution failed");
            }
            rejection
        })?;

        if key.algorithm.is_some_and(|alg| alg != header.alg) {
            return Err(Rejection::invalid(InvalidTokenReason::UnsupportedAlgorithm));
        }

        let data = jsonwebtoken::decode::<Claims>(token, key.decoding_key(), &self.validation(header.alg))
            .map_err(|err| Rejection::invalid(InvalidTokenReason::from(err.kind())))?;

        Ok(data.claims)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(REQUIRED_CLAIMS);
        validation
    }
}

/// Cloneable handle to the gate, used as middleware state.
#[derive(Debug, Clone)]
pub struct BearerGate {
    validator: Arc<TokenValidator>,
}

impl BearerGate {
    #[must_use]
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator: Arc::new(validator) }
    }

    /// Build a gate with its own key cache from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the key set HTTP client cannot be built.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let keys = JwksCache::new(config)?;
        Ok(Self::new(TokenValidator::new(keys, config)))
    }

    /// Underlying validator.
    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Decide whether a request carrying `headers` may proceed.
    pub async fn admit(&self, headers: &HeaderMap) -> Result<Claims, Rejection> {
        let token = bearer_token(headers).ok_or(Rejection::MissingToken)?;
        self.validator.validate(&token).await
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let Authorization(bearer) = headers.typed_get::<Authorization<Bearer>>()?;
    let token = bearer.token().trim();
    (!token.is_empty()).then(|| token.to_owned())
}

/// Middleware that admits or rejects the request before the handler runs.
pub async fn require_bearer(
    State(gate): State<BearerGate>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.admit(request.headers()).await {
        Ok(claims) => {
            tracing::debug!(sub = claims.subject().unwrap_or("-"), "Admitted bearer token");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(rejection) => {
            tracing::debug!(kind = rejection.kind(), reason = %rejection, "Rejected request");
            rejection.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header};

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extracted() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def.ghi")).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_token_missing_or_malformed() {
        assert!(bearer_token(&HeaderMap::new()).is_none());
        assert!(bearer_token(&headers_with("Basic dXNlcjpwYXNz")).is_none());
        assert!(bearer_token(&headers_with("abc.def.ghi")).is_none());
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed() {
        let gate = BearerGate::from_config(&Config::for_testing("http://127.0.0.1:9")).unwrap();
        let err = gate.admit(&headers_with("Bearer not-a-jwt")).await.unwrap_err();
        assert_eq!(err, Rejection::invalid(InvalidTokenReason::Malformed));
    }

    #[tokio::test]
    async fn test_symmetric_algorithm_refused_before_key_lookup() {
        // {"alg":"HS256","typ":"JWT","kid":"k"}.{"sub":"x"}.sig
        let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCIsImtpZCI6ImsifQ.eyJzdWIiOiJ4In0.c2ln";
        let gate = BearerGate::from_config(&Config::for_testing("http://127.0.0.1:9")).unwrap();
        let err = gate.admit(&headers_with(&format!("Bearer {token}"))).await.unwrap_err();
        assert_eq!(err, Rejection::invalid(InvalidTokenReason::UnsupportedAlgorithm));
    }
}
