//! Error types for PKCE generation and the bearer-token gate.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors from the PKCE generator.
#[derive(thiserror::Error, Debug)]
pub enum PkceError {
    /// The secure random source could not be read.
    #[error("Secure entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// Verifier byte length must be between 1 and 1024.
    #[error("Invalid verifier length: {0} bytes (must be 1..=1024)")]
    InvalidLength(usize),

    /// Authorization endpoint or redirect URI is not a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl PkceError {
    /// Create an entropy error.
    #[must_use]
    pub fn entropy(message: impl Into<String>) -> Self {
        Self::EntropyUnavailable(message.into())
    }
}

/// Errors from signing-key resolution.
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    /// Transport failure after retries (connection, DNS, TLS, etc.)
    #[error("Key set fetch failed: {0}")]
    Fetch(#[from] reqwest_middleware::Error),

    /// Body could not be read.
    #[error("Key set read failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Key set endpoint answered with a non-success status.
    #[error("Key set endpoint {url} returned {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Key set URL
        url: String,
    },

    /// Key set body is not a valid JWK set.
    #[error("Failed to parse key set: {0}")]
    Parse(#[from] serde_json::Error),

    /// No key with this id in a freshly fetched set.
    #[error("No signing key with kid '{kid}'")]
    UnknownKey {
        /// Requested key id
        kid: String,
    },

    /// The key exists but cannot be used for signature verification.
    #[error("Unusable signing key '{kid}': {message}")]
    UnsupportedKey {
        /// Key id
        kid: String,
        /// Why the key was refused
        message: String,
    },
}

impl KeyError {
    /// Create an unknown key error.
    #[must_use]
    pub fn unknown_key(kid: impl Into<String>) -> Self {
        Self::UnknownKey { kid: kid.into() }
    }

    /// Create an unsupported key error.
    #[must_use]
    pub fn unsupported(kid: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedKey { kid: kid.into(), message: message.into() }
    }

    /// Returns true if the failure lies with the key set endpoint rather than the token.
    #[must_use]
    pub const fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Http(_) | Self::Status { .. } | Self::Parse(_))
    }
}

/// Why a presented token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidTokenReason {
    /// `exp` is in the past (beyond the allowed skew).
    Expired,
    /// `nbf` is in the future (beyond the allowed skew).
    NotYetValid,
    /// Signature does not verify against the resolved key.
    BadSignature,
    /// `iss` does not match the configured issuer.
    WrongIssuer,
    /// `aud` does not contain the configured audience.
    WrongAudience,
    /// Header algorithm is symmetric, unknown, or disagrees with the key.
    UnsupportedAlgorithm,
    /// Header carries no `kid`.
    MissingKeyId,
    /// `kid` is not in the issuer's key set.
    UnknownKey,
    /// Not a decodable JWT, or a required claim is missing.
    Malformed,
}

impl InvalidTokenReason {
    /// Short machine-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::BadSignature => "bad_signature",
            Self::WrongIssuer => "wrong_issuer",
            Self::WrongAudience => "wrong_audience",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::MissingKeyId => "missing_key_id",
            Self::UnknownKey => "unknown_key",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for InvalidTokenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&jsonwebtoken::errors::ErrorKind> for InvalidTokenReason {
    fn from(kind: &jsonwebtoken::errors::ErrorKind) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match kind {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature => Self::BadSignature,
            ErrorKind::InvalidIssuer => Self::WrongIssuer,
            ErrorKind::InvalidAudience => Self::WrongAudience,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::UnsupportedAlgorithm,
            _ => Self::Malformed,
        }
    }
}

/// Terminal outcome of the bearer gate for a refused request.
///
/// Rejections are routine: they end the current request with a structured
/// response and never propagate as faults.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No `Authorization: Bearer <token>` header.
    #[error("Authorization header with a Bearer token is required")]
    MissingToken,

    /// Token was presented but failed validation.
    #[error("Token rejected: {reason}")]
    InvalidToken {
        /// Which check failed
        reason: InvalidTokenReason,
    },

    /// Signing keys could not be fetched and none are cached.
    #[error("Signing keys unavailable: {message}")]
    KeyResolutionFailed {
        /// Underlying resolution failure
        message: String,
    },
}

impl Rejection {
    /// Create an invalid token rejection.
    #[must_use]
    pub const fn invalid(reason: InvalidTokenReason) -> Self {
        Self::InvalidToken { reason }
    }

    /// Machine-readable error kind used in response bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken { .. } => "invalid_token",
            Self::KeyResolutionFailed { .. } => "key_resolution_failed",
        }
    }

    /// HTTP status for this rejection.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            Self::KeyResolutionFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<&KeyError> for Rejection {
    fn from(err: &KeyError) -> Self {
        match err {
            KeyError::UnknownKey { .. } => Self::invalid(InvalidTokenReason::UnknownKey),
            KeyError::UnsupportedKey { .. } => Self::invalid(InvalidTokenReason::UnsupportedAlgorithm),
            other => Self::KeyResolutionFailed { message: other.to_string() },
        }
    }
}

/// Response body for rejected requests.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let challenge = match &self {
            Self::MissingToken => Some(HeaderValue::from_static("Bearer")),
            Self::InvalidToken { .. } => Some(HeaderValue::from_static(r#"Bearer error="invalid_token""#)),
            Self::KeyResolutionFailed { .. } => None,
        };

        let body = ErrorBody { error: self.kind(), message: self.to_string() };
        let mut response = (status, Json(body)).into_response();
        if let Some(value) = challenge {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Result type alias for PKCE operations.
pub type PkceResult<T> = Result<T, PkceError>;

/// Result type alias for key resolution.
pub type KeyResult<T> = Result<T, KeyError>;
