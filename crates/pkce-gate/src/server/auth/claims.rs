//! Verified JWT payload attached to admitted requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// The `aud` claim: a single audience or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// Returns true if `audience` is among the token's audiences.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(aud) => aud == audience,
            Self::Many(auds) => auds.iter().any(|a| a == audience),
        }
    }
}

/// Decoded and verified token claims.
///
/// Registered claims are typed; everything else lands in `extra`.
/// NumericDate claims keep their JSON number as sent (integer or
/// fractional), so serializing a `Claims` reproduces the decoded payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<Number>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<Number>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<Number>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Custom claims.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Claims {
    /// Subject, if present.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    /// Expiry as a UTC timestamp, truncated to whole seconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn expires_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let exp = self.exp.as_ref()?;
        let secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f.floor() as i64))?;
        chrono::DateTime::from_timestamp(secs, 0)
    }

    /// Look up a custom claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }

    /// Space-separated `scope` claim split into individual scopes.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.get("scope").and_then(serde_json::Value::as_str).unwrap_or_default().split_whitespace()
    }
}
