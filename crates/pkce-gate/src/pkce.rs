//! PKCE (Proof Key for Code Exchange) generation and verification.
//!
//! Implements the client side of RFC 7636 with the S256 method:
//!
//! - the verifier is `byte_len` secure random bytes, hex-encoded
//! - the challenge is `BASE64URL(SHA256(verifier))` without padding
//!
//! The challenge goes to the authorization endpoint as `code_challenge`;
//! the verifier stays with the client until the token exchange.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{PkceError, PkceResult};

/// Default verifier size: 32 bytes, 64 hex characters.
pub const DEFAULT_VERIFIER_BYTES: usize = 32;

/// Smallest byte length whose hex form meets the 43 character minimum.
pub const MIN_RECOMMENDED_BYTES: usize = 22;

/// Largest byte length whose hex form stays within 128 characters.
pub const MAX_RECOMMENDED_BYTES: usize = 64;

/// Hard ceiling on verifier size. Larger requests are rejected.
pub const MAX_VERIFIER_BYTES: usize = 1024;

/// The only supported challenge method.
pub const CHALLENGE_METHOD: &str = "S256";

/// Source of secure random bytes.
///
/// Production code uses [`OsEntropy`]. Tests may inject [`SeededEntropy`]
/// for reproducible output.
pub trait EntropySource {
    /// Fill `dest` entirely with random bytes.
    fn fill(&mut self, dest: &mut [u8]) -> PkceResult<()>;
}

/// Operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&mut self, dest: &mut [u8]) -> PkceResult<()> {
        OsRng.try_fill_bytes(dest).map_err(|e| PkceError::entropy(e.to_string()))
    }
}

/// Deterministic seeded source. Never use outside tests.
pub struct SeededEntropy(StdRng);

impl SeededEntropy {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl EntropySource for SeededEntropy {
    fn fill(&mut self, dest: &mut [u8]) -> PkceResult<()> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl std::fmt::Debug for SeededEntropy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededEntropy").finish()
    }
}

/// A PKCE code verifier (lowercase hex).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Verifier(String);

impl Verifier {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier").field("len", &self.0.len()).finish()
    }
}

/// A PKCE S256 code challenge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Challenge(String);

impl Challenge {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a verifier of `byte_len` random bytes from the OS CSPRNG.
pub fn generate_verifier(byte_len: usize) -> PkceResult<Verifier> {
    generate_verifier_with(&mut OsEntropy, byte_len)
}

/// Generate a verifier of `byte_len` random bytes from `source`.
///
/// The result is always `2 * byte_len` lowercase hex characters.
pub fn generate_verifier_with<E>(source: &mut E, byte_len: usize) -> PkceResult<Verifier>
where
    E: EntropySource + ?Sized,
{
    if byte_len == 0 || byte_len > MAX_VERIFIER_BYTES {
        return Err(PkceError::InvalidLength(byte_len));
    }
    if !(MIN_RECOMMENDED_BYTES..=MAX_RECOMMENDED_BYTES).contains(&byte_len) {
        tracing::warn!(
            byte_len,
            "Verifier length outside the 43-128 character range most servers accept"
        );
    }

    let mut bytes = vec![0u8; byte_len];
    source.fill(&mut bytes)?;
    Ok(Verifier(hex::encode(bytes)))
}

/// Derive the S256 challenge for a verifier.
#[must_use]
pub fn derive_challenge(verifier: &Verifier) -> Challenge {
    challenge_for(verifier.as_str())
}

/// Compute `BASE64URL(SHA256(verifier))` for an arbitrary verifier string.
#[must_use]
pub fn challenge_for(verifier: &str) -> Challenge {
    let hash = Sha256::digest(verifier.as_bytes());
    Challenge(URL_SAFE_NO_PAD.encode(hash))
}

/// Verify a PKCE S256 code challenge.
///
/// Computes `BASE64URL(SHA256(code_verifier))` and compares to the stored challenge.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    challenge_for(code_verifier).as_str() == code_challenge
}

/// A verifier together with its challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: Verifier,
    pub challenge: Challenge,
}

impl PkcePair {
    /// Generate a pair from the OS CSPRNG.
    pub fn generate(byte_len: usize) -> PkceResult<Self> {
        Self::generate_with(&mut OsEntropy, byte_len)
    }

    /// Generate a pair from `source`.
    pub fn generate_with<E>(source: &mut E, byte_len: usize) -> PkceResult<Self>
    where
        E: EntropySource + ?Sized,
    {
        let verifier = generate_verifier_with(source, byte_len)?;
        let challenge = derive_challenge(&verifier);
        Ok(Self { verifier, challenge })
    }

    /// Challenge method to announce alongside the challenge.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

/// Opaque CSRF `state` value: 16 random bytes, hex-encoded.
pub fn generate_state<E>(source: &mut E) -> PkceResult<String>
where
    E: EntropySource + ?Sized,
{
    let mut bytes = [0u8; 16];
    source.fill(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// Parameters of an authorization-code request.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub authorization_endpoint: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: Option<&'a str>,
    pub state: &'a str,
}

impl AuthorizationRequest<'_> {
    /// Build the authorization URL carrying `code_challenge` and
    /// `code_challenge_method=S256`.
    pub fn to_url(&self, challenge: &Challenge) -> PkceResult<Url> {
        Url::parse(self.redirect_uri)?;
        let mut url = Url::parse(self.authorization_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", self.client_id)
                .append_pair("redirect_uri", self.redirect_uri);
            if let Some(scope) = self.scope {
                query.append_pair("scope", scope);
            }
            query
                .append_pair("state", self.state)
                .append_pair("code_challenge", challenge.as_str())
                .append_pair("code_challenge_method", CHALLENGE_METHOD);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    struct BrokenEntropy;

    impl EntropySource for BrokenEntropy {
        fn fill(&mut self, _dest: &mut [u8]) -> PkceResult<()> {
            Err(PkceError::entropy("getrandom failed"))
        }
    }

    #[test]
    fn test_s256_valid() {
        // RFC 7636 Appendix B test vector
        assert_eq!(challenge_for(RFC_VERIFIER).as_str(), RFC_CHALLENGE);
        assert!(verify_s256(RFC_VERIFIER, RFC_CHALLENGE));
    }

    #[test]
    fn test_s256_invalid_verifier() {
        assert!(!verify_s256("wrong-verifier", RFC_CHALLENGE));
    }

    #[test]
    fn test_s256_invalid_challenge() {
        assert!(!verify_s256(RFC_VERIFIER, "wrong-challenge"));
    }

    #[test]
    fn test_verifier_length_and_alphabet() {
        let verifier = generate_verifier(DEFAULT_VERIFIER_BYTES).unwrap();
        assert_eq!(verifier.as_str().len(), 64);
        assert!(verifier.as_str().chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn test_zero_length_rejected() {
        let err = generate_verifier(0).unwrap_err();
        assert!(matches!(err, PkceError::InvalidLength(0)));
    }

    #[test]
    fn test_oversized_length_rejected() {
        assert!(generate_verifier(MAX_VERIFIER_BYTES).is_ok());
        let err = generate_verifier(MAX_VERIFIER_BYTES + 1).unwrap_err();
        assert!(matches!(err, PkceError::InvalidLength(1025)));
        assert!(matches!(generate_verifier(100_000_000_000), Err(PkceError::InvalidLength(_))));
    }

    #[test]
    fn test_entropy_failure_propagates() {
        let err = generate_verifier_with(&mut BrokenEntropy, 32).unwrap_err();
        assert!(matches!(err, PkceError::EntropyUnavailable(_)));
        assert!(PkcePair::generate_with(&mut BrokenEntropy, 32).is_err());
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let a = generate_verifier_with(&mut SeededEntropy::new(7), 32).unwrap();
        let b = generate_verifier_with(&mut SeededEntropy::new(7), 32).unwrap();
        let c = generate_verifier_with(&mut SeededEntropy::new(8), 32).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_pair_matches() {
        let pair = PkcePair::generate(48).unwrap();
        assert_eq!(pair.method(), "S256");
        assert_eq!(pair.challenge.as_str().len(), 43);
        assert!(verify_s256(pair.verifier.as_str(), pair.challenge.as_str()));
    }

    #[test]
    fn test_verifier_debug_hides_value() {
        let verifier = generate_verifier_with(&mut SeededEntropy::new(1), 4).unwrap();
        let debug = format!("{verifier:?}");
        assert!(!debug.contains(verifier.as_str()));
        assert!(debug.contains("len"));
    }

    #[test]
    fn test_authorization_url() {
        let challenge = challenge_for(RFC_VERIFIER);
        let request = AuthorizationRequest {
            authorization_endpoint: "https://auth.example.com/authorize",
            client_id: "client-1",
            redirect_uri: "http://localhost:3000/callback",
            scope: Some("openid profile"),
            state: "xyz",
        };

        let url = request.to_url(&challenge).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/authorize");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://localhost:3000/callback");
        assert_eq!(pairs["scope"], "openid profile");
        assert_eq!(pairs["code_challenge"], RFC_CHALLENGE);
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[test]
    fn test_authorization_url_rejects_bad_endpoint() {
        let request = AuthorizationRequest {
            authorization_endpoint: "not a url",
            client_id: "c",
            redirect_uri: "http://localhost/cb",
            scope: None,
            state: "s",
        };
        assert!(matches!(
            request.to_url(&challenge_for("v")),
            Err(PkceError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_state_is_hex() {
        let state = generate_state(&mut OsEntropy).unwrap();
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
