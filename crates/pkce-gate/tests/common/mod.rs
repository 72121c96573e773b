//! Shared helpers: RSA fixture keys, token signing, and a mock issuer.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pkce_gate::config::Config;

pub const KID_A: &str = "key-2026-a";
pub const KID_B: &str = "key-2026-b";

pub const SIGNING_KEY_A: &str = include_str!("../fixtures/signing_key_a.pem");
pub const SIGNING_KEY_B: &str = include_str!("../fixtures/signing_key_b.pem");

pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Key set publishing only key A.
pub fn jwks_a() -> Value {
    serde_json::from_str(include_str!("../fixtures/jwks_a.json")).unwrap()
}

/// Key set publishing only key B.
pub fn jwks_b() -> Value {
    serde_json::from_str(include_str!("../fixtures/jwks_b.json")).unwrap()
}

/// Key set publishing both keys.
pub fn jwks_both() -> Value {
    let mut keys = jwks_a()["keys"].as_array().unwrap().clone();
    keys.extend(jwks_b()["keys"].as_array().unwrap().iter().cloned());
    json!({ "keys": keys })
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims accepted by a gate built from `config`.
pub fn valid_claims(config: &Config) -> Value {
    json!({
        "iss": config.issuer,
        "sub": "auth0|user-123",
        "aud": config.audience,
        "exp": now() + 3600,
        "iat": now(),
        "scope": "read:hello",
        "https://pkce-gate.test/roles": ["admin"]
    })
}

/// Sign `claims` with RS256 using a PEM private key.
pub fn sign(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_owned);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Serve `body` as the issuer's key set.
pub async fn mount_jwks(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Issue `GET /hello` with an optional raw `Authorization` header value.
pub async fn get_hello(app: axum::Router, authorization: Option<&str>) -> (StatusCode, Option<String>, Value) {
    let mut request = Request::get("/hello");
    if let Some(value) = authorization {
        request = request.header("Authorization", value);
    }

    let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let www_authenticate = response
        .headers()
        .get("WWW-Authenticate")
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);

    (status, www_authenticate, json)
}
