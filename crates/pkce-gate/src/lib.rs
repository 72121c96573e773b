//! PKCE helper and bearer-JWT gate
//!
//! Two independent halves of an OAuth 2.0 Authorization Code + PKCE flow:
//!
//! # Features
//!
//! - **PKCE generation**: hex verifiers from an injectable secure entropy
//!   source, S256 challenges, authorization URLs
//! - **Bearer gate**: axum middleware validating JWTs against the issuer's
//!   JWK set, with a TTL key cache and single-flight refresh
//!
//! # Example
//!
//! ```no_run
//! use pkce_gate::pkce::{PkcePair, DEFAULT_VERIFIER_BYTES};
//! use pkce_gate::{config::Config, server::GateServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pair = PkcePair::generate(DEFAULT_VERIFIER_BYTES)?;
//!     println!("code_challenge={}", pair.challenge);
//!
//!     let config = Config::from_env()?;
//!     GateServer::new(&config)?.run_http(3001).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod pkce;
pub mod server;

pub use config::Config;
pub use error::{InvalidTokenReason, KeyError, PkceError, Rejection};
pub use server::auth::{BearerGate, Claims};
