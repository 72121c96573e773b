//! Bearer JWT gate.
//!
//! Validates `Authorization: Bearer <jwt>` against an issuer's published
//! key set before a protected handler runs.
//!
//! ## Supported Standards
//! - RFC 6750: Bearer Token Usage
//! - RFC 7517: JSON Web Key (key sets fetched by `kid`)
//! - RFC 7519: JSON Web Token (`exp`, `nbf`, `iss`, `aud` validation)

pub mod claims;
pub mod gate;
pub mod jwks;

pub use claims::{Audience, Claims};
pub use gate::{BearerGate, TokenValidator, require_bearer};
pub use jwks::{JwksCache, SigningKey};
