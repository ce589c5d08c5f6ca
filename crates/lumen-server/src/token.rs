//! Signed cache tokens for the beacon fast path.
//!
//! After resolving a session the server returns an HS256-signed token
//! carrying the resolved IDs. A client echoing it back in the
//! [`CACHE_TOKEN_HEADER`] skips identity derivation and the website/session
//! lookups on subsequent beacons. The token is a cache hint, not an
//! authorization grant: anything invalid just falls through to the full
//! resolution path.

use anyhow::{anyhow, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Header the client echoes the token back in.
pub const CACHE_TOKEN_HEADER: &str = "x-lumen-cache";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheClaims {
    pub website_id: String,
    pub session_id: String,
}

pub fn sign(secret: &str, claims: &CacheClaims) -> Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow!("cache token encode: {e}"))
}

/// Verify a token's signature and recover its claims.
///
/// Tokens deliberately carry no `exp` claim — session identity already
/// rotates with the monthly salt — so expiry validation is switched off.
pub fn verify(secret: &str, token: &str) -> Result<CacheClaims> {
    let mut validation = Validation::default();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    let data = decode::<CacheClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| anyhow!("cache token decode: {e}"))?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> CacheClaims {
        CacheClaims {
            website_id: "w-1".into(),
            session_id: "s-1".into(),
        }
    }

    #[test]
    fn roundtrip_preserves_claims() {
        let token = sign("secret", &claims()).unwrap();
        assert_eq!(verify("secret", &token).unwrap(), claims());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign("secret", &claims()).unwrap();
        assert!(verify("other", &token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify("secret", "not-a-token").is_err());
    }
}
