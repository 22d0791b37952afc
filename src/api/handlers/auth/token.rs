//! Stateless access tokens: HS256-signed JWTs bound to a subject and role.
//!
//! Tokens are self-contained and verified by signature and expiry only; they
//! are never persisted and cannot be revoked before expiry. Rotating the
//! process-wide signing secret invalidates every outstanding token, which is
//! acceptable given the short TTL.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::store::Role;

pub const TOKEN_VERSION: u8 = 1;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl AccessTokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    pub v: u8,
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signing key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid token version")]
    InvalidVersion,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn keyed_mac(secret: &[u8]) -> Result<HmacSha256, Error> {
    HmacSha256::new_from_slice(secret).map_err(|_| Error::Key)
}

/// Create an HS256 signed access token (JWT).
///
/// # Errors
///
/// Returns an error if claims/header JSON cannot be encoded or the key is
/// rejected by the MAC.
pub fn sign_hs256(secret: &[u8], claims: &AccessTokenClaims) -> Result<String, Error> {
    let header_b64 = b64e_json(&AccessTokenHeader::hs256())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let mut mac = keyed_mac(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(signature.as_slice());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify an HS256 access token and return its decoded claims.
///
/// # Errors
///
/// Returns an error if:
/// - the token is malformed or contains invalid base64/json,
/// - the signature does not match the signing secret,
/// - the claims fail validation (`v`, `exp`).
pub fn verify_hs256(
    token: &str,
    secret: &[u8],
    now_unix_seconds: i64,
) -> Result<AccessTokenClaims, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: AccessTokenHeader = b64d_json(header_b64)?;
    if header.alg != "HS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;

    // verify_slice compares in constant time; never compare MACs with `==`.
    let mut mac = keyed_mac(secret)?;
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&signature_bytes)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: AccessTokenClaims = b64d_json(claims_b64)?;
    if claims.v != TOKEN_VERSION {
        return Err(Error::InvalidVersion);
    }
    if claims.exp <= now_unix_seconds {
        return Err(Error::Expired);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const SECRET: &[u8] = b"test-signing-secret";

    fn test_claims(sub: &str, role: Role) -> AccessTokenClaims {
        AccessTokenClaims {
            v: TOKEN_VERSION,
            sub: sub.to_string(),
            role,
            iat: NOW,
            exp: NOW + 900,
        }
    }

    #[test]
    fn sign_and_verify_round_trip() -> Result<(), Error> {
        let claims = test_claims("subject-1", Role::Educator);
        let token = sign_hs256(SECRET, &claims)?;
        assert_eq!(token.split('.').count(), 3);

        let verified = verify_hs256(&token, SECRET, NOW)?;
        assert_eq!(verified, claims);
        Ok(())
    }

    #[test]
    fn rejects_expired_token() -> Result<(), Error> {
        let token = sign_hs256(SECRET, &test_claims("subject-1", Role::Admin))?;
        let result = verify_hs256(&token, SECRET, NOW + 900);
        assert!(matches!(result, Err(Error::Expired)));
        Ok(())
    }

    #[test]
    fn rejects_wrong_secret() -> Result<(), Error> {
        let token = sign_hs256(SECRET, &test_claims("subject-1", Role::Educator))?;
        let result = verify_hs256(&token, b"other-secret", NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn rejects_tampered_claims() -> Result<(), Error> {
        let token = sign_hs256(SECRET, &test_claims("subject-1", Role::Educator))?;
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_claims = b64e_json(&test_claims("subject-2", Role::Admin))?;
        parts[1] = &forged_claims;
        let forged = parts.join(".");

        let result = verify_hs256(&forged, SECRET, NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn rejects_unsupported_algorithm() -> Result<(), Error> {
        let header = AccessTokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        };
        let token = format!(
            "{}.{}.{}",
            b64e_json(&header)?,
            b64e_json(&test_claims("subject-1", Role::Educator))?,
            Base64UrlUnpadded::encode_string(b"junk")
        );

        let result = verify_hs256(&token, SECRET, NOW);
        assert!(matches!(result, Err(Error::UnsupportedAlg(_))));
        Ok(())
    }

    #[test]
    fn rejects_wrong_version() -> Result<(), Error> {
        let mut claims = test_claims("subject-1", Role::Educator);
        claims.v = 0;
        let token = sign_hs256(SECRET, &claims)?;
        let result = verify_hs256(&token, SECRET, NOW);
        assert!(matches!(result, Err(Error::InvalidVersion)));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(
            verify_hs256("a.b", SECRET, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            verify_hs256("a.b.c.d", SECRET, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            verify_hs256("!!.@@.##", SECRET, NOW),
            Err(Error::Base64)
        ));
    }
}
