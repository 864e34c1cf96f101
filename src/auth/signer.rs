// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing primitive behind the token service.
//!
//! Every token kind currently shares one HS256 key. Classification never
//! looks at the key, so a per-kind signer can replace [`Hs256Signer`]
//! without touching `tokens.rs`.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde_json::{Map, Value};
use thiserror::Error;

use super::AuthError;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("failed to encode claims: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("failed to hash token: {0}")]
    Hashing(String),

    #[error("random number generator failure")]
    Rng,
}

/// Sign claim sets and verify tokens back into claim sets.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &Value) -> Result<String, TokenError>;

    /// Verify signature and `exp`, returning the raw claim map.
    fn verify(&self, token: &str) -> Result<Map<String, Value>, AuthError>;
}

/// HMAC-SHA256 with a single shared secret.
pub struct Hs256Signer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256Signer {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is enforced to the second, no grace period
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenSigner for Hs256Signer {
    fn sign(&self, claims: &Value) -> Result<String, TokenError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    fn verify(&self, token: &str) -> Result<Map<String, Value>, AuthError> {
        let data = decode::<Map<String, Value>>(token, &self.decoding, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::MissingRequiredClaim(_) | ErrorKind::Json(_) => AuthError::UnknownClaims,
                _ => AuthError::InvalidSignature,
            },
        )?;
        Ok(data.claims)
    }
}
