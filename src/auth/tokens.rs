// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token issuance and validation, plus refresh token minting.
//!
//! ## Refresh tokens
//!
//! A refresh token is 256 random bits, base64url-encoded, handed to the
//! client once. The server keeps:
//!
//! - `lookup`: a short prefix of the SHA-256 of the raw value, used as an
//!   index so a presented token does not require scanning every row
//! - `hash`: an Argon2 PHC string of the raw value, the actual check
//!
//! The index only narrows candidates; a match still requires the Argon2
//! verification.

use std::sync::Arc;

use axum::http::HeaderValue;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use super::claims::{AdminClaims, ClinicClaims, CustomerClaims, Principal, Session};
use super::password::{hash_password, verify_password};
use super::signer::{Hs256Signer, TokenError, TokenSigner};
use super::AuthError;
use crate::clock::Clock;
use crate::config::AppConfig;

/// Refresh token size in bytes (256 bits).
const REFRESH_TOKEN_BYTES: usize = 32;

/// Characters of the encoded SHA-256 kept as the lookup index.
const REFRESH_LOOKUP_LEN: usize = 16;

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A freshly minted refresh token. `raw` goes to the client, the rest is stored.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub raw: String,
    pub lookup: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    signer: Arc<dyn TokenSigner>,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl TokenService {
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        clock: Arc<dyn Clock>,
        access_ttl: chrono::Duration,
        refresh_ttl: chrono::Duration,
    ) -> Self {
        Self {
            signer,
            clock,
            rng: SystemRandom::new(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// HS256 service using the configured shared secret and TTLs.
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(Hs256Signer::new(config.jwt_secret.as_bytes())),
            clock,
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    fn access_expiry(&self) -> DateTime<Utc> {
        self.clock.now() + self.access_ttl
    }

    fn sign<T: serde::Serialize>(
        &self,
        claims: &T,
        expires_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let value = serde_json::to_value(claims)?;
        Ok(IssuedToken {
            token: self.signer.sign(&value)?,
            expires_at,
        })
    }

    pub fn issue_customer_token(&self, email: &str, user_id: u64) -> Result<IssuedToken, TokenError> {
        let expires_at = self.access_expiry();
        let claims = CustomerClaims {
            email: email.to_string(),
            user_id,
            exp: expires_at.timestamp(),
        };
        self.sign(&claims, expires_at)
    }

    pub fn issue_staff_token(
        &self,
        email: &str,
        admin_id: u64,
        role_name: &str,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = self.access_expiry();
        let claims = AdminClaims {
            email: email.to_string(),
            admin_id,
            role: role_name.to_string(),
            exp: expires_at.timestamp(),
        };
        self.sign(&claims, expires_at)
    }

    pub fn issue_clinic_token(
        &self,
        email: &str,
        clinic_user_id: u64,
        clinic_id: u64,
        role_name: &str,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = self.access_expiry();
        let claims = ClinicClaims {
            email: email.to_string(),
            clinic_user_id,
            clinic_id,
            role: role_name.to_string(),
            exp: expires_at.timestamp(),
        };
        self.sign(&claims, expires_at)
    }

    /// Mint a new refresh token and its server-side hash.
    pub fn issue_refresh_token(&self) -> Result<RefreshToken, TokenError> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| TokenError::Rng)?;
        let raw = Base64UrlUnpadded::encode_string(&bytes);
        let hash = hash_password(&raw).map_err(|e| TokenError::Hashing(e.to_string()))?;

        Ok(RefreshToken {
            lookup: refresh_lookup(&raw),
            raw,
            hash,
            expires_at: self.clock.now() + self.refresh_ttl,
        })
    }

    /// Verify a token and classify it into a [`Principal`].
    pub fn validate_and_classify(&self, token: &str) -> Result<Principal, AuthError> {
        self.verify_session(token).map(|session| session.principal)
    }

    /// Like [`TokenService::validate_and_classify`] but keeps the token and its expiry.
    pub fn verify_session(&self, token: &str) -> Result<Session, AuthError> {
        let claims = self.signer.verify(token)?;

        let exp = claims
            .get("exp")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .ok_or(AuthError::UnknownClaims)?;
        let expires_at = DateTime::from_timestamp(exp, 0).ok_or(AuthError::UnknownClaims)?;
        if expires_at < self.clock.now() {
            return Err(AuthError::Expired);
        }

        Ok(Session {
            principal: Principal::from_claims(&claims)?,
            token: token.to_string(),
            expires_at,
        })
    }
}

/// Index value for a raw refresh token.
pub fn refresh_lookup(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut encoded = Base64UrlUnpadded::encode_string(&digest);
    encoded.truncate(REFRESH_LOOKUP_LEN);
    encoded
}

/// Constant-time check of a presented refresh token against its stored hash.
pub fn verify_refresh(raw: &str, stored_hash: &str) -> bool {
    verify_password(raw, stored_hash)
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let value = header
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}
