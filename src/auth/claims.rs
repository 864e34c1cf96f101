// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claim shapes and the typed principal they classify into.
//!
//! All three token kinds are signed with the same key. Which kind a token
//! is depends only on which claims it carries, checked in this order:
//!
//! 1. `admin_id` present → [`Principal::Staff`]
//! 2. `clinic_user_id` present → [`Principal::Clinic`]
//! 3. `user_id` present → [`Principal::Customer`]
//!
//! The wire shapes below are relied on by mobile and dashboard clients and
//! must not gain or lose fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::AuthError;

/// Customer access token claims: `{email, user_id, exp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerClaims {
    pub email: String,
    pub user_id: u64,
    pub exp: i64,
}

/// Platform staff access token claims: `{email, admin_id, role, exp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    pub email: String,
    pub admin_id: u64,
    pub role: String,
    pub exp: i64,
}

/// Clinic staff access token claims: `{email, clinic_user_id, clinic_id, role, exp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicClaims {
    pub email: String,
    pub clinic_user_id: u64,
    pub clinic_id: u64,
    pub role: String,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CustomerPrincipal {
    pub user_id: u64,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StaffPrincipal {
    pub admin_id: u64,
    pub role_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClinicPrincipal {
    pub clinic_user_id: u64,
    pub clinic_id: u64,
    pub role_name: String,
    pub email: String,
}

/// The authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Principal {
    Customer(CustomerPrincipal),
    #[serde(rename = "admin")]
    Staff(StaffPrincipal),
    Clinic(ClinicPrincipal),
}

impl Principal {
    /// Classify verified claims, first match wins.
    pub fn from_claims(claims: &Map<String, Value>) -> Result<Self, AuthError> {
        if claims.contains_key("admin_id") {
            return Ok(Principal::Staff(StaffPrincipal {
                admin_id: id_claim(claims, "admin_id")?,
                role_name: str_claim(claims, "role")?,
                email: str_claim(claims, "email")?,
            }));
        }
        if claims.contains_key("clinic_user_id") {
            return Ok(Principal::Clinic(ClinicPrincipal {
                clinic_user_id: id_claim(claims, "clinic_user_id")?,
                clinic_id: id_claim(claims, "clinic_id")?,
                role_name: str_claim(claims, "role")?,
                email: str_claim(claims, "email")?,
            }));
        }
        if claims.contains_key("user_id") {
            return Ok(Principal::Customer(CustomerPrincipal {
                user_id: id_claim(claims, "user_id")?,
                email: str_claim(claims, "email")?,
            }));
        }
        Err(AuthError::UnknownClaims)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Principal::Customer(_) => "customer",
            Principal::Staff(_) => "admin",
            Principal::Clinic(_) => "clinic",
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Principal::Customer(p) => &p.email,
            Principal::Staff(p) => &p.email,
            Principal::Clinic(p) => &p.email,
        }
    }
}

/// A verified bearer token together with what it classified as.
///
/// Handlers that need the raw token (logout) read it from here.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Read a numeric id claim.
///
/// JSON numbers may arrive as integers or as integral floats (`5.0`,
/// `1e3`); both are accepted. Anything else is a claim-shape failure.
fn id_claim(claims: &Map<String, Value>, name: &str) -> Result<u64, AuthError> {
    let value = claims.get(name).ok_or(AuthError::UnknownClaims)?;
    if let Some(id) = value.as_u64() {
        return Ok(id);
    }
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= MAX_SAFE_INTEGER => Ok(f as u64),
        _ => Err(AuthError::UnknownClaims),
    }
}

/// 2^53, the largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

fn str_claim(claims: &Map<String, Value>, name: &str) -> Result<String, AuthError> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AuthError::UnknownClaims)
}
