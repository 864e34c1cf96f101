// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated principals.
//!
//! Each extractor first looks for the [`Session`] a gate stored in the
//! request extensions, and otherwise authenticates the bearer header itself,
//! so handlers work both behind a gate and on their own:
//!
//! ```rust,ignore
//! async fn me(StaffAuth(staff): StaffAuth) -> impl IntoResponse {
//!     // staff.admin_id, staff.role_name, staff.email
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::claims::{ClinicPrincipal, CustomerPrincipal, Principal, Session, StaffPrincipal};
use super::middleware::authenticate;
use super::AuthError;
use crate::state::AppState;

async fn session_from_parts(parts: &mut Parts, state: &AppState) -> Result<Session, AuthError> {
    // First check if a gate already authenticated the request
    if let Some(session) = parts.extensions.get::<Session>().cloned() {
        return Ok(session);
    }
    let session = authenticate(state, &parts.headers)?;
    parts.extensions.insert(session.clone());
    Ok(session)
}

/// The verified session, including the raw token and its expiry (logout).
pub struct SessionAuth(pub Session);

impl FromRequestParts<AppState> for SessionAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(SessionAuth(session_from_parts(parts, state).await?))
    }
}

/// Any principal kind.
pub struct AnyAuth(pub Principal);

impl FromRequestParts<AppState> for AnyAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(AnyAuth(session_from_parts(parts, state).await?.principal))
    }
}

pub struct CustomerAuth(pub CustomerPrincipal);

impl FromRequestParts<AppState> for CustomerAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match session_from_parts(parts, state).await?.principal {
            Principal::Customer(customer) => Ok(CustomerAuth(customer)),
            _ => Err(AuthError::WrongPrincipalKind),
        }
    }
}

/// Platform admin or staff.
pub struct StaffAuth(pub StaffPrincipal);

impl FromRequestParts<AppState> for StaffAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match session_from_parts(parts, state).await?.principal {
            Principal::Staff(staff) => Ok(StaffAuth(staff)),
            _ => Err(AuthError::WrongPrincipalKind),
        }
    }
}

pub struct ClinicAuth(pub ClinicPrincipal);

impl FromRequestParts<AppState> for ClinicAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match session_from_parts(parts, state).await?.principal {
            Principal::Clinic(clinic) => Ok(ClinicAuth(clinic)),
            _ => Err(AuthError::WrongPrincipalKind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use axum::http::Request;
    use chrono::Utc;

    fn parts_with(token: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn extractor_requires_auth_header() {
        let (state, _dir) = test_state();
        let mut parts = parts_with(None);
        let result = AnyAuth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn customer_extractor_reads_header() {
        let (state, _dir) = test_state();
        let token = customer_token(&state, "a@b.com");
        let mut parts = parts_with(Some(&token));

        let CustomerAuth(customer) = CustomerAuth::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(customer.email, "a@b.com");
        // Session is cached for later extractors
        assert!(parts.extensions.get::<Session>().is_some());
    }

    #[tokio::test]
    async fn extractor_prefers_extensions() {
        let (state, _dir) = test_state();
        let mut parts = parts_with(None);
        parts.extensions.insert(Session {
            principal: Principal::Staff(StaffPrincipal {
                admin_id: 7,
                role_name: "admin".into(),
                email: "from-gate@b.com".into(),
            }),
            token: "tok".into(),
            expires_at: Utc::now(),
        });

        let StaffAuth(staff) = StaffAuth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(staff.email, "from-gate@b.com");
    }

    #[tokio::test]
    async fn typed_extractor_rejects_other_kind() {
        let (state, _dir) = test_state();
        let token = customer_token(&state, "a@b.com");
        let mut parts = parts_with(Some(&token));
        let result = ClinicAuth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::WrongPrincipalKind)));
    }
}
