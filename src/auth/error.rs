// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Gate failure.
///
/// Token failures keep distinct variants for logging and tests, but they all
/// render as the same generic 401 so clients cannot tell which check failed.
#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Header present but not `Bearer <token>`
    InvalidAuthHeader,
    /// Token signature did not verify (or the token is not a JWT at all)
    InvalidSignature,
    /// `exp` is in the past
    Expired,
    /// Signature is fine but no known claim shape matched
    UnknownClaims,
    /// Token was logged out before its expiry
    Revoked,
    /// Valid token of a kind this gate does not accept
    WrongPrincipalKind,
    /// Principal lacks a required permission
    Forbidden(String),
    /// Permission resolution failed (storage error or timeout)
    PermissionCheck,
}

#[derive(Serialize)]
struct AuthErrorBody {
    is_success: bool,
    message: String,
    error_code: &'static str,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InvalidSignature
            | AuthError::Expired
            | AuthError::UnknownClaims
            | AuthError::Revoked
            | AuthError::WrongPrincipalKind => "invalid_token",
            AuthError::Forbidden(_) => "insufficient_permissions",
            AuthError::PermissionCheck => "permission_check_failed",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidSignature
            | AuthError::Expired
            | AuthError::UnknownClaims
            | AuthError::Revoked
            | AuthError::WrongPrincipalKind => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::PermissionCheck => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Precise reason, for logs only.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing header",
            AuthError::InvalidAuthHeader => "malformed header",
            AuthError::InvalidSignature => "invalid signature",
            AuthError::Expired => "expired",
            AuthError::UnknownClaims => "unknown claim shape",
            AuthError::Revoked => "revoked",
            AuthError::WrongPrincipalKind => "wrong principal kind",
            AuthError::Forbidden(_) => "missing permission",
            AuthError::PermissionCheck => "permission check failed",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "authorization header missing"),
            AuthError::InvalidAuthHeader => write!(f, "invalid authorization header format"),
            AuthError::InvalidSignature
            | AuthError::Expired
            | AuthError::UnknownClaims
            | AuthError::Revoked
            | AuthError::WrongPrincipalKind => write!(f, "invalid or expired token"),
            AuthError::Forbidden(permission) => {
                write!(f, "insufficient permissions: {permission} required")
            }
            AuthError::PermissionCheck => write!(f, "error checking permissions"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            is_success: false,
            message: self.to_string(),
            error_code: self.error_code(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body_bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_auth_returns_401() {
        let (status, body) = body_of(AuthError::MissingAuthHeader).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["is_success"], false);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn token_failures_are_indistinguishable() {
        let mut bodies = Vec::new();
        for err in [
            AuthError::InvalidSignature,
            AuthError::Expired,
            AuthError::UnknownClaims,
            AuthError::Revoked,
            AuthError::WrongPrincipalKind,
        ] {
            bodies.push(body_of(err).await);
        }
        for (status, body) in &bodies {
            assert_eq!(*status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, &bodies[0].1);
        }
        assert_eq!(bodies[0].1["message"], "invalid or expired token");
    }

    #[tokio::test]
    async fn forbidden_names_the_permission() {
        let (status, body) = body_of(AuthError::Forbidden("clinics.edit".into())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "insufficient permissions: clinics.edit required");
    }

    #[tokio::test]
    async fn permission_check_failure_is_500() {
        let (status, body) = body_of(AuthError::PermissionCheck).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "error checking permissions");
    }
}
