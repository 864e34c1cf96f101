// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and permission gates for Axum.
//!
//! ## Gates
//!
//! | Gate | Accepts | Then |
//! |------|---------|------|
//! | [`customer_auth`] | customer tokens | nothing (customers have no RBAC) |
//! | [`admin_auth`] | admin tokens | optionally [`require_permission`] |
//! | [`clinic_auth`] | clinic tokens | optionally [`require_clinic_permission`] |
//! | [`unified_auth`] | any of the three | nothing |
//!
//! Every gate verifies the signature and expiry, classifies the claims and
//! rejects revoked tokens. On success the [`Session`] is stored in the
//! request extensions, where the extractors in `extractor.rs` pick it up.
//!
//! ```rust,ignore
//! let admin_routes = Router::new()
//!     .route("/roles/{role}/permissions", put(set_role_permissions))
//!     .route_layer(from_fn_with_state(
//!         PermissionGate::new(state.clone(), "admins.edit"),
//!         require_permission,
//!     ))
//!     .route_layer(from_fn_with_state(state.clone(), admin_auth));
//! ```

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info, warn};

use super::claims::{Principal, Session};
use super::permissions::PermissionError;
use super::tokens::bearer_token;
use super::AuthError;
use crate::state::AppState;

/// Verify the bearer token in `headers` and check it is not revoked.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Session, AuthError> {
    let result = bearer_token(headers.get(AUTHORIZATION))
        .and_then(|token| state.tokens.verify_session(token))
        .and_then(|session| {
            if state.revocations.is_revoked(&session.token) {
                Err(AuthError::Revoked)
            } else {
                Ok(session)
            }
        });

    if let Err(e) = &result {
        debug!(reason = e.reason(), "Rejected bearer token");
    }
    result
}

/// Authenticate and require a principal kind, storing the session on success.
fn gate(
    state: &AppState,
    request: &mut Request,
    accepts: fn(&Principal) -> bool,
) -> Result<(), AuthError> {
    let session = authenticate(state, request.headers())?;
    if !accepts(&session.principal) {
        debug!(kind = session.principal.kind(), "Rejected token of wrong kind");
        return Err(AuthError::WrongPrincipalKind);
    }
    request.extensions_mut().insert(session);
    Ok(())
}

async fn run_gate(
    state: &AppState,
    mut request: Request,
    next: Next,
    accepts: fn(&Principal) -> bool,
) -> Response {
    match gate(state, &mut request, accepts) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

pub async fn customer_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    run_gate(&state, request, next, |p| matches!(p, Principal::Customer(_))).await
}

pub async fn admin_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    run_gate(&state, request, next, |p| matches!(p, Principal::Staff(_))).await
}

pub async fn clinic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    run_gate(&state, request, next, |p| matches!(p, Principal::Clinic(_))).await
}

pub async fn unified_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    run_gate(&state, request, next, |_| true).await
}

/// State for the permission middlewares: which permission a route needs.
#[derive(Clone)]
pub struct PermissionGate {
    pub state: AppState,
    pub permission: &'static str,
}

impl PermissionGate {
    pub fn new(state: AppState, permission: &'static str) -> Self {
        Self { state, permission }
    }
}

/// Session set by an earlier gate, or authenticate now if there was none.
fn session_of(state: &AppState, request: &mut Request) -> Result<Session, AuthError> {
    if let Some(session) = request.extensions().get::<Session>() {
        return Ok(session.clone());
    }
    let session = authenticate(state, request.headers())?;
    request.extensions_mut().insert(session.clone());
    Ok(session)
}

fn permission_failure(err: PermissionError, principal_id: u64, permission: &str) -> Response {
    match &err {
        PermissionError::NotFound(what) => {
            warn!(principal_id, permission, missing = %what, "Principal not found while checking permissions")
        }
        _ => error!(principal_id, permission, error = %err, "Permission check failed"),
    }
    AuthError::PermissionCheck.into_response()
}

fn forbidden(principal_id: u64, permission: &str) -> Response {
    info!(principal_id, permission, "Permission denied");
    AuthError::Forbidden(permission.to_string()).into_response()
}

/// Require an admin permission. Layer inside [`admin_auth`].
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let admin_id = match session_of(&gate.state, &mut request) {
        Ok(Session {
            principal: Principal::Staff(staff),
            ..
        }) => staff.admin_id,
        Ok(_) => return AuthError::WrongPrincipalKind.into_response(),
        Err(e) => return e.into_response(),
    };

    match gate
        .state
        .admin_permissions
        .has_permission(admin_id, gate.permission)
        .await
    {
        Ok(true) => next.run(request).await,
        Ok(false) => forbidden(admin_id, gate.permission),
        Err(e) => permission_failure(e, admin_id, gate.permission),
    }
}

/// Require a clinic permission. Layer inside [`clinic_auth`].
pub async fn require_clinic_permission(
    State(gate): State<PermissionGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let clinic_user_id = match session_of(&gate.state, &mut request) {
        Ok(Session {
            principal: Principal::Clinic(clinic),
            ..
        }) => clinic.clinic_user_id,
        Ok(_) => return AuthError::WrongPrincipalKind.into_response(),
        Err(e) => return e.into_response(),
    };

    match gate
        .state
        .clinic_permissions
        .has_permission(clinic_user_id, gate.permission)
        .await
    {
        Ok(true) => next.run(request).await,
        Ok(false) => forbidden(clinic_user_id, gate.permission),
        Err(e) => permission_failure(e, clinic_user_id, gate.permission),
    }
}
