// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Customer authentication: email OTP login, refresh rotation and logout.

use axum::{extract::State, Json};
use tracing::info;
use uuid::Uuid;

use super::blocking;
use crate::{
    auth::{
        claims::Session,
        tokens::{refresh_lookup, verify_refresh},
        CustomerAuth, SessionAuth,
    },
    error::ApiError,
    models::{
        BaseResponse, LoginResponse, LogoutRequest, MessageResponse, RefreshRequest,
        SendOtpRequest, TokenPair, VerifyOtpRequest,
    },
    otp::OtpError,
    state::AppState,
    storage::{normalize_email, StoredCustomer, StoredRefreshToken},
};

const INVALID_REFRESH: &str = "invalid or expired refresh token";

fn otp_error(err: OtpError) -> ApiError {
    match err {
        OtpError::Cooldown => ApiError::too_many_requests(err.to_string()),
        OtpError::Rng => ApiError::internal(err),
        other => ApiError::bad_request(other.to_string()),
    }
}

#[cfg(feature = "dev")]
fn deliver_otp(email: &str, code: &str) {
    tracing::warn!(email, code, "OTP issued (dev delivery, not emailed)");
}

#[cfg(not(feature = "dev"))]
fn deliver_otp(email: &str, _code: &str) {
    tracing::debug!(email, "OTP issued");
}

/// Revoke the presented access token until its own expiry.
pub(crate) fn revoke_session(state: &AppState, session: &Session) {
    state.revocations.revoke(&session.token, session.expires_at);
    info!(kind = session.principal.kind(), "Session revoked");
}

/// Mint an access + refresh pair for `customer` and persist the refresh hash.
fn issue_customer_session(
    state: &AppState,
    customer: &StoredCustomer,
    device_info: Option<String>,
    ip_address: Option<String>,
) -> Result<TokenPair, ApiError> {
    let access = state
        .tokens
        .issue_customer_token(&customer.email, customer.id)
        .map_err(ApiError::internal)?;
    let refresh = state.tokens.issue_refresh_token().map_err(ApiError::internal)?;

    state.db.insert_refresh_token(&StoredRefreshToken {
        id: Uuid::new_v4().to_string(),
        user_id: customer.id,
        lookup: refresh.lookup,
        token_hash: refresh.hash,
        expires_at: refresh.expires_at,
        created_at: state.clock.now(),
        device_info,
        ip_address,
    })?;

    Ok(TokenPair {
        access_token: access.token,
        refresh_token: refresh.raw,
        access_expires_at: access.expires_at.timestamp(),
        refresh_expires_at: refresh.expires_at.timestamp(),
    })
}

/// Stored record matching a raw refresh token, if any.
fn find_refresh_record(state: &AppState, raw: &str) -> Result<Option<StoredRefreshToken>, ApiError> {
    let candidates = state.db.refresh_candidates(&refresh_lookup(raw))?;
    Ok(candidates
        .into_iter()
        .find(|record| verify_refresh(raw, &record.token_hash)))
}

/// Send a login code to an email address.
#[utoipa::path(
    post,
    path = "/v1/auth/otp/send",
    request_body = SendOtpRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "OTP issued", body = MessageResponse),
        (status = 400, description = "Missing email"),
        (status = 429, description = "Resend cooldown active")
    )
)]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = normalize_email(&request.email);
    if email.is_empty() {
        return Err(ApiError::bad_request("email is required"));
    }

    let code = state.otp.issue(&email).map_err(otp_error)?;
    deliver_otp(&email, &code);
    Ok(Json(MessageResponse::new("OTP sent to email")))
}

/// Exchange a valid OTP for customer tokens, creating the account on first login.
#[utoipa::path(
    post,
    path = "/v1/auth/otp/verify",
    request_body = VerifyOtpRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Logged in", body = BaseResponse<LoginResponse>),
        (status = 400, description = "Unknown, expired or wrong OTP")
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<BaseResponse<LoginResponse>>, ApiError> {
    let email = normalize_email(&request.email);
    let code = request.otp.trim().to_string();
    if email.is_empty() || code.is_empty() {
        return Err(ApiError::bad_request("email and otp are required"));
    }

    state.otp.verify(&email, &code).map_err(otp_error)?;

    let response = blocking(move || {
        let (customer, created) = state.db.find_or_create_customer(&email)?;
        let tokens = issue_customer_session(&state, &customer, request.device_info, request.ip_address)?;
        info!(user_id = customer.id, first_login = created, "Customer logged in");
        Ok(LoginResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
            is_first_login: created,
            user: customer,
        })
    })
    .await?;

    Ok(Json(BaseResponse::ok("Logged in", response)))
}

/// Rotate a refresh token: the presented one is consumed, a new pair is issued.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "New token pair", body = BaseResponse<TokenPair>),
        (status = 401, description = "Unknown or expired refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<BaseResponse<TokenPair>>, ApiError> {
    let raw = request.refresh_token.trim().to_string();
    if raw.is_empty() {
        return Err(ApiError::bad_request("refresh_token required"));
    }

    let pair = blocking(move || {
        let record = find_refresh_record(&state, &raw)?
            .ok_or_else(|| ApiError::unauthorized(INVALID_REFRESH))?;

        // Single use, whether or not it is still valid. Only the request
        // that actually removes the row may mint a new pair.
        if !state.db.delete_refresh_token(&record.lookup, &record.id)? {
            return Err(ApiError::unauthorized(INVALID_REFRESH));
        }
        if record.expires_at < state.clock.now() {
            return Err(ApiError::unauthorized(INVALID_REFRESH));
        }

        let customer = state
            .db
            .customer(record.user_id)?
            .ok_or_else(|| ApiError::unauthorized(INVALID_REFRESH))?;
        let pair = issue_customer_session(&state, &customer, record.device_info, record.ip_address)?;
        info!(user_id = customer.id, "Refresh token rotated");
        Ok(pair)
    })
    .await?;

    Ok(Json(BaseResponse::ok("Token refreshed", pair)))
}

/// Log a customer out. The access token is revoked; a refresh token in the
/// body is deleted as well.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body(content = LogoutRequest, description = "Optional; refresh token to delete"),
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    SessionAuth(session): SessionAuth,
    CustomerAuth(customer): CustomerAuth,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    revoke_session(&state, &session);

    let raw = body
        .and_then(|Json(request)| request.refresh_token)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty());
    if let Some(raw) = raw {
        blocking(move || {
            if let Some(record) = find_refresh_record(&state, &raw)? {
                // Never let one customer delete another's token
                if record.user_id == customer.user_id {
                    state.db.delete_refresh_token(&record.lookup, &record.id)?;
                }
            }
            Ok(())
        })
        .await?;
    }

    Ok(Json(MessageResponse::new("Logged out")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::call;
    use crate::state::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn send_otp_enforces_cooldown() {
        let (state, _dir) = test_state();
        let app = crate::api::router(state);
        let body = json!({"email": "Eve@Example.com"});

        let (status, json) = call(&app, "POST", "/v1/auth/otp/send", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "OTP sent to email");

        let (status, json) = call(&app, "POST", "/v1/auth/otp/send", None, Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["is_success"], false);
    }

    #[tokio::test]
    async fn send_otp_requires_email() {
        let (state, _dir) = test_state();
        let app = crate::api::router(state);
        let (status, json) =
            call(&app, "POST", "/v1/auth/otp/send", None, Some(json!({"email": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "email is required");
    }

    #[tokio::test]
    async fn verify_otp_logs_in_and_reports_first_login() {
        let (state, _dir) = test_state();
        let app = crate::api::router(state.clone());

        let code = state.otp.issue("eve@example.com").unwrap();
        let (status, json) = call(
            &app,
            "POST",
            "/v1/auth/otp/verify",
            None,
            Some(json!({"email": "EVE@example.com", "otp": code})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["is_first_login"], true);
        assert_eq!(data["user"]["email"], "eve@example.com");

        let access = data["access_token"].as_str().unwrap();
        let principal = state.tokens.validate_and_classify(access).unwrap();
        assert_eq!(principal.kind(), "customer");

        // Second login of the same email is not a first login
        let code = state.otp.issue("eve@example.com").unwrap();
        let (_, json) = call(
            &app,
            "POST",
            "/v1/auth/otp/verify",
            None,
            Some(json!({"email": "eve@example.com", "otp": code})),
        )
        .await;
        assert_eq!(json["data"]["is_first_login"], false);
    }

    #[tokio::test]
    async fn wrong_otp_reports_remaining_attempts() {
        let (state, _dir) = test_state();
        let app = crate::api::router(state.clone());
        let code = state.otp.issue("eve@example.com").unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let (status, json) = call(
            &app,
            "POST",
            "/v1/auth/otp/verify",
            None,
            Some(json!({"email": "eve@example.com", "otp": wrong})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "invalid OTP. 4 attempts remaining");
    }

    async fn login(app: &axum::Router, state: &AppState, email: &str) -> serde_json::Value {
        let code = state.otp.issue(email).unwrap();
        let (status, json) = call(
            app,
            "POST",
            "/v1/auth/otp/verify",
            None,
            Some(json!({"email": email, "otp": code, "device_info": "pixel"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json["data"].clone()
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_reuse() {
        let (state, _dir) = test_state();
        let app = crate::api::router(state.clone());
        let data = login(&app, &state, "eve@example.com").await;
        let old = data["refresh_token"].as_str().unwrap().to_string();

        let (status, json) =
            call(&app, "POST", "/v1/auth/refresh", None, Some(json!({"refresh_token": old}))).await;
        assert_eq!(status, StatusCode::OK);
        let new = json["data"]["refresh_token"].as_str().unwrap().to_string();
        assert_ne!(new, old);

        let (status, json) =
            call(&app, "POST", "/v1/auth/refresh", None, Some(json!({"refresh_token": old}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["message"], INVALID_REFRESH);

        let (status, _) =
            call(&app, "POST", "/v1/auth/refresh", None, Some(json!({"refresh_token": new}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_of_one_token_succeed_once() {
        let (state, _dir) = test_state();
        let app = crate::api::router(state.clone());
        let data = login(&app, &state, "eve@example.com").await;
        let body = json!({"refresh_token": data["refresh_token"]});

        let (first, second) = tokio::join!(
            call(&app, "POST", "/v1/auth/refresh", None, Some(body.clone())),
            call(&app, "POST", "/v1/auth/refresh", None, Some(body.clone())),
        );
        let statuses = [first.0, second.0];
        let succeeded = statuses.iter().filter(|s| **s == StatusCode::OK).count();
        assert_eq!(succeeded, 1, "statuses: {statuses:?}");
        assert!(statuses.contains(&StatusCode::UNAUTHORIZED));

        let (status, _) = call(&app, "POST", "/v1/auth/refresh", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_revokes_access_and_refresh_tokens() {
        let (state, _dir) = test_state();
        let app = crate::api::router(state.clone());
        let data = login(&app, &state, "eve@example.com").await;
        let access = data["access_token"].as_str().unwrap().to_string();
        let refresh = data["refresh_token"].as_str().unwrap().to_string();

        let (status, _) = call(&app, "GET", "/v1/users/me", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = call(
            &app,
            "POST",
            "/v1/auth/logout",
            Some(&access),
            Some(json!({"refresh_token": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Logged out");

        let (status, _) = call(&app, "GET", "/v1/users/me", Some(&access), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) =
            call(&app, "POST", "/v1/auth/refresh", None, Some(json!({"refresh_token": refresh}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_without_body_only_revokes_access() {
        let (state, _dir) = test_state();
        let app = crate::api::router(state.clone());
        let token = customer_token(&state, "eve@example.com");

        let (status, _) = call(&app, "POST", "/v1/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "GET", "/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
