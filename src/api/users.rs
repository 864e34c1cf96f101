// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity endpoints for customers and for any authenticated caller.

use axum::{extract::State, Json};

use super::blocking;
use crate::{
    auth::{AnyAuth, CustomerAuth, Principal},
    error::ApiError,
    models::BaseResponse,
    state::AppState,
    storage::StoredCustomer,
};

/// Get the current customer's account.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current customer", body = BaseResponse<StoredCustomer>),
        (status = 401, description = "Not authenticated as a customer"),
        (status = 404, description = "Account no longer exists")
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    CustomerAuth(customer): CustomerAuth,
) -> Result<Json<BaseResponse<StoredCustomer>>, ApiError> {
    let account = blocking(move || {
        state
            .db
            .customer(customer.user_id)?
            .ok_or_else(|| ApiError::not_found("user not found"))
    })
    .await?;
    Ok(Json(BaseResponse::ok("User retrieved", account)))
}

/// Echo how the presented token was classified.
#[utoipa::path(
    get,
    path = "/v1/session",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Classified principal", body = BaseResponse<Principal>),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_session(AnyAuth(principal): AnyAuth) -> Json<BaseResponse<Principal>> {
    Json(BaseResponse::ok("Session active", principal))
}
