// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Clinic staff endpoints.
//!
//! One email may hold memberships in several clinics, all sharing a single
//! password. Login picks one membership and the issued token is scoped to
//! that clinic.

use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, warn};

use super::{
    admin::INVALID_CREDENTIALS,
    auth::revoke_session,
    blocking,
};
use crate::{
    auth::{
        password::{hash_password, verify_password},
        ClinicAuth, SessionAuth,
    },
    error::ApiError,
    models::{
        BaseResponse, ClinicChoice, ClinicLoginRequest, ClinicLoginResponse,
        ClinicPermissionsResponse, ClinicUserView, CreateStaffRequest, MessageResponse,
    },
    state::AppState,
    storage::{normalize_email, ClinicMembership, Namespace, RoleView},
};

/// Role that exists once per clinic, created with the clinic itself.
const OWNER_ROLE: &str = "owner";

fn choice(membership: &ClinicMembership) -> ClinicChoice {
    ClinicChoice {
        clinic_id: membership.clinic.id,
        clinic_name: membership.clinic.name.clone(),
        role: membership.role_name.clone(),
    }
}

/// Authenticate clinic staff; asks for a clinic when several are possible.
#[utoipa::path(
    post,
    path = "/v1/clinic/login",
    request_body = ClinicLoginRequest,
    tag = "Clinic",
    responses(
        (status = 200, description = "Logged in, or clinic selection required", body = BaseResponse<ClinicLoginResponse>),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Account inactive or clinic suspended"),
        (status = 404, description = "No active membership at the requested clinic")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<ClinicLoginRequest>,
) -> Result<Json<BaseResponse<ClinicLoginResponse>>, ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let (message, response) = blocking(move || {
        let memberships = state.db.clinic_memberships(&request.email)?;
        let first = memberships
            .first()
            .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;
        if !verify_password(&request.password, &first.user.password_hash) {
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }

        let active: Vec<ClinicMembership> = memberships
            .into_iter()
            .filter(|m| m.user.status.is_active() && m.clinic.status.is_active())
            .collect();
        if active.is_empty() {
            warn!(email = %normalize_email(&request.email), "Clinic login with no active membership");
            return Err(ApiError::forbidden("account is inactive or clinic is suspended"));
        }

        let chosen = match request.clinic_id {
            Some(clinic_id) => active
                .into_iter()
                .find(|m| m.clinic.id == clinic_id)
                .ok_or_else(|| ApiError::not_found("user not found at this clinic"))?,
            None if active.len() > 1 => {
                let response = ClinicLoginResponse {
                    requires_clinic_selection: true,
                    clinics: active.iter().map(choice).collect(),
                    access_token: None,
                    access_expires_at: None,
                    clinic_user: None,
                };
                return Ok(("multiple clinics found, please select one", response));
            }
            None => active
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?,
        };

        let now = state.clock.now();
        state.db.record_clinic_login(chosen.user.id, now)?;
        let token = state
            .tokens
            .issue_clinic_token(
                &chosen.user.email,
                chosen.user.id,
                chosen.clinic.id,
                &chosen.role_name,
            )
            .map_err(ApiError::internal)?;
        info!(
            clinic_user_id = chosen.user.id,
            clinic_id = chosen.clinic.id,
            role = %chosen.role_name,
            "Clinic user logged in"
        );

        Ok((
            "login successful",
            ClinicLoginResponse {
                requires_clinic_selection: false,
                clinics: Vec::new(),
                access_token: Some(token.token),
                access_expires_at: Some(token.expires_at.timestamp()),
                clinic_user: Some(chosen.into()),
            },
        ))
    })
    .await?;

    Ok(Json(BaseResponse::ok(message, response)))
}

#[utoipa::path(
    post,
    path = "/v1/clinic/logout",
    tag = "Clinic",
    security(("bearer" = [])),
    responses((status = 200, description = "Logged out", body = MessageResponse))
)]
pub async fn logout(
    State(state): State<AppState>,
    SessionAuth(session): SessionAuth,
) -> Json<MessageResponse> {
    revoke_session(&state, &session);
    Json(MessageResponse::new("Logged out"))
}

#[utoipa::path(
    get,
    path = "/v1/clinic/me",
    tag = "Clinic",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current clinic user", body = BaseResponse<ClinicUserView>),
        (status = 404, description = "Membership no longer exists")
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    ClinicAuth(clinic): ClinicAuth,
) -> Result<Json<BaseResponse<ClinicUserView>>, ApiError> {
    let view = blocking(move || {
        Ok(ClinicUserView::from(
            state.db.clinic_membership(clinic.clinic_user_id)?,
        ))
    })
    .await?;
    Ok(Json(BaseResponse::ok("Clinic user retrieved", view)))
}

/// Effective permissions of the caller's clinic role.
#[utoipa::path(
    get,
    path = "/v1/clinic/permissions",
    tag = "Clinic",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Permission names", body = BaseResponse<ClinicPermissionsResponse>)
    )
)]
pub async fn get_permissions(
    State(state): State<AppState>,
    ClinicAuth(clinic): ClinicAuth,
) -> Result<Json<BaseResponse<ClinicPermissionsResponse>>, ApiError> {
    let permissions = state
        .clinic_permissions
        .effective_permissions(clinic.clinic_user_id)
        .await?;
    Ok(Json(BaseResponse::ok(
        "Permissions retrieved",
        ClinicPermissionsResponse {
            role: clinic.role_name,
            permissions: permissions.names(),
        },
    )))
}

/// Clinic roles and their permissions.
#[utoipa::path(
    get,
    path = "/v1/clinic/roles",
    tag = "Clinic",
    security(("bearer" = [])),
    responses((status = 200, description = "Clinic roles", body = BaseResponse<Vec<RoleView>>))
)]
pub async fn list_roles(
    State(state): State<AppState>,
) -> Result<Json<BaseResponse<Vec<RoleView>>>, ApiError> {
    let roles = blocking(move || Ok(state.db.list_roles(Namespace::Clinic)?)).await?;
    Ok(Json(BaseResponse::ok("Roles retrieved", roles)))
}

/// Add a staff member to the caller's clinic.
#[utoipa::path(
    post,
    path = "/v1/clinic/staff",
    request_body = CreateStaffRequest,
    tag = "Clinic",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Staff member created", body = BaseResponse<ClinicUserView>),
        (status = 400, description = "Missing fields or owner role requested"),
        (status = 403, description = "Requires staff.create"),
        (status = 404, description = "Unknown clinic role"),
        (status = 409, description = "Email already a member of this clinic")
    )
)]
pub async fn create_staff(
    State(state): State<AppState>,
    ClinicAuth(caller): ClinicAuth,
    Json(request): Json<CreateStaffRequest>,
) -> Result<(StatusCode, Json<BaseResponse<ClinicUserView>>), ApiError> {
    if request.email.trim().is_empty() || request.name.trim().is_empty() || request.role.is_empty() {
        return Err(ApiError::bad_request("email, name and role are required"));
    }
    if request.role == OWNER_ROLE {
        return Err(ApiError::bad_request("cannot create another owner for the clinic"));
    }

    let view = blocking(move || {
        let existing = state.db.clinic_memberships(&request.email)?;
        if existing.iter().any(|m| m.clinic.id == caller.clinic_id) {
            return Err(ApiError::conflict("user with this email already exists at this clinic"));
        }

        // Memberships of one email share a password
        let hash = match existing.first() {
            Some(other) => other.user.password_hash.clone(),
            None => {
                let password = request
                    .password
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| ApiError::bad_request("password is required for a new account"))?;
                hash_password(password).map_err(ApiError::internal)?
            }
        };

        let user = state.db.create_clinic_user(
            caller.clinic_id,
            &request.email,
            &hash,
            request.name.trim(),
            &request.role,
        )?;
        info!(
            actor_id = caller.clinic_user_id,
            clinic_id = caller.clinic_id,
            clinic_user_id = user.id,
            role = %request.role,
            "Clinic staff created"
        );
        Ok(ClinicUserView::from(state.db.clinic_membership(user.id)?))
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(BaseResponse::ok("clinic user created successfully", view)),
    ))
}
