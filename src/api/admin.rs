// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Platform admin endpoints.
//!
//! - Login / logout and identity (`/me`, grouped `/permissions`)
//! - RBAC mutations: per-admin overrides and role permission lists for both
//!   namespaces. Every mutation invalidates the affected cache entries before
//!   responding, so the next gated request sees the new permissions.
//! - Clinic registration (clinic + owner account)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, warn};

use super::{auth::revoke_session, blocking};
use crate::{
    auth::{
        password::{hash_password, verify_password},
        SessionAuth, StaffAuth,
    },
    error::ApiError,
    models::{
        AdminLoginRequest, AdminLoginResponse, AdminView, BaseResponse, CreateClinicRequest,
        CreateClinicResponse, GroupedPermissionsResponse, MessageResponse, SetOverrideRequest,
        SetRolePermissionsRequest,
    },
    state::AppState,
    storage::{Namespace, RoleView, StorageError},
};

pub(crate) const INVALID_CREDENTIALS: &str = "invalid email or password";

/// Current view of a role after an edit.
pub(crate) fn role_view(state: &AppState, ns: Namespace, role: &str) -> Result<RoleView, ApiError> {
    state
        .db
        .list_roles(ns)?
        .into_iter()
        .find(|view| view.name == role)
        .ok_or_else(|| ApiError::not_found(format!("role {role} not found")))
}

/// Authenticate a platform admin with email and password.
#[utoipa::path(
    post,
    path = "/v1/admin/login",
    request_body = AdminLoginRequest,
    tag = "Admin",
    responses(
        (status = 200, description = "Logged in", body = BaseResponse<AdminLoginResponse>),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Account is inactive")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> Result<Json<BaseResponse<AdminLoginResponse>>, ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let response = blocking(move || {
        let admin = state
            .db
            .admin_by_email(&request.email)?
            .filter(|admin| verify_password(&request.password, &admin.password_hash))
            .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;
        if !admin.status.is_active() {
            warn!(admin_id = admin.id, "Login attempt on inactive admin account");
            return Err(ApiError::forbidden("account is inactive"));
        }

        let (mut admin, role) = state.db.admin_with_role(admin.id)?;
        let now = state.clock.now();
        state.db.record_admin_login(admin.id, now)?;
        admin.last_login = Some(now);

        let token = state
            .tokens
            .issue_staff_token(&admin.email, admin.id, &role)
            .map_err(ApiError::internal)?;
        info!(admin_id = admin.id, role = %role, "Admin logged in");

        Ok(AdminLoginResponse {
            access_token: token.token,
            access_expires_at: token.expires_at.timestamp(),
            admin: AdminView::new(admin, role),
        })
    })
    .await?;

    Ok(Json(BaseResponse::ok("login successful", response)))
}

#[utoipa::path(
    post,
    path = "/v1/admin/logout",
    tag = "Admin",
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
    path = "/v1/admin/me",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current admin", body = BaseResponse<AdminView>),
        (status = 404, description = "Admin no longer exists")
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    StaffAuth(staff): StaffAuth,
) -> Result<Json<BaseResponse<AdminView>>, ApiError> {
    let view = blocking(move || {
        let (admin, role) = state.db.admin_with_role(staff.admin_id).map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::not_found("admin user not found"),
            other => other.into(),
        })?;
        Ok(AdminView::new(admin, role))
    })
    .await?;
    Ok(Json(BaseResponse::ok("Admin retrieved", view)))
}

/// Effective permissions of the caller (role + overrides), grouped by category.
#[utoipa::path(
    get,
    path = "/v1/admin/permissions",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Grouped permissions", body = BaseResponse<GroupedPermissionsResponse>)
    )
)]
pub async fn get_permissions(
    State(state): State<AppState>,
    StaffAuth(staff): StaffAuth,
) -> Result<Json<BaseResponse<GroupedPermissionsResponse>>, ApiError> {
    let permissions = state.admin_permissions.grouped(staff.admin_id).await?;
    Ok(Json(BaseResponse::ok(
        "Permissions retrieved",
        GroupedPermissionsResponse {
            role: staff.role_name,
            permissions,
        },
    )))
}

/// Grant or deny one permission to one admin, regardless of role.
#[utoipa::path(
    put,
    path = "/v1/admin/admins/{admin_id}/permissions/{permission}",
    params(
        ("admin_id" = u64, Path, description = "Target admin"),
        ("permission" = String, Path, description = "Permission name, e.g. clinics.edit")
    ),
    request_body = SetOverrideRequest,
    tag = "Admin RBAC",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Override saved", body = MessageResponse),
        (status = 403, description = "Requires admins.edit"),
        (status = 404, description = "Unknown admin or permission")
    )
)]
pub async fn set_override(
    State(state): State<AppState>,
    StaffAuth(actor): StaffAuth,
    Path((admin_id, permission)): Path<(u64, String)>,
    Json(request): Json<SetOverrideRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let granted = request.granted;
    let saved = permission.clone();
    blocking(move || {
        state.db.set_admin_override(admin_id, &saved, granted)?;
        state.admin_permissions.invalidate(admin_id);
        Ok(())
    })
    .await?;

    info!(
        actor_id = actor.admin_id,
        admin_id,
        permission = %permission,
        granted,
        "Permission override saved"
    );
    Ok(Json(MessageResponse::new("permission override saved")))
}

/// Remove an override so the admin falls back to the role's permissions.
#[utoipa::path(
    delete,
    path = "/v1/admin/admins/{admin_id}/permissions/{permission}",
    params(
        ("admin_id" = u64, Path, description = "Target admin"),
        ("permission" = String, Path, description = "Permission name")
    ),
    tag = "Admin RBAC",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Override removed", body = MessageResponse),
        (status = 404, description = "No such override")
    )
)]
pub async fn remove_override(
    State(state): State<AppState>,
    StaffAuth(actor): StaffAuth,
    Path((admin_id, permission)): Path<(u64, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = permission.clone();
    let removed = blocking(move || {
        let removed = state.db.remove_admin_override(admin_id, &target)?;
        state.admin_permissions.invalidate(admin_id);
        Ok(removed)
    })
    .await?;
    if !removed {
        return Err(ApiError::not_found("permission override not found"));
    }

    info!(actor_id = actor.admin_id, admin_id, permission = %permission, "Permission override removed");
    Ok(Json(MessageResponse::new("permission override removed")))
}

/// Replace the permission list of a platform role. Affects every admin holding it.
#[utoipa::path(
    put,
    path = "/v1/admin/roles/{role}/permissions",
    params(("role" = String, Path, description = "Platform role name")),
    request_body = SetRolePermissionsRequest,
    tag = "Admin RBAC",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Role updated", body = BaseResponse<RoleView>),
        (status = 404, description = "Unknown role or permission")
    )
)]
pub async fn set_role_permissions(
    State(state): State<AppState>,
    StaffAuth(actor): StaffAuth,
    Path(role): Path<String>,
    Json(request): Json<SetRolePermissionsRequest>,
) -> Result<Json<BaseResponse<RoleView>>, ApiError> {
    let view = blocking(move || {
        state
            .db
            .set_role_permissions(Namespace::Platform, &role, &request.permissions)?;
        state.admin_permissions.invalidate_all();

        info!(actor_id = actor.admin_id, role = %role, count = request.permissions.len(), "Platform role permissions replaced");
        role_view(&state, Namespace::Platform, &role)
    })
    .await?;
    Ok(Json(BaseResponse::ok("role permissions updated", view)))
}

/// Replace the permission list of a clinic role. Affects every clinic user holding it.
#[utoipa::path(
    put,
    path = "/v1/admin/clinic-roles/{role}/permissions",
    params(("role" = String, Path, description = "Clinic role name")),
    request_body = SetRolePermissionsRequest,
    tag = "Admin RBAC",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Role updated", body = BaseResponse<RoleView>),
        (status = 404, description = "Unknown role or permission")
    )
)]
pub async fn set_clinic_role_permissions(
    State(state): State<AppState>,
    StaffAuth(actor): StaffAuth,
    Path(role): Path<String>,
    Json(request): Json<SetRolePermissionsRequest>,
) -> Result<Json<BaseResponse<RoleView>>, ApiError> {
    let view = blocking(move || {
        state
            .db
            .set_role_permissions(Namespace::Clinic, &role, &request.permissions)?;
        state.clinic_permissions.invalidate_all();

        info!(actor_id = actor.admin_id, role = %role, count = request.permissions.len(), "Clinic role permissions replaced");
        role_view(&state, Namespace::Clinic, &role)
    })
    .await?;
    Ok(Json(BaseResponse::ok("role permissions updated", view)))
}

/// Register a clinic and its owner account.
#[utoipa::path(
    post,
    path = "/v1/admin/clinics",
    request_body = CreateClinicRequest,
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Clinic registered", body = BaseResponse<CreateClinicResponse>),
        (status = 400, description = "Missing fields"),
        (status = 409, description = "Clinic email already registered")
    )
)]
pub async fn create_clinic(
    State(state): State<AppState>,
    StaffAuth(actor): StaffAuth,
    Json(request): Json<CreateClinicRequest>,
) -> Result<(StatusCode, Json<BaseResponse<CreateClinicResponse>>), ApiError> {
    let required = [
        &request.name,
        &request.email,
        &request.owner_name,
        &request.owner_email,
        &request.owner_password,
    ];
    if required.iter().any(|field| field.trim().is_empty()) {
        return Err(ApiError::bad_request(
            "name, email, owner_name, owner_email and owner_password are required",
        ));
    }

    let response = blocking(move || {
        let hash = hash_password(&request.owner_password).map_err(ApiError::internal)?;
        let (clinic, owner) = state.db.create_clinic_with_owner(
            request.name.trim(),
            &request.email,
            &request.owner_email,
            &hash,
            request.owner_name.trim(),
        )?;
        let owner = state.db.clinic_membership(owner.id)?;
        info!(actor_id = actor.admin_id, clinic_id = clinic.id, "Clinic registered");
        Ok(CreateClinicResponse {
            clinic,
            owner: owner.into(),
        })
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(BaseResponse::ok("clinic registered successfully", response)),
    ))
}
