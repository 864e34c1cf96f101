// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. All types derive
//! `ToSchema` for the OpenAPI document.
//!
//! Successful responses are wrapped in [`BaseResponse`], which shares its
//! `is_success` / `message` fields with the error body produced by
//! [`crate::error::ApiError`]. Timestamps in token responses are Unix
//! seconds.
//!
//! ## Model Categories
//!
//! - **Customer auth**: OTP send/verify, refresh, logout
//! - **Admin**: login, identity, permission overrides, role edits, clinic registration
//! - **Clinic**: login with clinic selection, identity, staff registration

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::{AccountStatus, ClinicMembership, StoredAdminUser, StoredClinic, StoredCustomer, StoredPermission};

// =============================================================================
// Envelope
// =============================================================================

/// Envelope of every successful JSON response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BaseResponse<T> {
    pub is_success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> BaseResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Success without a payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub is_success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            message: message.into(),
        }
    }
}

// =============================================================================
// Customer Auth Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    /// Free-form client description stored with the refresh token.
    #[serde(default)]
    pub device_info: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Optional body of customer logout. When present the refresh token is deleted too.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Access + refresh token pair issued to customers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}

/// Result of a successful OTP verification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
    /// `true` when the customer account was created by this login.
    pub is_first_login: bool,
    pub user: StoredCustomer,
}

// =============================================================================
// Admin Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminLoginRequest {
    pub email: String,
    pub password: String,
}

/// Admin account as shown to API clients (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminView {
    pub id: u64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdminView {
    pub fn new(admin: StoredAdminUser, role: String) -> Self {
        Self {
            id: admin.id,
            email: admin.email,
            name: admin.name,
            role,
            status: admin.status,
            last_login: admin.last_login,
            created_at: admin.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminLoginResponse {
    pub access_token: String,
    pub access_expires_at: i64,
    pub admin: AdminView,
}

/// Effective admin permissions grouped by category (`users`, `clinics`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupedPermissionsResponse {
    pub role: String,
    pub permissions: BTreeMap<String, Vec<StoredPermission>>,
}

/// Grant (`true`) or deny (`false`) one permission to one admin.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetOverrideRequest {
    pub granted: bool,
}

/// Full replacement of a role's permission names.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetRolePermissionsRequest {
    pub permissions: Vec<String>,
}

/// Register a clinic together with its owner account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateClinicRequest {
    pub name: String,
    pub email: String,
    pub owner_name: String,
    pub owner_email: String,
    pub owner_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateClinicResponse {
    pub clinic: StoredClinic,
    pub owner: ClinicUserView,
}

// =============================================================================
// Clinic Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClinicLoginRequest {
    pub email: String,
    pub password: String,
    /// Required when the account belongs to more than one active clinic.
    #[serde(default)]
    pub clinic_id: Option<u64>,
}

/// One clinic the account may log into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClinicChoice {
    pub clinic_id: u64,
    pub clinic_name: String,
    pub role: String,
}

/// Clinic membership as shown to API clients (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClinicUserView {
    pub id: u64,
    pub clinic_id: u64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub status: AccountStatus,
    pub clinic: StoredClinic,
}

impl From<ClinicMembership> for ClinicUserView {
    fn from(membership: ClinicMembership) -> Self {
        Self {
            id: membership.user.id,
            clinic_id: membership.user.clinic_id,
            email: membership.user.email,
            name: membership.user.name,
            role: membership.role_name,
            status: membership.user.status,
            clinic: membership.clinic,
        }
    }
}

/// Either a token for one clinic, or the list of clinics to choose from.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClinicLoginResponse {
    pub requires_clinic_selection: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clinics: Vec<ClinicChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_user: Option<ClinicUserView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClinicPermissionsResponse {
    pub role: String,
    pub permissions: Vec<String>,
}

/// Add a staff member to the caller's clinic.
///
/// `password` may be omitted when the email already belongs to another
/// clinic; that account's password is reused.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateStaffRequest {
    pub email: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub password: Option<String>,
}
