// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rows stored in the redb database (JSON-encoded values).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which RBAC namespace a role or permission belongs to.
///
/// Platform (admin) and clinic permissions live in disjoint tables and
/// are never compared with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Platform,
    Clinic,
}

/// Account lifecycle status shared by admin users, clinics and clinic users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
}

impl AccountStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

/// A dot-qualified capability name, e.g. `clinics.edit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoredPermission {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named collection of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRole {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub permission_ids: Vec<u64>,
}

/// Role with its permission names resolved, as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleView {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

/// Per-admin grant (`granted = true`) or deny (`granted = false`) of one permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionOverride {
    pub permission: StoredPermission,
    pub granted: bool,
}

/// Platform administrator or staff account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAdminUser {
    pub id: u64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role_id: u64,
    pub status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredClinic {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

/// Membership of one person in one clinic. The same email may have several.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredClinicUser {
    pub id: u64,
    pub clinic_id: u64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role_id: u64,
    pub status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Clinic membership joined with its clinic and role name (login view).
#[derive(Debug, Clone)]
pub struct ClinicMembership {
    pub user: StoredClinicUser,
    pub clinic: StoredClinic,
    pub role_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredCustomer {
    pub id: u64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Server-side half of a customer refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRefreshToken {
    /// Unique record id (UUID)
    pub id: String,
    pub user_id: u64,
    /// Fast-lookup prefix of the SHA-256 of the raw token
    pub lookup: String,
    /// Argon2 PHC string of the raw token
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}
