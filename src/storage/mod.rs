// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single embedded redb database under
//! `DATA_DIR`:
//!
//! ```text
//! $DATA_DIR/
//!   skinsync.redb     # accounts, RBAC catalogs, overrides, refresh tokens
//! ```
//!
//! ## Important Notes
//!
//! - redb calls are synchronous. Request handlers on a hot path (permission
//!   loads) run them through `tokio::task::spawn_blocking`.
//! - Revocations and pending OTPs are process-local and are NOT stored here.

pub mod accounts;
pub mod database;
pub mod rbac;
pub mod records;
pub mod seed;
pub mod sessions;

pub use accounts::normalize_email;
pub use database::{Database, StorageError, StorageResult};
pub use records::{
    AccountStatus, ClinicMembership, Namespace, PermissionOverride, RoleView, StoredAdminUser,
    StoredClinic, StoredClinicUser, StoredCustomer, StoredPermission, StoredRefreshToken,
    StoredRole,
};
pub use sessions::RefreshTokenSweep;
