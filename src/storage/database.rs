// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded account and RBAC database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `permissions` / `clinic_permissions`: id → serialized StoredPermission
//! - `permission_names` / `clinic_permission_names`: name → id
//! - `roles` / `clinic_roles`: id → serialized StoredRole
//! - `role_names` / `clinic_role_names`: name → id
//! - `admin_overrides`: (admin_id, permission_id) → granted
//! - `admin_users`: id → serialized StoredAdminUser, `admin_emails`: email → id
//! - `clinics`: id → serialized StoredClinic
//! - `clinic_users`: id → serialized StoredClinicUser
//! - `clinic_user_emails`: (email, clinic_id) → clinic_user_id
//! - `customers`: id → serialized StoredCustomer, `customer_emails`: email → id
//! - `refresh_tokens`: `lookup:record_id` → serialized StoredRefreshToken
//! - `sequences`: sequence name → last allocated id

use std::path::Path;

use redb::{ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

use super::records::Namespace;

// =============================================================================
// Table Definitions
// =============================================================================

pub(super) const PERMISSIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("permissions");
pub(super) const PERMISSION_NAMES: TableDefinition<&str, u64> =
    TableDefinition::new("permission_names");
pub(super) const ROLES: TableDefinition<u64, &[u8]> = TableDefinition::new("roles");
pub(super) const ROLE_NAMES: TableDefinition<&str, u64> = TableDefinition::new("role_names");

pub(super) const CLINIC_PERMISSIONS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("clinic_permissions");
pub(super) const CLINIC_PERMISSION_NAMES: TableDefinition<&str, u64> =
    TableDefinition::new("clinic_permission_names");
pub(super) const CLINIC_ROLES: TableDefinition<u64, &[u8]> = TableDefinition::new("clinic_roles");
pub(super) const CLINIC_ROLE_NAMES: TableDefinition<&str, u64> =
    TableDefinition::new("clinic_role_names");

/// Composite key guarantees at most one override per (admin, permission).
pub(super) const ADMIN_OVERRIDES: TableDefinition<(u64, u64), bool> =
    TableDefinition::new("admin_overrides");

pub(super) const ADMIN_USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("admin_users");
pub(super) const ADMIN_EMAILS: TableDefinition<&str, u64> = TableDefinition::new("admin_emails");

pub(super) const CLINICS: TableDefinition<u64, &[u8]> = TableDefinition::new("clinics");
pub(super) const CLINIC_USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("clinic_users");
pub(super) const CLINIC_USER_EMAILS: TableDefinition<(&str, u64), u64> =
    TableDefinition::new("clinic_user_emails");

pub(super) const CUSTOMERS: TableDefinition<u64, &[u8]> = TableDefinition::new("customers");
pub(super) const CUSTOMER_EMAILS: TableDefinition<&str, u64> =
    TableDefinition::new("customer_emails");

pub(super) const REFRESH_TOKENS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("refresh_tokens");

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// The four tables that make up one RBAC namespace.
#[derive(Clone, Copy)]
pub(super) struct RbacTables {
    pub permissions: TableDefinition<'static, u64, &'static [u8]>,
    pub permission_names: TableDefinition<'static, &'static str, u64>,
    pub roles: TableDefinition<'static, u64, &'static [u8]>,
    pub role_names: TableDefinition<'static, &'static str, u64>,
    pub permission_sequence: &'static str,
    pub role_sequence: &'static str,
}

impl Namespace {
    pub(super) fn tables(self) -> RbacTables {
        match self {
            Namespace::Platform => RbacTables {
                permissions: PERMISSIONS,
                permission_names: PERMISSION_NAMES,
                roles: ROLES,
                role_names: ROLE_NAMES,
                permission_sequence: "permissions",
                role_sequence: "roles",
            },
            Namespace::Clinic => RbacTables {
                permissions: CLINIC_PERMISSIONS,
                permission_names: CLINIC_PERMISSION_NAMES,
                roles: CLINIC_ROLES,
                role_names: CLINIC_ROLE_NAMES,
                permission_sequence: "clinic_permissions",
                role_sequence: "clinic_roles",
            },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Namespace::Platform => "Permission",
            Namespace::Clinic => "Clinic permission",
        }
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Row Helpers
// =============================================================================

/// Read and decode a JSON row keyed by id.
pub(super) fn read_row<T, R>(table: &R, id: u64) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON row keyed by id.
pub(super) fn write_row<T: Serialize>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
    row: &T,
) -> StorageResult<()> {
    let json = serde_json::to_vec(row)?;
    table.insert(id, json.as_slice())?;
    Ok(())
}

/// Allocate the next id of a named sequence inside a write transaction.
pub(super) fn next_id(txn: &WriteTransaction, sequence: &str) -> StorageResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let next = table.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID account/RBAC database.
pub struct Database {
    pub(super) db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for ns in [Namespace::Platform, Namespace::Clinic] {
                let t = ns.tables();
                let _ = write_txn.open_table(t.permissions)?;
                let _ = write_txn.open_table(t.permission_names)?;
                let _ = write_txn.open_table(t.roles)?;
                let _ = write_txn.open_table(t.role_names)?;
            }
            let _ = write_txn.open_table(ADMIN_OVERRIDES)?;
            let _ = write_txn.open_table(ADMIN_USERS)?;
            let _ = write_txn.open_table(ADMIN_EMAILS)?;
            let _ = write_txn.open_table(CLINICS)?;
            let _ = write_txn.open_table(CLINIC_USERS)?;
            let _ = write_txn.open_table(CLINIC_USER_EMAILS)?;
            let _ = write_txn.open_table(CUSTOMERS)?;
            let _ = write_txn.open_table(CUSTOMER_EMAILS)?;
            let _ = write_txn.open_table(REFRESH_TOKENS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Cheap liveness probe used by the readiness endpoint.
    pub fn ping(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(SEQUENCES)?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_database;
    use super::*;

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.redb");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        db.ping().unwrap();
    }

    #[test]
    fn sequences_allocate_increasing_ids() {
        let (db, _dir) = temp_database();
        let txn = db.db.begin_write().unwrap();
        let a = next_id(&txn, "things").unwrap();
        let b = next_id(&txn, "things").unwrap();
        let other = next_id(&txn, "others").unwrap();
        txn.commit().unwrap();

        assert_eq!((a, b, other), (1, 2, 1));
    }
}
