// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Roles, permissions and per-admin overrides.
//!
//! Every mutation here changes somebody's effective permission set. Callers
//! are expected to invalidate the matching resolver cache afterwards (see
//! `api::admin`).

use redb::{ReadableDatabase, ReadableTable};

use super::database::{
    next_id, read_row, write_row, Database, StorageError, StorageResult, ADMIN_OVERRIDES,
    ADMIN_USERS, CLINIC_USERS,
};
use super::records::{
    Namespace, PermissionOverride, RoleView, StoredAdminUser, StoredClinicUser, StoredPermission,
    StoredRole,
};
use crate::auth::permissions::PermissionSource;

/// Resolve permission ids to rows, skipping ids that no longer exist.
fn load_permissions<R>(table: &R, ids: &[u64]) -> StorageResult<Vec<StoredPermission>>
where
    R: ReadableTable<u64, &'static [u8]>,
{
    let mut permissions = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(permission) = read_row::<StoredPermission, _>(table, *id)? {
            permissions.push(permission);
        }
    }
    Ok(permissions)
}

impl Database {
    /// Create a permission if its name is new. Returns its id either way.
    pub fn upsert_permission(
        &self,
        ns: Namespace,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<u64> {
        let t = ns.tables();
        let write_txn = self.db.begin_write()?;
        let id = {
            let mut names = write_txn.open_table(t.permission_names)?;
            let existing = names.get(name)?.map(|v| v.value());
            match existing {
                Some(id) => id,
                None => {
                    let id = next_id(&write_txn, t.permission_sequence)?;
                    let mut permissions = write_txn.open_table(t.permissions)?;
                    write_row(
                        &mut permissions,
                        id,
                        &StoredPermission {
                            id,
                            name: name.to_string(),
                            description: description.map(str::to_string),
                        },
                    )?;
                    names.insert(name, id)?;
                    id
                }
            }
        };
        write_txn.commit()?;
        Ok(id)
    }

    /// Create or update a role so it grants exactly `permission_names`.
    ///
    /// Names that are not in the catalog are skipped (seed semantics).
    pub fn upsert_role(
        &self,
        ns: Namespace,
        name: &str,
        description: Option<&str>,
        permission_names: &[&str],
    ) -> StorageResult<u64> {
        let t = ns.tables();
        let write_txn = self.db.begin_write()?;
        let id = {
            let perm_names = write_txn.open_table(t.permission_names)?;
            let mut permission_ids = Vec::with_capacity(permission_names.len());
            for perm in permission_names {
                if let Some(id) = perm_names.get(*perm)?.map(|v| v.value()) {
                    permission_ids.push(id);
                }
            }

            let mut role_names = write_txn.open_table(t.role_names)?;
            let existing = role_names.get(name)?.map(|v| v.value());
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = next_id(&write_txn, t.role_sequence)?;
                    role_names.insert(name, id)?;
                    id
                }
            };

            let mut roles = write_txn.open_table(t.roles)?;
            write_row(
                &mut roles,
                id,
                &StoredRole {
                    id,
                    name: name.to_string(),
                    description: description.map(str::to_string),
                    permission_ids,
                },
            )?;
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    /// Replace the permissions of an existing role.
    ///
    /// Unlike seeding, every name must exist in the namespace's catalog.
    pub fn set_role_permissions(
        &self,
        ns: Namespace,
        role_name: &str,
        permission_names: &[String],
    ) -> StorageResult<StoredRole> {
        let t = ns.tables();
        let write_txn = self.db.begin_write()?;
        let role = {
            let role_id = write_txn
                .open_table(t.role_names)?
                .get(role_name)?
                .map(|v| v.value())
                .ok_or_else(|| StorageError::NotFound(format!("Role {role_name}")))?;

            let perm_names = write_txn.open_table(t.permission_names)?;
            let mut permission_ids = Vec::with_capacity(permission_names.len());
            for perm in permission_names {
                let id = perm_names
                    .get(perm.as_str())?
                    .map(|v| v.value())
                    .ok_or_else(|| StorageError::NotFound(format!("{} {perm}", ns.label())))?;
                if !permission_ids.contains(&id) {
                    permission_ids.push(id);
                }
            }

            let mut roles = write_txn.open_table(t.roles)?;
            let mut role: StoredRole = read_row(&roles, role_id)?
                .ok_or_else(|| StorageError::NotFound(format!("Role {role_name}")))?;
            role.permission_ids = permission_ids;
            write_row(&mut roles, role_id, &role)?;
            role
        };
        write_txn.commit()?;
        Ok(role)
    }

    /// All roles of a namespace with permission names resolved.
    pub fn list_roles(&self, ns: Namespace) -> StorageResult<Vec<RoleView>> {
        let t = ns.tables();
        let read_txn = self.db.begin_read()?;
        let roles = read_txn.open_table(t.roles)?;
        let permissions = read_txn.open_table(t.permissions)?;

        let mut views = Vec::new();
        for entry in roles.iter()? {
            let (_, value) = entry?;
            let role: StoredRole = serde_json::from_slice(value.value())?;
            let mut names: Vec<String> = load_permissions(&permissions, &role.permission_ids)?
                .into_iter()
                .map(|p| p.name)
                .collect();
            names.sort();
            views.push(RoleView {
                id: role.id,
                name: role.name,
                description: role.description,
                permissions: names,
            });
        }
        Ok(views)
    }

    /// Grant (`true`) or deny (`false`) one platform permission for one admin.
    ///
    /// Re-setting an existing pair replaces it, so there is never more than
    /// one override row per (admin, permission).
    pub fn set_admin_override(
        &self,
        admin_id: u64,
        permission_name: &str,
        granted: bool,
    ) -> StorageResult<()> {
        let t = Namespace::Platform.tables();
        let write_txn = self.db.begin_write()?;
        {
            if write_txn.open_table(ADMIN_USERS)?.get(admin_id)?.is_none() {
                return Err(StorageError::NotFound(format!("Admin {admin_id}")));
            }
            let permission_id = write_txn
                .open_table(t.permission_names)?
                .get(permission_name)?
                .map(|v| v.value())
                .ok_or_else(|| StorageError::NotFound(format!("Permission {permission_name}")))?;

            let mut overrides = write_txn.open_table(ADMIN_OVERRIDES)?;
            overrides.insert((admin_id, permission_id), granted)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove an override. Returns whether one existed.
    pub fn remove_admin_override(&self, admin_id: u64, permission_name: &str) -> StorageResult<bool> {
        let t = Namespace::Platform.tables();
        let write_txn = self.db.begin_write()?;
        let removed = {
            let permission_id = write_txn
                .open_table(t.permission_names)?
                .get(permission_name)?
                .map(|v| v.value())
                .ok_or_else(|| StorageError::NotFound(format!("Permission {permission_name}")))?;

            let mut overrides = write_txn.open_table(ADMIN_OVERRIDES)?;
            let removed = overrides.remove((admin_id, permission_id))?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

impl PermissionSource for Database {
    fn admin_role_permissions(&self, admin_id: u64) -> StorageResult<Vec<StoredPermission>> {
        let t = Namespace::Platform.tables();
        let read_txn = self.db.begin_read()?;

        let admins = read_txn.open_table(ADMIN_USERS)?;
        let admin: StoredAdminUser = read_row(&admins, admin_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Admin {admin_id}")))?;

        let roles = read_txn.open_table(t.roles)?;
        let Some(role) = read_row::<StoredRole, _>(&roles, admin.role_id)? else {
            return Ok(Vec::new());
        };

        let permissions = read_txn.open_table(t.permissions)?;
        load_permissions(&permissions, &role.permission_ids)
    }

    fn admin_overrides(&self, admin_id: u64) -> StorageResult<Vec<PermissionOverride>> {
        let t = Namespace::Platform.tables();
        let read_txn = self.db.begin_read()?;
        let overrides = read_txn.open_table(ADMIN_OVERRIDES)?;
        let permissions = read_txn.open_table(t.permissions)?;

        let mut rows = Vec::new();
        for entry in overrides.range((admin_id, 0)..=(admin_id, u64::MAX))? {
            let (key, granted) = entry?;
            let (_, permission_id) = key.value();
            if let Some(permission) = read_row(&permissions, permission_id)? {
                rows.push(PermissionOverride {
                    permission,
                    granted: granted.value(),
                });
            }
        }
        Ok(rows)
    }

    fn clinic_role_permissions(&self, clinic_user_id: u64) -> StorageResult<Vec<StoredPermission>> {
        let t = Namespace::Clinic.tables();
        let read_txn = self.db.begin_read()?;

        let users = read_txn.open_table(CLINIC_USERS)?;
        let user: StoredClinicUser = read_row(&users, clinic_user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Clinic user {clinic_user_id}")))?;

        let roles = read_txn.open_table(t.roles)?;
        let Some(role) = read_row::<StoredRole, _>(&roles, user.role_id)? else {
            return Ok(Vec::new());
        };

        let permissions = read_txn.open_table(t.permissions)?;
        load_permissions(&permissions, &role.permission_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::temp_database;

    fn names(perms: Vec<StoredPermission>) -> Vec<String> {
        let mut names: Vec<String> = perms.into_iter().map(|p| p.name).collect();
        names.sort();
        names
    }

    #[test]
    fn upsert_permission_is_idempotent() {
        let (db, _dir) = temp_database();
        let a = db
            .upsert_permission(Namespace::Platform, "users.view", Some("View users"))
            .unwrap();
        let b = db
            .upsert_permission(Namespace::Platform, "users.view", None)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn namespaces_are_disjoint() {
        let (db, _dir) = temp_database();
        db.upsert_permission(Namespace::Clinic, "patients.view", None)
            .unwrap();
        db.upsert_role(Namespace::Platform, "admin", None, &[]).unwrap();
        db.upsert_role(Namespace::Clinic, "doctor", None, &[]).unwrap();

        let err = db
            .set_role_permissions(Namespace::Platform, "admin", &["patients.view".to_string()])
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let role = db
            .set_role_permissions(Namespace::Clinic, "doctor", &["patients.view".to_string()])
            .unwrap();
        assert_eq!(role.permission_ids.len(), 1);
    }

    #[test]
    fn upsert_role_replaces_permission_list() {
        let (db, _dir) = temp_database();
        for p in ["users.view", "users.edit"] {
            db.upsert_permission(Namespace::Platform, p, None).unwrap();
        }
        db.upsert_role(Namespace::Platform, "admin", None, &["users.view", "users.edit"])
            .unwrap();
        db.upsert_role(Namespace::Platform, "admin", None, &["users.view", "nope.nope"])
            .unwrap();

        let roles = db.list_roles(Namespace::Platform).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].permissions, vec!["users.view".to_string()]);
    }

    #[test]
    fn set_role_permissions_rejects_unknown_permission() {
        let (db, _dir) = temp_database();
        db.upsert_permission(Namespace::Clinic, "patients.view", None)
            .unwrap();
        db.upsert_role(Namespace::Clinic, "doctor", None, &[]).unwrap();

        let err = db
            .set_role_permissions(Namespace::Clinic, "doctor", &["patients.fly".to_string()])
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let role = db
            .set_role_permissions(Namespace::Clinic, "doctor", &["patients.view".to_string()])
            .unwrap();
        assert_eq!(role.permission_ids.len(), 1);
    }

    #[test]
    fn admin_overrides_upsert_single_row_per_pair() {
        let (db, _dir) = temp_database();
        db.upsert_permission(Namespace::Platform, "users.edit", None)
            .unwrap();
        db.upsert_role(Namespace::Platform, "admin", None, &["users.edit"])
            .unwrap();
        let admin = db
            .create_admin_user("a@b.com", "hash", "Ann", "admin")
            .unwrap();

        db.set_admin_override(admin.id, "users.edit", true).unwrap();
        db.set_admin_override(admin.id, "users.edit", false).unwrap();

        let overrides = db.admin_overrides(admin.id).unwrap();
        assert_eq!(overrides.len(), 1);
        assert!(!overrides[0].granted);

        assert!(db.remove_admin_override(admin.id, "users.edit").unwrap());
        assert!(!db.remove_admin_override(admin.id, "users.edit").unwrap());
        assert!(db.admin_overrides(admin.id).unwrap().is_empty());
    }

    #[test]
    fn override_for_unknown_admin_is_not_found() {
        let (db, _dir) = temp_database();
        db.upsert_permission(Namespace::Platform, "users.edit", None)
            .unwrap();
        let err = db.set_admin_override(99, "users.edit", true).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn role_permissions_resolve_through_user_rows() {
        let (db, _dir) = temp_database();
        for p in ["appointments.view", "patients.view"] {
            db.upsert_permission(Namespace::Clinic, p, None).unwrap();
        }
        db.upsert_role(
            Namespace::Clinic,
            "doctor",
            None,
            &["appointments.view", "patients.view"],
        )
        .unwrap();
        let clinic = db.create_clinic("Glow", "glow@clinic.com").unwrap();
        let user = db
            .create_clinic_user(clinic.id, "doc@clinic.com", "hash", "Doc", "doctor")
            .unwrap();

        assert_eq!(
            names(db.clinic_role_permissions(user.id).unwrap()),
            vec!["appointments.view", "patients.view"]
        );
        assert!(matches!(
            db.clinic_role_permissions(user.id + 100),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            db.admin_role_permissions(1),
            Err(StorageError::NotFound(_))
        ));
    }
}
