// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Idempotent startup seeding of the RBAC catalogs and the bootstrap admin.
//!
//! Seeding a role rewrites its permission list, so edits made through the
//! API to a seeded role are reset on restart.

use tracing::info;

use super::database::{Database, StorageResult};
use super::records::Namespace;
use crate::auth::password::{hash_password, PasswordError};
use crate::config::BootstrapAdmin;

struct RoleSeed {
    name: &'static str,
    description: &'static str,
    permissions: &'static [&'static str],
}

const PLATFORM_PERMISSIONS: &[(&str, &str)] = &[
    ("users.view", "View customer users"),
    ("users.edit", "Edit customer users"),
    ("users.delete", "Delete customer users"),
    ("clinics.view", "View clinics"),
    ("clinics.create", "Create/Register clinics"),
    ("clinics.edit", "Edit clinics"),
    ("clinics.delete", "Delete clinics"),
    ("treatments.view", "View treatments"),
    ("treatments.edit", "Edit treatments"),
    ("treatments.delete", "Delete treatments"),
    ("onboarding.view", "View onboarding questions"),
    ("onboarding.edit", "Edit onboarding questions"),
    ("onboarding.delete", "Delete onboarding questions"),
    ("analytics.view", "View analytics and reports"),
    ("analytics.export", "Export reports"),
    ("admins.view", "View admin users"),
    ("admins.create", "Create admin users"),
    ("admins.edit", "Edit admin users"),
    ("admins.delete", "Delete admin users"),
    ("appointments.view", "View appointments"),
    ("appointments.edit", "Edit appointments"),
    ("appointments.delete", "Delete appointments"),
    ("profile.view", "View own profile"),
    ("profile.edit", "Edit own profile"),
];

const PLATFORM_ROLES: &[RoleSeed] = &[
    RoleSeed {
        name: "super_admin",
        description: "Super administrator with all permissions",
        permissions: &[
            "users.view",
            "users.edit",
            "users.delete",
            "clinics.view",
            "clinics.create",
            "clinics.edit",
            "clinics.delete",
            "treatments.view",
            "treatments.edit",
            "treatments.delete",
            "onboarding.view",
            "onboarding.edit",
            "onboarding.delete",
            "analytics.view",
            "analytics.export",
            "admins.view",
            "admins.create",
            "admins.edit",
            "admins.delete",
            "appointments.view",
            "appointments.edit",
            "appointments.delete",
            "profile.view",
            "profile.edit",
        ],
    },
    RoleSeed {
        name: "admin",
        description: "Administrator with most permissions",
        permissions: &[
            "users.view",
            "users.edit",
            "clinics.view",
            "clinics.edit",
            "treatments.view",
            "treatments.edit",
            "onboarding.view",
            "analytics.view",
            "admins.view",
            "appointments.view",
            "appointments.edit",
            "profile.view",
            "profile.edit",
        ],
    },
];

const CLINIC_PERMISSIONS: &[(&str, &str)] = &[
    ("staff.view", "View clinic staff"),
    ("staff.create", "Create/Register clinic staff"),
    ("staff.edit", "Edit clinic staff"),
    ("staff.delete", "Delete clinic staff"),
    ("appointments.view", "View appointments"),
    ("appointments.create", "Create appointments"),
    ("appointments.edit", "Edit appointments"),
    ("appointments.delete", "Delete/Cancel appointments"),
    ("patients.view", "View patient records"),
    ("patients.create", "Create patient records"),
    ("patients.edit", "Edit patient records"),
    ("patients.delete", "Delete patient records"),
    ("treatment_records.view", "View treatment records"),
    ("treatment_records.create", "Create treatment records"),
    ("treatment_records.edit", "Edit treatment records"),
    ("clinic.view", "View clinic settings"),
    ("clinic.edit", "Edit clinic settings"),
    ("areas.edit", "Edit treatment areas and pricing"),
    ("reports.view", "View reports and analytics"),
    ("reports.export", "Export reports"),
    ("profile.view", "View own profile"),
    ("profile.edit", "Edit own profile"),
];

const CLINIC_ROLES: &[RoleSeed] = &[
    RoleSeed {
        name: "owner",
        description: "Clinic owner with full access to clinic management",
        permissions: &[
            "staff.view",
            "staff.create",
            "staff.edit",
            "staff.delete",
            "appointments.view",
            "appointments.create",
            "appointments.edit",
            "appointments.delete",
            "patients.view",
            "patients.create",
            "patients.edit",
            "patients.delete",
            "treatment_records.view",
            "treatment_records.create",
            "treatment_records.edit",
            "clinic.view",
            "clinic.edit",
            "areas.edit",
            "reports.view",
            "reports.export",
            "profile.view",
            "profile.edit",
        ],
    },
    RoleSeed {
        name: "manager",
        description: "Clinic manager with administrative access",
        permissions: &[
            "staff.view",
            "staff.create",
            "staff.edit",
            "appointments.view",
            "appointments.create",
            "appointments.edit",
            "appointments.delete",
            "patients.view",
            "patients.create",
            "patients.edit",
            "treatment_records.view",
            "clinic.view",
            "areas.edit",
            "reports.view",
            "profile.view",
            "profile.edit",
        ],
    },
    RoleSeed {
        name: "doctor",
        description: "Doctor/Physician at the clinic",
        permissions: &[
            "appointments.view",
            "appointments.edit",
            "patients.view",
            "patients.edit",
            "treatment_records.view",
            "treatment_records.create",
            "treatment_records.edit",
            "profile.view",
            "profile.edit",
        ],
    },
    RoleSeed {
        name: "injector",
        description: "Injector/Aesthetician performing treatments",
        permissions: &[
            "appointments.view",
            "patients.view",
            "treatment_records.view",
            "treatment_records.create",
            "profile.view",
            "profile.edit",
        ],
    },
    RoleSeed {
        name: "receptionist",
        description: "Front desk staff handling appointments",
        permissions: &[
            "appointments.view",
            "appointments.create",
            "appointments.edit",
            "patients.view",
            "patients.create",
            "profile.view",
            "profile.edit",
        ],
    },
];

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Storage(#[from] super::database::StorageError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

fn seed_namespace(
    db: &Database,
    ns: Namespace,
    permissions: &[(&str, &str)],
    roles: &[RoleSeed],
) -> StorageResult<()> {
    for (name, description) in permissions {
        db.upsert_permission(ns, name, Some(description))?;
    }
    for role in roles {
        db.upsert_role(ns, role.name, Some(role.description), role.permissions)?;
    }
    Ok(())
}

/// Seed both catalogs and, when configured, a `super_admin` account.
pub fn seed(db: &Database, bootstrap: Option<&BootstrapAdmin>) -> Result<(), SeedError> {
    seed_namespace(db, Namespace::Platform, PLATFORM_PERMISSIONS, PLATFORM_ROLES)?;
    seed_namespace(db, Namespace::Clinic, CLINIC_PERMISSIONS, CLINIC_ROLES)?;
    info!(
        platform_permissions = PLATFORM_PERMISSIONS.len(),
        clinic_permissions = CLINIC_PERMISSIONS.len(),
        "RBAC catalogs seeded"
    );

    if let Some(admin) = bootstrap {
        if db.admin_by_email(&admin.email)?.is_none() {
            let hash = hash_password(&admin.password)?;
            let created = db.create_admin_user(&admin.email, &hash, "Super Admin", "super_admin")?;
            info!(admin_id = created.id, "Bootstrap admin created");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::PermissionSource;
    use crate::storage::database::test_support::temp_database;

    #[test]
    fn seed_is_idempotent() {
        let (db, _dir) = temp_database();
        seed(&db, None).unwrap();
        seed(&db, None).unwrap();

        let platform = db.list_roles(Namespace::Platform).unwrap();
        assert_eq!(platform.len(), 2);
        let clinic = db.list_roles(Namespace::Clinic).unwrap();
        assert_eq!(clinic.len(), 5);

        let super_admin = platform.iter().find(|r| r.name == "super_admin").unwrap();
        assert_eq!(super_admin.permissions.len(), PLATFORM_PERMISSIONS.len());
    }

    #[test]
    fn bootstrap_admin_gets_super_admin_role() {
        let (db, _dir) = temp_database();
        let bootstrap = BootstrapAdmin {
            email: "root@skinsync.io".to_string(),
            password: "correct horse".to_string(),
        };
        seed(&db, Some(&bootstrap)).unwrap();
        seed(&db, Some(&bootstrap)).unwrap();

        let admin = db.admin_by_email("root@skinsync.io").unwrap().unwrap();
        let perms = db.admin_role_permissions(admin.id).unwrap();
        assert!(perms.iter().any(|p| p.name == "admins.delete"));
    }

    #[test]
    fn admin_role_has_view_only_onboarding() {
        let (db, _dir) = temp_database();
        seed(&db, None).unwrap();
        let role = db
            .list_roles(Namespace::Platform)
            .unwrap()
            .into_iter()
            .find(|r| r.name == "admin")
            .unwrap();
        assert!(role.permissions.contains(&"onboarding.view".to_string()));
        assert!(!role.permissions.contains(&"onboarding.edit".to_string()));
    }
}
