// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin users, clinics, clinic users and customers.
//!
//! Emails are normalized (NFKC, trimmed, lowercased) before they touch an
//! index, so lookups are insensitive to case and compatibility forms.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use unicode_normalization::UnicodeNormalization;

use super::database::{
    next_id, read_row, write_row, Database, StorageError, StorageResult, ADMIN_EMAILS,
    ADMIN_USERS, CLINICS, CLINIC_USERS, CLINIC_USER_EMAILS, CUSTOMERS, CUSTOMER_EMAILS,
};
use super::records::{
    AccountStatus, ClinicMembership, Namespace, StoredAdminUser, StoredClinic, StoredClinicUser,
    StoredCustomer, StoredRole,
};

/// Canonical form of an email address used for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfkc().collect::<String>().to_lowercase()
}

impl Database {
    // -------------------------------------------------------------------------
    // Admin users
    // -------------------------------------------------------------------------

    /// Create an active admin user holding `role_name`.
    pub fn create_admin_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role_name: &str,
    ) -> StorageResult<StoredAdminUser> {
        let email = normalize_email(email);
        let t = Namespace::Platform.tables();
        let write_txn = self.db.begin_write()?;
        let admin = {
            let role_id = write_txn
                .open_table(t.role_names)?
                .get(role_name)?
                .map(|v| v.value())
                .ok_or_else(|| StorageError::NotFound(format!("Role {role_name}")))?;

            let mut emails = write_txn.open_table(ADMIN_EMAILS)?;
            if emails.get(email.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!("Admin {email}")));
            }

            let id = next_id(&write_txn, "admin_users")?;
            let admin = StoredAdminUser {
                id,
                email: email.clone(),
                password_hash: password_hash.to_string(),
                name: name.to_string(),
                role_id,
                status: AccountStatus::Active,
                last_login: None,
                created_at: Utc::now(),
            };
            let mut admins = write_txn.open_table(ADMIN_USERS)?;
            write_row(&mut admins, id, &admin)?;
            emails.insert(email.as_str(), id)?;
            admin
        };
        write_txn.commit()?;
        Ok(admin)
    }

    pub fn admin_by_email(&self, email: &str) -> StorageResult<Option<StoredAdminUser>> {
        let email = normalize_email(email);
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(ADMIN_EMAILS)?;
        let Some(id) = emails.get(email.as_str())?.map(|v| v.value()) else {
            return Ok(None);
        };
        let admins = read_txn.open_table(ADMIN_USERS)?;
        read_row(&admins, id)
    }

    /// Admin together with the name of its role.
    pub fn admin_with_role(&self, id: u64) -> StorageResult<(StoredAdminUser, String)> {
        let read_txn = self.db.begin_read()?;
        let admins = read_txn.open_table(ADMIN_USERS)?;
        let admin: StoredAdminUser =
            read_row(&admins, id)?.ok_or_else(|| StorageError::NotFound(format!("Admin {id}")))?;
        let roles = read_txn.open_table(Namespace::Platform.tables().roles)?;
        let role_name = read_row::<StoredRole, _>(&roles, admin.role_id)?
            .map(|r| r.name)
            .unwrap_or_default();
        Ok((admin, role_name))
    }

    pub fn record_admin_login(&self, id: u64, at: DateTime<Utc>) -> StorageResult<()> {
        self.update_admin(id, |admin| admin.last_login = Some(at))
    }

    fn update_admin(&self, id: u64, f: impl FnOnce(&mut StoredAdminUser)) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut admins = write_txn.open_table(ADMIN_USERS)?;
            let mut admin: StoredAdminUser = read_row(&admins, id)?
                .ok_or_else(|| StorageError::NotFound(format!("Admin {id}")))?;
            f(&mut admin);
            write_row(&mut admins, id, &admin)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Clinics
    // -------------------------------------------------------------------------

    pub fn create_clinic(&self, name: &str, email: &str) -> StorageResult<StoredClinic> {
        let write_txn = self.db.begin_write()?;
        let clinic = insert_clinic(&write_txn, name, email)?;
        write_txn.commit()?;
        Ok(clinic)
    }

    /// Register a clinic and its `owner` membership in one transaction.
    pub fn create_clinic_with_owner(
        &self,
        name: &str,
        email: &str,
        owner_email: &str,
        owner_password_hash: &str,
        owner_name: &str,
    ) -> StorageResult<(StoredClinic, StoredClinicUser)> {
        let write_txn = self.db.begin_write()?;
        let clinic = insert_clinic(&write_txn, name, email)?;
        let owner = insert_clinic_user(
            &write_txn,
            clinic.id,
            owner_email,
            owner_password_hash,
            owner_name,
            "owner",
        )?;
        write_txn.commit()?;
        Ok((clinic, owner))
    }

    /// Add a membership of `email` in `clinic_id` with a clinic role.
    ///
    /// The same email may belong to several clinics, but only once per clinic.
    pub fn create_clinic_user(
        &self,
        clinic_id: u64,
        email: &str,
        password_hash: &str,
        name: &str,
        role_name: &str,
    ) -> StorageResult<StoredClinicUser> {
        let write_txn = self.db.begin_write()?;
        let user = insert_clinic_user(&write_txn, clinic_id, email, password_hash, name, role_name)?;
        write_txn.commit()?;
        Ok(user)
    }

    /// Every clinic membership of `email`, ordered by clinic id.
    pub fn clinic_memberships(&self, email: &str) -> StorageResult<Vec<ClinicMembership>> {
        let email = normalize_email(email);
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(CLINIC_USER_EMAILS)?;
        let users = read_txn.open_table(CLINIC_USERS)?;
        let clinics = read_txn.open_table(CLINICS)?;
        let roles = read_txn.open_table(Namespace::Clinic.tables().roles)?;

        let mut memberships = Vec::new();
        for entry in emails.range((email.as_str(), 0)..=(email.as_str(), u64::MAX))? {
            let (_, user_id) = entry?;
            let Some(user) = read_row::<StoredClinicUser, _>(&users, user_id.value())? else {
                continue;
            };
            let Some(clinic) = read_row::<StoredClinic, _>(&clinics, user.clinic_id)? else {
                continue;
            };
            let role_name = read_row::<StoredRole, _>(&roles, user.role_id)?
                .map(|r| r.name)
                .unwrap_or_default();
            memberships.push(ClinicMembership {
                user,
                clinic,
                role_name,
            });
        }
        Ok(memberships)
    }

    /// Membership by clinic user id, joined like [`Database::clinic_memberships`].
    pub fn clinic_membership(&self, clinic_user_id: u64) -> StorageResult<ClinicMembership> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(CLINIC_USERS)?;
        let user: StoredClinicUser = read_row(&users, clinic_user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Clinic user {clinic_user_id}")))?;
        let clinics = read_txn.open_table(CLINICS)?;
        let clinic: StoredClinic = read_row(&clinics, user.clinic_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Clinic {}", user.clinic_id)))?;
        let roles = read_txn.open_table(Namespace::Clinic.tables().roles)?;
        let role_name = read_row::<StoredRole, _>(&roles, user.role_id)?
            .map(|r| r.name)
            .unwrap_or_default();
        Ok(ClinicMembership {
            user,
            clinic,
            role_name,
        })
    }

    pub fn record_clinic_login(&self, id: u64, at: DateTime<Utc>) -> StorageResult<()> {
        self.update_clinic_user(id, |user| user.last_login = Some(at))
    }

    fn update_clinic_user(&self, id: u64, f: impl FnOnce(&mut StoredClinicUser)) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(CLINIC_USERS)?;
            let mut user: StoredClinicUser = read_row(&users, id)?
                .ok_or_else(|| StorageError::NotFound(format!("Clinic user {id}")))?;
            f(&mut user);
            write_row(&mut users, id, &user)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Customers
    // -------------------------------------------------------------------------

    /// Look a customer up by email, creating the account on first sight.
    ///
    /// The flag is `true` when the account was created by this call.
    pub fn find_or_create_customer(&self, email: &str) -> StorageResult<(StoredCustomer, bool)> {
        let email = normalize_email(email);
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut emails = write_txn.open_table(CUSTOMER_EMAILS)?;
            let mut customers = write_txn.open_table(CUSTOMERS)?;
            let existing = emails.get(email.as_str())?.map(|v| v.value());
            match existing {
                Some(id) => {
                    let customer = read_row(&customers, id)?
                        .ok_or_else(|| StorageError::NotFound(format!("Customer {id}")))?;
                    (customer, false)
                }
                None => {
                    let id = next_id(&write_txn, "customers")?;
                    let customer = StoredCustomer {
                        id,
                        email: email.clone(),
                        created_at: Utc::now(),
                    };
                    write_row(&mut customers, id, &customer)?;
                    emails.insert(email.as_str(), id)?;
                    (customer, true)
                }
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    pub fn customer(&self, id: u64) -> StorageResult<Option<StoredCustomer>> {
        let read_txn = self.db.begin_read()?;
        let customers = read_txn.open_table(CUSTOMERS)?;
        read_row(&customers, id)
    }
}

fn insert_clinic(txn: &WriteTransaction, name: &str, email: &str) -> StorageResult<StoredClinic> {
    let email = normalize_email(email);
    let mut clinics = txn.open_table(CLINICS)?;
    for entry in clinics.iter()? {
        let (_, value) = entry?;
        let existing: StoredClinic = serde_json::from_slice(value.value())?;
        if existing.email == email {
            return Err(StorageError::AlreadyExists(format!("Clinic {email}")));
        }
    }

    let id = next_id(txn, "clinics")?;
    let clinic = StoredClinic {
        id,
        name: name.to_string(),
        email,
        status: AccountStatus::Active,
        created_at: Utc::now(),
    };
    write_row(&mut clinics, id, &clinic)?;
    Ok(clinic)
}

fn insert_clinic_user(
    txn: &WriteTransaction,
    clinic_id: u64,
    email: &str,
    password_hash: &str,
    name: &str,
    role_name: &str,
) -> StorageResult<StoredClinicUser> {
    let email = normalize_email(email);
    if txn.open_table(CLINICS)?.get(clinic_id)?.is_none() {
        return Err(StorageError::NotFound(format!("Clinic {clinic_id}")));
    }
    let role_id = txn
        .open_table(Namespace::Clinic.tables().role_names)?
        .get(role_name)?
        .map(|v| v.value())
        .ok_or_else(|| StorageError::NotFound(format!("Clinic role {role_name}")))?;

    let mut emails = txn.open_table(CLINIC_USER_EMAILS)?;
    if emails.get((email.as_str(), clinic_id))?.is_some() {
        return Err(StorageError::AlreadyExists(format!(
            "Clinic user {email} in clinic {clinic_id}"
        )));
    }

    let id = next_id(txn, "clinic_users")?;
    let user = StoredClinicUser {
        id,
        clinic_id,
        email: email.clone(),
        password_hash: password_hash.to_string(),
        name: name.to_string(),
        role_id,
        status: AccountStatus::Active,
        last_login: None,
        created_at: Utc::now(),
    };
    let mut users = txn.open_table(CLINIC_USERS)?;
    write_row(&mut users, id, &user)?;
    emails.insert((email.as_str(), clinic_id), id)?;
    Ok(user)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::temp_database;

    fn seed_roles(db: &Database) {
        db.upsert_role(Namespace::Platform, "admin", None, &[]).unwrap();
        db.upsert_role(Namespace::Clinic, "owner", None, &[]).unwrap();
        db.upsert_role(Namespace::Clinic, "doctor", None, &[]).unwrap();
    }

    #[test]
    fn normalize_email_folds_case_and_width() {
        assert_eq!(normalize_email("  Ann@Example.COM "), "ann@example.com");
        // Fullwidth "Ａ" normalizes to ASCII "a"
        assert_eq!(normalize_email("\u{FF21}nn@x.io"), "ann@x.io");
    }

    #[test]
    fn admin_email_is_unique_after_normalization() {
        let (db, _dir) = temp_database();
        seed_roles(&db);
        let admin = db.create_admin_user("Ann@x.io", "h", "Ann", "admin").unwrap();
        assert_eq!(admin.email, "ann@x.io");
        assert!(admin.status.is_active());

        let err = db
            .create_admin_user("ann@X.io", "h", "Ann", "admin")
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        let found = db.admin_by_email("ANN@x.io").unwrap().unwrap();
        assert_eq!(found.id, admin.id);
    }

    #[test]
    fn admin_with_unknown_role_is_rejected() {
        let (db, _dir) = temp_database();
        let err = db
            .create_admin_user("a@x.io", "h", "A", "wizard")
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn record_admin_login_updates_timestamp() {
        let (db, _dir) = temp_database();
        seed_roles(&db);
        let admin = db.create_admin_user("a@x.io", "h", "A", "admin").unwrap();
        let at = Utc::now();
        db.record_admin_login(admin.id, at).unwrap();

        let (stored, role) = db.admin_with_role(admin.id).unwrap();
        assert_eq!(stored.last_login, Some(at));
        assert_eq!(role, "admin");
    }

    #[test]
    fn one_email_may_join_several_clinics_once_each() {
        let (db, _dir) = temp_database();
        seed_roles(&db);
        let glow = db.create_clinic("Glow", "glow@c.io").unwrap();
        let luma = db.create_clinic("Luma", "luma@c.io").unwrap();

        db.create_clinic_user(glow.id, "doc@c.io", "h", "Doc", "doctor")
            .unwrap();
        db.create_clinic_user(luma.id, "doc@c.io", "h", "Doc", "owner")
            .unwrap();
        let dup = db
            .create_clinic_user(glow.id, "DOC@c.io", "h", "Doc", "doctor")
            .unwrap_err();
        assert!(matches!(dup, StorageError::AlreadyExists(_)));

        let memberships = db.clinic_memberships("doc@c.io").unwrap();
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[0].clinic.name, "Glow");
        assert_eq!(memberships[0].role_name, "doctor");
        assert_eq!(memberships[1].role_name, "owner");

        assert!(db.clinic_memberships("nobody@c.io").unwrap().is_empty());
    }

    #[test]
    fn clinic_user_requires_existing_clinic() {
        let (db, _dir) = temp_database();
        seed_roles(&db);
        let err = db
            .create_clinic_user(42, "doc@c.io", "h", "Doc", "doctor")
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn find_or_create_customer_reports_creation() {
        let (db, _dir) = temp_database();
        let (first, created) = db.find_or_create_customer("Eve@x.io").unwrap();
        assert!(created);
        let (again, created) = db.find_or_create_customer("eve@x.io").unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);
        assert_eq!(db.customer(first.id).unwrap().unwrap().email, "eve@x.io");
    }

    #[test]
    fn clinic_email_is_unique() {
        let (db, _dir) = temp_database();
        db.create_clinic("Glow", "glow@c.io").unwrap();
        let err = db.create_clinic("Glow 2", "GLOW@c.io").unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn clinic_with_owner_is_atomic() {
        let (db, _dir) = temp_database();
        seed_roles(&db);
        let (clinic, owner) = db
            .create_clinic_with_owner("Glow", "glow@c.io", "Own@c.io", "h", "Owner")
            .unwrap();
        let membership = db.clinic_membership(owner.id).unwrap();
        assert_eq!(membership.clinic.id, clinic.id);
        assert_eq!(membership.role_name, "owner");
        assert_eq!(membership.user.email, "own@c.io");
    }

    #[test]
    fn status_updates_are_persisted() {
        let (db, _dir) = temp_database();
        seed_roles(&db);
        let clinic = db.create_clinic("Glow", "glow@c.io").unwrap();
        let user = db
            .create_clinic_user(clinic.id, "doc@c.io", "h", "Doc", "doctor")
            .unwrap();
        db.set_clinic_status(clinic.id, AccountStatus::Suspended).unwrap();
        db.set_clinic_user_status(user.id, AccountStatus::Inactive).unwrap();

        let membership = db.clinic_membership(user.id).unwrap();
        assert_eq!(membership.clinic.status, AccountStatus::Suspended);
        assert_eq!(membership.user.status, AccountStatus::Inactive);
    }
}
