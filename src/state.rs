// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::permissions::{
    AdminPermissionResolver, ClinicPermissionResolver, PermissionCache, PermissionSource,
};
use crate::auth::revocation::RevocationList;
use crate::auth::tokens::TokenService;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::otp::{OtpSettings, OtpStore};
use crate::storage::Database;

/// Everything a handler or gate may touch. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<TokenService>,
    pub revocations: Arc<RevocationList>,
    pub admin_permissions: Arc<AdminPermissionResolver>,
    pub clinic_permissions: Arc<ClinicPermissionResolver>,
    pub otp: Arc<OtpStore>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database, clock: Arc<dyn Clock>) -> Self {
        let db = Arc::new(db);
        let source: Arc<dyn PermissionSource> = db.clone();

        let admin_cache = PermissionCache::new(
            config.permission_cache_capacity,
            config.permission_cache_ttl,
            clock.clone(),
        );
        let clinic_cache = PermissionCache::new(
            config.permission_cache_capacity,
            config.permission_cache_ttl,
            clock.clone(),
        );

        Self {
            tokens: Arc::new(TokenService::from_config(&config, clock.clone())),
            revocations: Arc::new(RevocationList::new(clock.clone())),
            admin_permissions: Arc::new(AdminPermissionResolver::new(
                source.clone(),
                admin_cache,
                config.storage_timeout,
            )),
            clinic_permissions: Arc::new(ClinicPermissionResolver::new(
                source,
                clinic_cache,
                config.storage_timeout,
            )),
            otp: Arc::new(OtpStore::new(OtpSettings::from_config(&config), clock.clone())),
            config: Arc::new(config),
            db,
            clock,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::clock::SystemClock;
    use crate::storage::database::test_support::temp_database;
    use crate::storage::{seed, StoredAdminUser, StoredClinic, StoredClinicUser};
    use tempfile::TempDir;

    pub const PASSWORD: &str = "Sup3r-secret";

    /// Seeded state over a temp database. Keep the `TempDir` alive for the test.
    pub fn test_state() -> (AppState, TempDir) {
        let (db, dir) = temp_database();
        seed::seed(&db, None).expect("seed");
        let state = AppState::new(AppConfig::default(), db, Arc::new(SystemClock));
        (state, dir)
    }

    pub fn create_admin(state: &AppState, email: &str, role: &str) -> StoredAdminUser {
        let hash = hash_password(PASSWORD).expect("hash");
        state
            .db
            .create_admin_user(email, &hash, "Test Admin", role)
            .expect("create admin")
    }

    pub fn create_clinic_user(
        state: &AppState,
        clinic_name: &str,
        email: &str,
        role: &str,
    ) -> (StoredClinic, StoredClinicUser) {
        let clinic = state
            .db
            .create_clinic(clinic_name, &format!("{clinic_name}@clinic.io"))
            .expect("create clinic");
        let hash = hash_password(PASSWORD).expect("hash");
        let user = state
            .db
            .create_clinic_user(clinic.id, email, &hash, "Test Staff", role)
            .expect("create clinic user");
        (clinic, user)
    }

    pub fn staff_token(state: &AppState, admin: &StoredAdminUser, role: &str) -> String {
        state
            .tokens
            .issue_staff_token(&admin.email, admin.id, role)
            .expect("issue")
            .token
    }

    pub fn clinic_token(state: &AppState, user: &StoredClinicUser, role: &str) -> String {
        state
            .tokens
            .issue_clinic_token(&user.email, user.id, user.clinic_id, role)
            .expect("issue")
            .token
    }

    pub fn customer_token(state: &AppState, email: &str) -> String {
        let (customer, _) = state.db.find_or_create_customer(email).expect("customer");
        state
            .tokens
            .issue_customer_token(&customer.email, customer.id)
            .expect("issue")
            .token
    }
}
