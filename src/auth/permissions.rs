// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Effective permission resolution with per-namespace TTL caches.
//!
//! ## Admin namespace
//!
//! effective = role permissions, then each override applied as
//! `granted = true` → insert, `granted = false` → remove. There is at most
//! one override per (admin, permission), so the result does not depend on
//! the order overrides are applied in.
//!
//! ## Clinic namespace
//!
//! effective = role permissions. There are no overrides.
//!
//! ## Caching
//!
//! Each namespace owns its own [`PermissionCache`] (an LRU bounded map with
//! a fixed TTL per entry). Storage loads run on the blocking pool under a
//! deadline and never hold the cache lock. A load that started before an
//! invalidation does not write its (possibly stale) result back.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use thiserror::Error;

use crate::clock::Clock;
use crate::storage::{PermissionOverride, StorageError, StorageResult, StoredPermission};

/// Queries the resolvers need from persistence.
///
/// Implementations are synchronous; resolvers call them on the blocking
/// thread pool.
pub trait PermissionSource: Send + Sync + 'static {
    /// Permissions of the admin's role. Unknown admin is `StorageError::NotFound`.
    fn admin_role_permissions(&self, admin_id: u64) -> StorageResult<Vec<StoredPermission>>;

    /// Override rows of the admin, joined with their permission.
    fn admin_overrides(&self, admin_id: u64) -> StorageResult<Vec<PermissionOverride>>;

    /// Permissions of the clinic user's role. Unknown user is `StorageError::NotFound`.
    fn clinic_role_permissions(&self, clinic_user_id: u64) -> StorageResult<Vec<StoredPermission>>;
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("principal not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("permission load timed out after {0:?}")]
    Timeout(Duration),

    #[error("permission load task failed: {0}")]
    Task(String),
}

impl From<StorageError> for PermissionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => PermissionError::NotFound(what),
            other => PermissionError::Storage(other),
        }
    }
}

// =============================================================================
// Effective permission set
// =============================================================================

/// A resolved permission set, keyed by permission name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectivePermissions {
    by_name: BTreeMap<String, StoredPermission>,
}

impl EffectivePermissions {
    /// Role permissions only.
    pub fn from_role(permissions: Vec<StoredPermission>) -> Self {
        let by_name = permissions
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self { by_name }
    }

    /// Role permissions with overrides applied.
    pub fn resolve(role: Vec<StoredPermission>, overrides: Vec<PermissionOverride>) -> Self {
        let mut set = Self::from_role(role);
        for o in overrides {
            if o.granted {
                set.by_name.insert(o.permission.name.clone(), o.permission);
            } else {
                set.by_name.remove(&o.permission.name);
            }
        }
        set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Permission names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Permissions grouped by [`category_of`] their name.
    pub fn grouped(&self) -> BTreeMap<String, Vec<StoredPermission>> {
        let mut grouped: BTreeMap<String, Vec<StoredPermission>> = BTreeMap::new();
        for permission in self.by_name.values() {
            grouped
                .entry(category_of(&permission.name).to_string())
                .or_default()
                .push(permission.clone());
        }
        grouped
    }
}

/// Prefix before the first `.` or `_`; `"general"` when there is neither.
pub fn category_of(name: &str) -> &str {
    match name.find(['.', '_']) {
        Some(i) => &name[..i],
        None => "general",
    }
}

// =============================================================================
// Cache
// =============================================================================

struct CacheEntry {
    permissions: Arc<EffectivePermissions>,
    expires_at: DateTime<Utc>,
}

struct CacheInner {
    entries: LruCache<u64, CacheEntry>,
    /// Bumped on every invalidation so in-flight loads can detect it.
    epoch: u64,
}

/// TTL cache of effective permission sets for one namespace.
pub struct PermissionCache {
    inner: Mutex<CacheInner>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl PermissionCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(capacity: usize, ttl: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                epoch: 0,
            }),
            ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached set for `id`, or `None` if absent or expired.
    pub fn get(&self, id: u64) -> Option<Arc<EffectivePermissions>> {
        let now = self.clock.now();
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.get(&id) {
            if now < entry.expires_at {
                return Some(Arc::clone(&entry.permissions));
            }
            // Expired, remove it
            inner.entries.pop(&id);
        }
        None
    }

    /// Epoch to pass to [`PermissionCache::insert_if_current`] after a load.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Store a loaded set unless an invalidation happened since `epoch`.
    pub fn insert_if_current(&self, id: u64, permissions: Arc<EffectivePermissions>, epoch: u64) {
        let expires_at = self.clock.now() + self.ttl;
        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.entries.put(
                id,
                CacheEntry {
                    permissions,
                    expires_at,
                },
            );
        }
    }

    pub fn invalidate(&self, id: u64) {
        let mut inner = self.lock();
        inner.entries.pop(&id);
        inner.epoch += 1;
    }

    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run a synchronous storage load on the blocking pool with a deadline.
async fn load_blocking<F>(timeout: Duration, load: F) -> Result<EffectivePermissions, PermissionError>
where
    F: FnOnce() -> Result<EffectivePermissions, PermissionError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(load)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(PermissionError::Task(join_err.to_string())),
        Err(_) => Err(PermissionError::Timeout(timeout)),
    }
}

// =============================================================================
// Resolvers
// =============================================================================

/// Effective permissions of platform admins (role + overrides).
pub struct AdminPermissionResolver {
    source: Arc<dyn PermissionSource>,
    cache: PermissionCache,
    timeout: Duration,
}

impl AdminPermissionResolver {
    pub fn new(source: Arc<dyn PermissionSource>, cache: PermissionCache, timeout: Duration) -> Self {
        Self {
            source,
            cache,
            timeout,
        }
    }

    pub async fn effective_permissions(
        &self,
        admin_id: u64,
    ) -> Result<Arc<EffectivePermissions>, PermissionError> {
        if let Some(hit) = self.cache.get(admin_id) {
            return Ok(hit);
        }

        let epoch = self.cache.epoch();
        let source = Arc::clone(&self.source);
        let resolved = load_blocking(self.timeout, move || {
            let role = source.admin_role_permissions(admin_id)?;
            let overrides = source.admin_overrides(admin_id)?;
            Ok(EffectivePermissions::resolve(role, overrides))
        })
        .await?;

        let resolved = Arc::new(resolved);
        self.cache
            .insert_if_current(admin_id, Arc::clone(&resolved), epoch);
        Ok(resolved)
    }

    pub async fn has_permission(&self, admin_id: u64, permission: &str) -> Result<bool, PermissionError> {
        Ok(self.effective_permissions(admin_id).await?.contains(permission))
    }

    pub async fn grouped(
        &self,
        admin_id: u64,
    ) -> Result<BTreeMap<String, Vec<StoredPermission>>, PermissionError> {
        Ok(self.effective_permissions(admin_id).await?.grouped())
    }

    pub fn invalidate(&self, admin_id: u64) {
        self.cache.invalidate(admin_id);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

/// Effective permissions of clinic users (role only).
pub struct ClinicPermissionResolver {
    source: Arc<dyn PermissionSource>,
    cache: PermissionCache,
    timeout: Duration,
}

impl ClinicPermissionResolver {
    pub fn new(source: Arc<dyn PermissionSource>, cache: PermissionCache, timeout: Duration) -> Self {
        Self {
            source,
            cache,
            timeout,
        }
    }

    pub async fn effective_permissions(
        &self,
        clinic_user_id: u64,
    ) -> Result<Arc<EffectivePermissions>, PermissionError> {
        if let Some(hit) = self.cache.get(clinic_user_id) {
            return Ok(hit);
        }

        let epoch = self.cache.epoch();
        let source = Arc::clone(&self.source);
        let resolved = load_blocking(self.timeout, move || {
            Ok(EffectivePermissions::from_role(
                source.clinic_role_permissions(clinic_user_id)?,
            ))
        })
        .await?;

        let resolved = Arc::new(resolved);
        self.cache
            .insert_if_current(clinic_user_id, Arc::clone(&resolved), epoch);
        Ok(resolved)
    }

    pub async fn has_permission(
        &self,
        clinic_user_id: u64,
        permission: &str,
    ) -> Result<bool, PermissionError> {
        Ok(self
            .effective_permissions(clinic_user_id)
            .await?
            .contains(permission))
    }

    pub fn invalidate(&self, clinic_user_id: u64) {
        self.cache.invalidate(clinic_user_id);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn perm(id: u64, name: &str) -> StoredPermission {
        StoredPermission {
            id,
            name: name.to_string(),
            description: None,
        }
    }

    fn names(set: &EffectivePermissions) -> BTreeSet<String> {
        set.names().into_iter().collect()
    }

    fn set_of(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// In-memory source that counts every load.
    #[derive(Default)]
    struct CountingSource {
        admin_roles: Mutex<HashMap<u64, Vec<StoredPermission>>>,
        overrides: Mutex<HashMap<u64, Vec<PermissionOverride>>>,
        clinic_roles: Mutex<HashMap<u64, Vec<StoredPermission>>>,
        admin_loads: AtomicUsize,
        clinic_loads: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    impl CountingSource {
        fn admin(self, id: u64, role: Vec<StoredPermission>, overrides: Vec<PermissionOverride>) -> Self {
            self.admin_roles.lock().unwrap().insert(id, role);
            self.overrides.lock().unwrap().insert(id, overrides);
            self
        }

        fn clinic_user(self, id: u64, role: Vec<StoredPermission>) -> Self {
            self.clinic_roles.lock().unwrap().insert(id, role);
            self
        }
    }

    impl PermissionSource for CountingSource {
        fn admin_role_permissions(&self, admin_id: u64) -> StorageResult<Vec<StoredPermission>> {
            self.admin_loads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.fail {
                return Err(StorageError::Io(std::io::Error::other("db down")));
            }
            self.admin_roles
                .lock()
                .unwrap()
                .get(&admin_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("Admin {admin_id}")))
        }

        fn admin_overrides(&self, admin_id: u64) -> StorageResult<Vec<PermissionOverride>> {
            Ok(self
                .overrides
                .lock()
                .unwrap()
                .get(&admin_id)
                .cloned()
                .unwrap_or_default())
        }

        fn clinic_role_permissions(&self, clinic_user_id: u64) -> StorageResult<Vec<StoredPermission>> {
            self.clinic_loads.fetch_add(1, Ordering::SeqCst);
            self.clinic_roles
                .lock()
                .unwrap()
                .get(&clinic_user_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("Clinic user {clinic_user_id}")))
        }
    }

    struct Fixture {
        source: Arc<CountingSource>,
        clock: Arc<ManualClock>,
        admin: AdminPermissionResolver,
        clinic: ClinicPermissionResolver,
    }

    fn fixture(source: CountingSource) -> Fixture {
        let source = Arc::new(source);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ttl = chrono::Duration::hours(12);
        let timeout = Duration::from_secs(2);
        Fixture {
            admin: AdminPermissionResolver::new(
                source.clone(),
                PermissionCache::new(100, ttl, clock.clone()),
                timeout,
            ),
            clinic: ClinicPermissionResolver::new(
                source.clone(),
                PermissionCache::new(100, ttl, clock.clone()),
                timeout,
            ),
            source,
            clock,
        }
    }

    #[test]
    fn deny_override_removes_role_permission() {
        let set = EffectivePermissions::resolve(
            vec![perm(1, "users.view"), perm(2, "users.edit")],
            vec![PermissionOverride {
                permission: perm(2, "users.edit"),
                granted: false,
            }],
        );
        assert_eq!(names(&set), set_of(&["users.view"]));
    }

    #[test]
    fn grant_override_adds_permission_outside_role() {
        let set = EffectivePermissions::resolve(
            vec![perm(1, "users.view")],
            vec![PermissionOverride {
                permission: perm(9, "reports.export"),
                granted: true,
            }],
        );
        assert_eq!(names(&set), set_of(&["users.view", "reports.export"]));
    }

    #[test]
    fn override_order_does_not_matter() {
        let role = vec![perm(1, "a.view"), perm(2, "b.view"), perm(3, "c.view")];
        let overrides = vec![
            PermissionOverride {
                permission: perm(2, "b.view"),
                granted: false,
            },
            PermissionOverride {
                permission: perm(4, "d.edit"),
                granted: true,
            },
            PermissionOverride {
                permission: perm(3, "c.view"),
                granted: false,
            },
            PermissionOverride {
                permission: perm(5, "e.edit"),
                granted: true,
            },
        ];

        let expected = EffectivePermissions::resolve(role.clone(), overrides.clone());
        // Every rotation and its reverse
        for shift in 0..overrides.len() {
            let mut rotated = overrides.clone();
            rotated.rotate_left(shift);
            assert_eq!(EffectivePermissions::resolve(role.clone(), rotated.clone()), expected);
            rotated.reverse();
            assert_eq!(EffectivePermissions::resolve(role.clone(), rotated), expected);
        }
        assert_eq!(names(&expected), set_of(&["a.view", "d.edit", "e.edit"]));
    }

    #[test]
    fn category_is_prefix_before_dot_or_underscore() {
        assert_eq!(category_of("users.view"), "users");
        assert_eq!(category_of("treatment_records.view"), "treatment");
        assert_eq!(category_of("profile"), "general");
        assert_eq!(category_of(""), "general");
    }

    #[test]
    fn grouped_view_buckets_by_category() {
        let set = EffectivePermissions::from_role(vec![
            perm(1, "users.view"),
            perm(2, "users.edit"),
            perm(3, "clinics.view"),
        ]);
        let grouped = set.grouped();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["users"].len(), 2);
        assert_eq!(grouped["clinics"][0].name, "clinics.view");
    }

    #[tokio::test]
    async fn admin_scenario_deny_override() {
        let f = fixture(CountingSource::default().admin(
            7,
            vec![perm(1, "users.view"), perm(2, "users.edit")],
            vec![PermissionOverride {
                permission: perm(2, "users.edit"),
                granted: false,
            }],
        ));
        let set = f.admin.effective_permissions(7).await.unwrap();
        assert_eq!(names(&set), set_of(&["users.view"]));
        assert!(!f.admin.has_permission(7, "users.edit").await.unwrap());
    }

    #[tokio::test]
    async fn cached_within_ttl_reloaded_once_after() {
        let f = fixture(CountingSource::default().admin(7, vec![perm(1, "users.view")], vec![]));

        let first = f.admin.effective_permissions(7).await.unwrap();
        let second = f.admin.effective_permissions(7).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.source.admin_loads.load(Ordering::SeqCst), 1);

        f.clock.advance(chrono::Duration::hours(11));
        f.admin.effective_permissions(7).await.unwrap();
        assert_eq!(f.source.admin_loads.load(Ordering::SeqCst), 1);

        f.clock.advance(chrono::Duration::hours(1));
        f.admin.effective_permissions(7).await.unwrap();
        f.admin.effective_permissions(7).await.unwrap();
        assert_eq!(f.source.admin_loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidation_forces_reload() {
        let f = fixture(CountingSource::default().admin(7, vec![perm(1, "users.view")], vec![]));
        f.admin.effective_permissions(7).await.unwrap();

        f.source.overrides.lock().unwrap().insert(
            7,
            vec![PermissionOverride {
                permission: perm(1, "users.view"),
                granted: false,
            }],
        );
        // Stale until invalidated
        assert!(f.admin.has_permission(7, "users.view").await.unwrap());

        f.admin.invalidate(7);
        assert!(!f.admin.has_permission(7, "users.view").await.unwrap());
        assert_eq!(f.source.admin_loads.load(Ordering::SeqCst), 2);

        f.admin.invalidate_all();
        f.admin.effective_permissions(7).await.unwrap();
        assert_eq!(f.source.admin_loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn namespaces_never_share_entries() {
        let f = fixture(
            CountingSource::default()
                .admin(42, vec![perm(1, "users.view")], vec![])
                .clinic_user(42, vec![perm(1, "appointments.view"), perm(2, "patients.view")]),
        );

        let admin = f.admin.effective_permissions(42).await.unwrap();
        let clinic = f.clinic.effective_permissions(42).await.unwrap();
        assert_eq!(names(&admin), set_of(&["users.view"]));
        assert_eq!(names(&clinic), set_of(&["appointments.view", "patients.view"]));

        // Each namespace loaded once, and invalidating one leaves the other cached
        f.admin.invalidate(42);
        f.clinic.effective_permissions(42).await.unwrap();
        assert_eq!(f.source.clinic_loads.load(Ordering::SeqCst), 1);
        assert_eq!(f.source.admin_loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clinic_has_no_override_mechanism() {
        let f = fixture(
            CountingSource::default()
                .clinic_user(42, vec![perm(1, "appointments.view"), perm(2, "patients.view")]),
        );
        assert!(f.clinic.has_permission(42, "patients.view").await.unwrap());
        assert!(!f.clinic.has_permission(42, "patients.edit").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_principal_is_not_found() {
        let f = fixture(CountingSource::default());
        assert!(matches!(
            f.admin.has_permission(1, "users.view").await,
            Err(PermissionError::NotFound(_))
        ));
        assert!(matches!(
            f.clinic.has_permission(1, "patients.view").await,
            Err(PermissionError::NotFound(_))
        ));
        // Failures are not cached
        assert!(f.admin.effective_permissions(1).await.is_err());
        assert_eq!(f.source.admin_loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_error() {
        let f = fixture(CountingSource {
            fail: true,
            ..CountingSource::default()
        });
        assert!(matches!(
            f.admin.has_permission(7, "users.view").await,
            Err(PermissionError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn slow_storage_times_out() {
        let source = Arc::new(CountingSource {
            delay: Some(Duration::from_millis(300)),
            ..CountingSource::default()
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let resolver = AdminPermissionResolver::new(
            source,
            PermissionCache::new(10, chrono::Duration::hours(12), clock),
            Duration::from_millis(20),
        );
        assert!(matches!(
            resolver.effective_permissions(7).await,
            Err(PermissionError::Timeout(_))
        ));
    }

    #[test]
    fn load_started_before_invalidation_is_not_cached() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = PermissionCache::new(10, chrono::Duration::hours(1), clock);
        let epoch = cache.epoch();
        cache.invalidate(7);
        cache.insert_if_current(7, Arc::new(EffectivePermissions::default()), epoch);
        assert!(cache.get(7).is_none());

        let epoch = cache.epoch();
        cache.insert_if_current(7, Arc::new(EffectivePermissions::default()), epoch);
        assert!(cache.get(7).is_some());
    }

    #[test]
    fn cache_is_bounded_by_capacity() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = PermissionCache::new(2, chrono::Duration::hours(1), clock);
        for id in 0..5 {
            cache.insert_if_current(id, Arc::new(EffectivePermissions::default()), 0);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(4).is_some());
        assert!(cache.get(0).is_none());
    }
}
