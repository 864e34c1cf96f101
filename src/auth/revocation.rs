// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process list of logged-out access tokens.
//!
//! An entry lives until its token would have expired anyway; after that the
//! signature check rejects the token on its own and the entry is swept.
//! The list is not shared between processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::sweeper::Sweep;

pub struct RevocationList {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl RevocationList {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        // A map insert or remove cannot leave the map half-written
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Revoke `token` until `expires_at`.
    pub fn revoke(&self, token: &str, expires_at: DateTime<Utc>) {
        self.entries().insert(token.to_string(), expires_at);
    }

    /// Whether `token` has been revoked and not yet swept.
    pub fn is_revoked(&self, token: &str) -> bool {
        self.entries().contains_key(token)
    }

    /// Drop entries whose expiry has passed. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, expires_at| now <= *expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sweep for RevocationList {
    fn name(&self) -> &'static str {
        "revocation"
    }

    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    #[test]
    fn unknown_token_is_not_revoked() {
        let list = RevocationList::new(Arc::new(ManualClock::new(Utc::now())));
        assert!(!list.is_revoked("never-seen"));
        assert!(list.is_empty());
    }

    #[test]
    fn revoked_until_swept_after_expiry() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let list = RevocationList::new(clock.clone());
        let exp = start + Duration::hours(1);

        list.revoke("tok", exp);
        assert!(list.is_revoked("tok"));

        // Sweeping before expiry keeps the entry
        assert_eq!(list.purge_expired(), 0);
        assert!(list.is_revoked("tok"));

        // Exactly at expiry is not yet "past"
        clock.advance(Duration::hours(1));
        assert_eq!(list.purge_expired(), 0);

        clock.advance(Duration::seconds(1));
        assert_eq!(list.sweep(), 1);
        assert!(!list.is_revoked("tok"));
    }

    #[test]
    fn sweep_only_removes_expired_entries() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let list = RevocationList::new(clock.clone());
        list.revoke("short", start + Duration::minutes(1));
        list.revoke("long", start + Duration::hours(1));

        clock.advance(Duration::minutes(2));
        assert_eq!(list.purge_expired(), 1);
        assert!(!list.is_revoked("short"));
        assert!(list.is_revoked("long"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn concurrent_revokes_and_sweeps() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let list = Arc::new(RevocationList::new(clock));
        let exp = Utc::now() + Duration::hours(1);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let list = Arc::clone(&list);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        list.revoke(&format!("t{t}-{i}"), exp);
                        list.purge_expired();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(list.len(), 800);
    }
}
