// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Customer refresh tokens.
//!
//! Rows are keyed `"{lookup}:{record_id}"` so all candidates for one
//! presented token are a single prefix scan. The lookup is not secret
//! material on its own; the Argon2 hash in the row is the actual check.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use tracing::warn;

use super::database::{Database, StorageResult, REFRESH_TOKENS};
use super::records::StoredRefreshToken;
use crate::clock::Clock;
use crate::sweeper::Sweep;

fn row_key(lookup: &str, id: &str) -> String {
    format!("{lookup}:{id}")
}

impl Database {
    pub fn insert_refresh_token(&self, token: &StoredRefreshToken) -> StorageResult<()> {
        let key = row_key(&token.lookup, &token.id);
        let json = serde_json::to_vec(token)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(REFRESH_TOKENS)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All stored tokens whose lookup prefix matches.
    pub fn refresh_candidates(&self, lookup: &str) -> StorageResult<Vec<StoredRefreshToken>> {
        // ':' + 1 == ';', so this range is exactly the "{lookup}:" prefix
        let start = format!("{lookup}:");
        let end = format!("{lookup};");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REFRESH_TOKENS)?;

        let mut rows = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            rows.push(serde_json::from_slice(value.value())?);
        }
        Ok(rows)
    }

    /// Delete one token. Returns whether it existed.
    pub fn delete_refresh_token(&self, lookup: &str, id: &str) -> StorageResult<bool> {
        let key = row_key(lookup, id);
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(REFRESH_TOKENS)?;
            let removed = table.remove(key.as_str())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Delete every refresh token that expired before `now`. Returns the count.
    pub fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let write_txn = self.db.begin_write()?;
        let purged = {
            let mut table = write_txn.open_table(REFRESH_TOKENS)?;
            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let row: StoredRefreshToken = serde_json::from_slice(value.value())?;
                if row.expires_at < now {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                table.remove(key.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(purged)
    }
}

/// Periodic purge of expired refresh tokens.
pub struct RefreshTokenSweep {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl RefreshTokenSweep {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

impl Sweep for RefreshTokenSweep {
    fn name(&self) -> &'static str {
        "refresh_tokens"
    }

    fn sweep(&self) -> usize {
        match self.db.purge_expired_refresh_tokens(self.clock.now()) {
            Ok(purged) => purged,
            Err(e) => {
                warn!(error = %e, "Failed to purge expired refresh tokens");
                0
            }
        }
    }
}
