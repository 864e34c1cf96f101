// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Periodic Sweeper
//!
//! Background task that periodically drops expired entries from a
//! process-local store (revoked tokens, pending OTPs, expired refresh
//! tokens).
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown. The
//! first sweep happens one interval after start.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something with expired entries to drop.
pub trait Sweep: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Remove expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

pub struct Sweeper<S: Sweep> {
    target: Arc<S>,
    interval: Duration,
}

impl<S: Sweep> Sweeper<S> {
    pub fn new(target: Arc<S>, interval: Duration) -> Self {
        Self { target, interval }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        let name = self.target.name();
        info!(
            sweeper = name,
            interval_secs = self.interval.as_secs(),
            "Sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!(sweeper = name, "Sweeper shutting down");
                    return;
                }
            }

            let target = Arc::clone(&self.target);
            match tokio::task::spawn_blocking(move || target.sweep()).await {
                Ok(0) => {}
                Ok(removed) => debug!(sweeper = name, removed, "Sweep removed expired entries"),
                Err(e) => warn!(sweeper = name, error = %e, "Sweep task failed"),
            }
        }
    }
}
