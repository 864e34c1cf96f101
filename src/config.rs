// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup and handed to [`crate::state::AppState`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the redb database | `./data` |
//! | `JWT_SECRET` | Shared HS256 secret for all token kinds | Required for production |
//! | `ACCESS_TOKEN_TTL_HOURS` | Access token lifetime | `24` |
//! | `REFRESH_TOKEN_TTL_DAYS` | Refresh token lifetime | `14` |
//! | `PERMISSION_CACHE_TTL_HOURS` | Permission cache TTL | `12` |
//! | `PERMISSION_CACHE_CAPACITY` | Cached principals per namespace | `10000` |
//! | `REVOCATION_SWEEP_SECS` | Revocation list sweep interval | `300` |
//! | `OTP_EXPIRY_MINUTES` | OTP validity | `5` |
//! | `OTP_RESEND_COOLDOWN_MINUTES` | Minimum gap between OTP sends | `1` |
//! | `OTP_MAX_ATTEMPTS` | Wrong guesses before an OTP is discarded | `5` |
//! | `OTP_SWEEP_SECS` | OTP sweep interval | `60` |
//! | `REFRESH_SWEEP_SECS` | Expired refresh token purge interval | `3600` |
//! | `STORAGE_TIMEOUT_MS` | Deadline for a single permission load | `2000` |
//! | `BOOTSTRAP_ADMIN_EMAIL` | Seeded `super_admin` email | Optional |
//! | `BOOTSTRAP_ADMIN_PASSWORD` | Seeded `super_admin` password | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
///
/// The redb database file `skinsync.redb` lives directly under it.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_HOURS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_DAYS";
pub const PERMISSION_CACHE_TTL_ENV: &str = "PERMISSION_CACHE_TTL_HOURS";
pub const PERMISSION_CACHE_CAPACITY_ENV: &str = "PERMISSION_CACHE_CAPACITY";
pub const REVOCATION_SWEEP_ENV: &str = "REVOCATION_SWEEP_SECS";
pub const OTP_EXPIRY_ENV: &str = "OTP_EXPIRY_MINUTES";
pub const OTP_RESEND_COOLDOWN_ENV: &str = "OTP_RESEND_COOLDOWN_MINUTES";
pub const OTP_MAX_ATTEMPTS_ENV: &str = "OTP_MAX_ATTEMPTS";
pub const OTP_SWEEP_ENV: &str = "OTP_SWEEP_SECS";
pub const REFRESH_SWEEP_ENV: &str = "REFRESH_SWEEP_SECS";
pub const STORAGE_TIMEOUT_ENV: &str = "STORAGE_TIMEOUT_MS";
pub const BOOTSTRAP_ADMIN_EMAIL_ENV: &str = "BOOTSTRAP_ADMIN_EMAIL";
pub const BOOTSTRAP_ADMIN_PASSWORD_ENV: &str = "BOOTSTRAP_ADMIN_PASSWORD";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "skinsync.redb";

/// Secret used only when built with the `dev` feature and `JWT_SECRET` is unset.
#[cfg(feature = "dev")]
const DEV_JWT_SECRET: &str = "skinSync";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Optional seeded platform administrator.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub permission_cache_ttl: chrono::Duration,
    pub permission_cache_capacity: usize,
    pub revocation_sweep_interval: Duration,
    pub otp_expiry: chrono::Duration,
    pub otp_resend_cooldown: chrono::Duration,
    pub otp_max_attempts: u32,
    pub otp_sweep_interval: Duration,
    pub refresh_sweep_interval: Duration,
    pub storage_timeout: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var(HOST_ENV).unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var(PORT_ENV) {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: PORT_ENV,
                value: raw,
            })?,
            Err(_) => 8080,
        };

        let bootstrap_admin = match (
            env::var(BOOTSTRAP_ADMIN_EMAIL_ENV),
            env::var(BOOTSTRAP_ADMIN_PASSWORD_ENV),
        ) {
            (Ok(email), Ok(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        let log_format = match env::var(LOG_FORMAT_ENV).as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host,
            port,
            data_dir: env::var(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            jwt_secret: jwt_secret_from_env()?,
            access_token_ttl: chrono::Duration::hours(positive_or(ACCESS_TOKEN_TTL_ENV, 24)),
            refresh_token_ttl: chrono::Duration::days(positive_or(REFRESH_TOKEN_TTL_ENV, 14)),
            permission_cache_ttl: chrono::Duration::hours(positive_or(PERMISSION_CACHE_TTL_ENV, 12)),
            permission_cache_capacity: positive_or(PERMISSION_CACHE_CAPACITY_ENV, 10_000),
            revocation_sweep_interval: Duration::from_secs(positive_or(REVOCATION_SWEEP_ENV, 300)),
            otp_expiry: chrono::Duration::minutes(positive_or(OTP_EXPIRY_ENV, 5)),
            otp_resend_cooldown: chrono::Duration::minutes(positive_or(OTP_RESEND_COOLDOWN_ENV, 1)),
            otp_max_attempts: positive_or(OTP_MAX_ATTEMPTS_ENV, 5),
            otp_sweep_interval: Duration::from_secs(positive_or(OTP_SWEEP_ENV, 60)),
            refresh_sweep_interval: Duration::from_secs(positive_or(REFRESH_SWEEP_ENV, 3600)),
            storage_timeout: Duration::from_millis(positive_or(STORAGE_TIMEOUT_ENV, 2000)),
            bootstrap_admin,
            log_format,
        })
    }

    /// Path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// `host:port` bind string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    /// Defaults used by tests and local tooling. The secret is a fixed test value.
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            jwt_secret: "test-secret".to_string(),
            access_token_ttl: chrono::Duration::hours(24),
            refresh_token_ttl: chrono::Duration::days(14),
            permission_cache_ttl: chrono::Duration::hours(12),
            permission_cache_capacity: 10_000,
            revocation_sweep_interval: Duration::from_secs(300),
            otp_expiry: chrono::Duration::minutes(5),
            otp_resend_cooldown: chrono::Duration::minutes(1),
            otp_max_attempts: 5,
            otp_sweep_interval: Duration::from_secs(60),
            refresh_sweep_interval: Duration::from_secs(3600),
            storage_timeout: Duration::from_millis(2000),
            bootstrap_admin: None,
            log_format: LogFormat::Pretty,
        }
    }
}

fn jwt_secret_from_env() -> Result<String, ConfigError> {
    match env::var(JWT_SECRET_ENV) {
        Ok(secret) if !secret.is_empty() => Ok(secret),
        #[cfg(feature = "dev")]
        _ => Ok(DEV_JWT_SECRET.to_string()),
        #[cfg(not(feature = "dev"))]
        _ => Err(ConfigError::Missing(JWT_SECRET_ENV)),
    }
}

/// Read a positive number, falling back to `default` when unset, unparsable or zero.
fn positive_or<T>(name: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    parse_positive(env::var(name).ok().as_deref(), default)
}

fn parse_positive<T>(raw: Option<&str>, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    raw.and_then(|s| s.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}
