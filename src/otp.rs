// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory one-time passcodes for customer email login.
//!
//! One pending code per email. A new code may be requested only after the
//! resend cooldown; a code dies on expiry, on success, or after too many
//! wrong guesses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::sweeper::Sweep;

/// Digits per code.
pub const OTP_LENGTH: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("Please wait before requesting a new OTP")]
    Cooldown,

    #[error("OTP not found. Please request a new one")]
    NotFound,

    #[error("OTP expired. Please request a new one")]
    Expired,

    #[error("too many failed attempts. Please request a new OTP")]
    TooManyAttempts,

    #[error("invalid OTP. {remaining} attempts remaining")]
    Mismatch { remaining: u32 },

    #[error("failed to generate OTP")]
    Rng,
}

#[derive(Debug, Clone, Copy)]
pub struct OtpSettings {
    pub expiry: chrono::Duration,
    pub resend_cooldown: chrono::Duration,
    pub max_attempts: u32,
}

impl OtpSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            expiry: config.otp_expiry,
            resend_cooldown: config.otp_resend_cooldown,
            max_attempts: config.otp_max_attempts,
        }
    }
}

struct PendingOtp {
    code: String,
    expires_at: DateTime<Utc>,
    last_sent_at: DateTime<Utc>,
    attempts: u32,
}

pub struct OtpStore {
    entries: Mutex<HashMap<String, PendingOtp>>,
    settings: OtpSettings,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
}

impl OtpStore {
    pub fn new(settings: OtpSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            settings,
            clock,
            rng: SystemRandom::new(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingOtp>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate and store a new code for `email`, replacing any older one.
    ///
    /// Returns the code so the caller can deliver it.
    pub fn issue(&self, email: &str) -> Result<String, OtpError> {
        let code = self.generate_code()?;
        let now = self.clock.now();

        let mut entries = self.entries();
        if let Some(existing) = entries.get(email) {
            if now - existing.last_sent_at < self.settings.resend_cooldown {
                return Err(OtpError::Cooldown);
            }
        }
        entries.insert(
            email.to_string(),
            PendingOtp {
                code: code.clone(),
                expires_at: now + self.settings.expiry,
                last_sent_at: now,
                attempts: 0,
            },
        );
        Ok(code)
    }

    /// Check a guess. The code is consumed on success.
    pub fn verify(&self, email: &str, code: &str) -> Result<(), OtpError> {
        let now = self.clock.now();
        let mut entries = self.entries();
        let entry = entries.get_mut(email).ok_or(OtpError::NotFound)?;

        if now > entry.expires_at {
            entries.remove(email);
            return Err(OtpError::Expired);
        }
        if entry.attempts >= self.settings.max_attempts {
            entries.remove(email);
            return Err(OtpError::TooManyAttempts);
        }
        if ring::constant_time::verify_slices_are_equal(entry.code.as_bytes(), code.as_bytes())
            .is_err()
        {
            entry.attempts += 1;
            return Err(OtpError::Mismatch {
                remaining: self.settings.max_attempts.saturating_sub(entry.attempts),
            });
        }

        entries.remove(email);
        Ok(())
    }

    /// Drop codes past their expiry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, otp| now <= otp.expires_at);
        before - entries.len()
    }

    /// Uniform decimal digits from the system CSPRNG (rejection sampling).
    fn generate_code(&self) -> Result<String, OtpError> {
        let mut code = String::with_capacity(OTP_LENGTH);
        let mut buf = [0u8; 16];
        while code.len() < OTP_LENGTH {
            self.rng.fill(&mut buf).map_err(|_| OtpError::Rng)?;
            for b in buf {
                // 250 is the largest multiple of 10 that fits in a byte
                if b < 250 && code.len() < OTP_LENGTH {
                    code.push(char::from(b'0' + b % 10));
                }
            }
        }
        Ok(code)
    }
}

impl Sweep for OtpStore {
    fn name(&self) -> &'static str {
        "otp"
    }

    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}
