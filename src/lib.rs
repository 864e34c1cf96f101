// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SkinSync - Authentication and Authorization Service
//!
//! Issues and validates bearer tokens for three kinds of principal
//! (platform admins, clinic staff and customers) and resolves their
//! permissions for the HTTP gates in front of the booking API.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Tokens, revocation, permission resolution and request gates
//! - `otp` - One-time login codes for customers
//! - `storage` - Embedded account and RBAC database (redb)
//! - `sweeper` - Background expiry of process-local state

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod otp;
pub mod state;
pub mod storage;
pub mod sweeper;
