// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session tokens and role-based access control for the three principal
//! kinds: customers, platform staff (admins) and clinic staff.
//!
//! ## Auth Flow
//!
//! 1. Login (OTP, admin password, clinic password) issues an HS256 JWT
//! 2. Client sends `Authorization: Bearer <token>`
//! 3. A gate (see [`middleware`]):
//!    - verifies signature and `exp` with the shared secret
//!    - classifies the claims into a [`Principal`] (admin → clinic → customer)
//!    - rejects tokens on the [`RevocationList`] (logged out)
//!    - optionally checks a permission against the principal's namespace
//! 4. Handlers receive the typed principal through an extractor
//!
//! ## Security
//!
//! - Token failures all render as one generic 401
//! - Permission sets are cached per namespace with a fixed TTL and are
//!   invalidated by every RBAC mutation endpoint
//! - Revocations are process-local

pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod revocation;
pub mod signer;
pub mod tokens;

pub use claims::{ClinicPrincipal, CustomerPrincipal, Principal, Session, StaffPrincipal};
pub use error::AuthError;
pub use extractor::{AnyAuth, ClinicAuth, CustomerAuth, SessionAuth, StaffAuth};
pub use permissions::{AdminPermissionResolver, ClinicPermissionResolver, PermissionSource};
pub use revocation::RevocationList;
pub use tokens::TokenService;
