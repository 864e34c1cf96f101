// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        middleware::{
            admin_auth, clinic_auth, customer_auth, require_clinic_permission,
            require_permission, unified_auth, PermissionGate,
        },
        ClinicPrincipal, CustomerPrincipal, Principal, StaffPrincipal,
    },
    error::ApiError,
    models::{
        AdminLoginRequest, AdminLoginResponse, AdminView, ClinicChoice, ClinicLoginRequest,
        ClinicLoginResponse, ClinicPermissionsResponse, ClinicUserView, CreateClinicRequest,
        CreateClinicResponse, CreateStaffRequest, GroupedPermissionsResponse, LoginResponse,
        LogoutRequest, MessageResponse, RefreshRequest, SendOtpRequest, SetOverrideRequest,
        SetRolePermissionsRequest, TokenPair, VerifyOtpRequest,
    },
    state::AppState,
    storage::{AccountStatus, RoleView, StoredClinic, StoredCustomer, StoredPermission},
};

pub mod admin;
pub mod auth;
pub mod clinic;
pub mod health;
pub mod users;

/// Run storage or hashing work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(ApiError::internal)?
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/otp/send", post(auth::send_otp))
        .route("/auth/otp/verify", post(auth::verify_otp))
        .route("/auth/refresh", post(auth::refresh))
        .route("/admin/login", post(admin::login))
        .route("/clinic/login", post(clinic::login));

    let customer = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::get_me))
        .route_layer(from_fn_with_state(state.clone(), customer_auth));

    let any_session = Router::new()
        .route("/session", get(users::get_session))
        .route_layer(from_fn_with_state(state.clone(), unified_auth));

    let admin_edit = Router::new()
        .route(
            "/admin/admins/{admin_id}/permissions/{permission}",
            put(admin::set_override).delete(admin::remove_override),
        )
        .route("/admin/roles/{role}/permissions", put(admin::set_role_permissions))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state.clone(), "admins.edit"),
            require_permission,
        ));

    let clinic_roles = Router::new()
        .route(
            "/admin/clinic-roles/{role}/permissions",
            put(admin::set_clinic_role_permissions),
        )
        .route_layer(from_fn_with_state(
            PermissionGate::new(state.clone(), "clinics.edit"),
            require_permission,
        ));

    let clinic_registration = Router::new()
        .route("/admin/clinics", post(admin::create_clinic))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state.clone(), "clinics.create"),
            require_permission,
        ));

    let admin = Router::new()
        .route("/admin/logout", post(admin::logout))
        .route("/admin/me", get(admin::get_me))
        .route("/admin/permissions", get(admin::get_permissions))
        .merge(admin_edit)
        .merge(clinic_roles)
        .merge(clinic_registration)
        .route_layer(from_fn_with_state(state.clone(), admin_auth));

    let staff_registration = Router::new()
        .route("/clinic/staff", post(clinic::create_staff))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state.clone(), "staff.create"),
            require_clinic_permission,
        ));

    let clinic = Router::new()
        .route("/clinic/logout", post(clinic::logout))
        .route("/clinic/me", get(clinic::get_me))
        .route("/clinic/permissions", get(clinic::get_permissions))
        .route("/clinic/roles", get(clinic::list_roles))
        .merge(staff_registration)
        .route_layer(from_fn_with_state(state.clone(), clinic_auth));

    let v1_routes = Router::new()
        .merge(public)
        .merge(customer)
        .merge(any_session)
        .merge(admin)
        .merge(clinic);

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::send_otp,
        auth::verify_otp,
        auth::refresh,
        auth::logout,
        users::get_me,
        users::get_session,
        admin::login,
        admin::logout,
        admin::get_me,
        admin::get_permissions,
        admin::set_override,
        admin::remove_override,
        admin::set_role_permissions,
        admin::set_clinic_role_permissions,
        admin::create_clinic,
        clinic::login,
        clinic::logout,
        clinic::get_me,
        clinic::get_permissions,
        clinic::list_roles,
        clinic::create_staff
    ),
    components(
        schemas(
            MessageResponse,
            SendOtpRequest,
            VerifyOtpRequest,
            RefreshRequest,
            LogoutRequest,
            TokenPair,
            LoginResponse,
            AdminLoginRequest,
            AdminLoginResponse,
            AdminView,
            GroupedPermissionsResponse,
            SetOverrideRequest,
            SetRolePermissionsRequest,
            CreateClinicRequest,
            CreateClinicResponse,
            ClinicLoginRequest,
            ClinicLoginResponse,
            ClinicChoice,
            ClinicUserView,
            ClinicPermissionsResponse,
            CreateStaffRequest,
            Principal,
            StaffPrincipal,
            ClinicPrincipal,
            CustomerPrincipal,
            AccountStatus,
            RoleView,
            StoredClinic,
            StoredCustomer,
            StoredPermission,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Auth", description = "Customer OTP login and token refresh"),
        (name = "Users", description = "Caller identity"),
        (name = "Admin", description = "Platform admin login, identity and clinic registration"),
        (name = "Admin RBAC", description = "Role permission lists and per-admin overrides"),
        (name = "Clinic", description = "Clinic staff login, identity and staff registration")
    )
)]
struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    /// Send one request through the router and decode the JSON body.
    ///
    /// An empty body decodes to `Value::Null`.
    pub async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
