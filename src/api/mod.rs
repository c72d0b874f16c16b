use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{delete, get, patch, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

mod access_requests;
mod admin;
pub mod auth;
mod error;
mod finance;
mod me;
mod observability;
mod validation;

pub use auth::AuthUser;
pub use error::{ApiError, ErrorBody};

use tokio::sync::RwLock;

use crate::services::{AdminService, AuthService, WorkbookService};
use metrics_exporter_prometheus::PrometheusHandle;

const MAX_WORKBOOK_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn admin_service(&self) -> &Arc<dyn AdminService> {
        &self.shared.admin_service
    }

    #[must_use]
    pub fn workbook_service(&self) -> &Arc<WorkbookService> {
        &self.shared.workbook_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().read().await.server.cors_allowed_origins.clone();

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let cors_layer = cors_layer
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ]);

    Router::new()
        .merge(create_public_router())
        .merge(create_account_router(state.clone()))
        .merge(create_owner_router(state.clone()))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(observability::logging_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
}

/// Routes that authenticate themselves (or not at all).
fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(observability::health))
        .route("/metrics", get(observability::get_metrics))
        .route("/auth/v1/signup", post(auth::sign_up))
        .route("/auth/v1/token", post(auth::sign_in))
        .route("/auth/v1/refresh", post(auth::refresh))
        .route("/auth/v1/logout", post(auth::sign_out))
        .route("/auth/v1/user", get(auth::get_user).put(auth::update_user))
        .route("/auth/v1/recover", post(auth::recover))
        .route(
            "/rest/v1/access-requests",
            post(access_requests::create_access_request),
        )
        .route("/functions/v1/admin-users", post(admin::admin_users))
}

/// Any signed-in identity, active or not, so a deactivated user can still
/// read their own flags.
fn create_account_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/rest/v1/me/profile", get(me::get_profile))
        .route("/rest/v1/me/role", get(me::get_role))
        .route("/rest/v1/me/logins", post(me::record_login))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

/// Owner-scoped finance routes; deactivated profiles are refused.
fn create_owner_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/rest/v1/income",
            get(finance::list_income)
                .post(finance::add_income)
                .delete(finance::clear_income),
        )
        .route(
            "/rest/v1/expenses",
            get(finance::list_expenses)
                .post(finance::add_expense)
                .delete(finance::clear_expenses),
        )
        .route(
            "/rest/v1/savings",
            get(finance::list_savings)
                .post(finance::add_saving)
                .delete(finance::clear_savings),
        )
        .route("/rest/v1/ledgers", delete(finance::clear_all))
        .route(
            "/rest/v1/{kind}/{id}",
            patch(finance::update_entry).delete(finance::delete_entry),
        )
        .route("/rest/v1/summary", get(finance::summary))
        .route("/rest/v1/export", get(finance::export))
        .route(
            "/rest/v1/import",
            post(finance::import).layer(DefaultBodyLimit::max(MAX_WORKBOOK_BYTES)),
        )
        .route("/rest/v1/import/template", get(finance::import_template))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::active_user_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
