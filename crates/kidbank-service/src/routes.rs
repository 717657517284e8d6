//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{allowance, children, health, interest, ledger};
use crate::state::AppState;

/// Maximum concurrent requests for API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Children (JWT auth)
/// - `POST|GET /api/children`
/// - `GET|PUT|DELETE /api/children/:id`
///
/// ## Ledger (JWT auth)
/// - `POST /api/children/:id/deposit`, `POST /api/children/:id/withdraw`
/// - `GET /api/children/:id/balance`, `GET /api/children/:id/transactions`
/// - `GET /api/children/:id/upcoming-allowances?count=N`
///
/// ## Allowance schedules (JWT auth)
/// - `POST|GET /api/schedules`, `GET|PUT|DELETE /api/schedules/:id`
/// - `POST /api/schedules/:id/pause|resume`
/// - `GET|PUT|DELETE /api/children/:id/allowance`, `POST .../allowance/pause|resume`
///
/// ## Interest schedules (JWT auth)
/// - `POST|GET /api/interest-schedules`, `GET|PUT|DELETE /api/interest-schedules/:id`
/// - `POST /api/interest-schedules/:id/pause|resume`
/// - `GET|PUT|DELETE /api/children/:id/interest-schedule`, `POST .../pause|resume`
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins, &state.config.frontend_url);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let child_routes = Router::new()
        .route(
            "/",
            post(children::create_child).get(children::list_children),
        )
        .route(
            "/:id",
            get(children::get_child)
                .put(children::update_child)
                .delete(children::delete_child),
        )
        // Ledger
        .route("/:id/deposit", post(ledger::deposit))
        .route("/:id/withdraw", post(ledger::withdraw))
        .route("/:id/balance", get(ledger::get_balance))
        .route("/:id/transactions", get(ledger::list_transactions))
        .route(
            "/:id/upcoming-allowances",
            get(ledger::upcoming_allowances),
        )
        // Per-child schedules
        .route(
            "/:id/allowance",
            get(allowance::get_child_allowance)
                .put(allowance::put_child_allowance)
                .delete(allowance::delete_child_allowance),
        )
        .route(
            "/:id/allowance/pause",
            post(allowance::pause_child_allowance),
        )
        .route(
            "/:id/allowance/resume",
            post(allowance::resume_child_allowance),
        )
        .route(
            "/:id/interest-schedule",
            get(interest::get_child_schedule)
                .put(interest::put_child_schedule)
                .delete(interest::delete_child_schedule),
        )
        .route(
            "/:id/interest-schedule/pause",
            post(interest::pause_child_schedule),
        )
        .route(
            "/:id/interest-schedule/resume",
            post(interest::resume_child_schedule),
        );

    let allowance_routes = Router::new()
        .route(
            "/",
            post(allowance::create_schedule).get(allowance::list_schedules),
        )
        .route(
            "/:id",
            get(allowance::get_schedule)
                .put(allowance::update_schedule)
                .delete(allowance::delete_schedule),
        )
        .route("/:id/pause", post(allowance::pause_schedule))
        .route("/:id/resume", post(allowance::resume_schedule));

    let interest_routes = Router::new()
        .route(
            "/",
            post(interest::create_schedule).get(interest::list_schedules),
        )
        .route(
            "/:id",
            get(interest::get_schedule)
                .put(interest::update_schedule)
                .delete(interest::delete_schedule),
        )
        .route("/:id/pause", post(interest::pause_schedule))
        .route("/:id/resume", post(interest::resume_schedule));

    let api_routes = Router::new()
        .nest("/children", child_routes)
        .nest("/schedules", allowance_routes)
        .nest("/interest-schedules", interest_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/api", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins; the frontend is always allowed.
fn build_cors_layer(origins: &[String], frontend_url: &str) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(frontend_url))
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
