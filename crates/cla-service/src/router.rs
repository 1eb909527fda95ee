//! API Router configuration

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::ServiceState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: ServiceState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        // Signature requests
        .route(
            "/request-individual-signature",
            post(handlers::request_individual_signature),
        )
        .route(
            "/request-corporate-signature",
            post(handlers::request_corporate_signature),
        )
        // Provider completion callbacks
        .route(
            "/signed/individual/:installation_id/:repository_id/:pull_request_id",
            post(handlers::signed_github_individual),
        )
        .route(
            "/signed/gitlab/individual/:user_id/:organization_id/:repository_id/:merge_request_id",
            post(handlers::signed_gitlab_individual),
        )
        .route(
            "/signed/gerrit/individual/:user_id",
            post(handlers::signed_gerrit_individual),
        )
        .route(
            "/signed/corporate/:company_id/:project_id",
            post(handlers::signed_corporate),
        )
        // Reads
        .route("/signatures/:id", get(handlers::get_signature))
        .route(
            "/projects/:id/signatures",
            get(handlers::project_signatures),
        );

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v4", api_routes)
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());

    if server.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
