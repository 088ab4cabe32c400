//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the fulfillment service and forecast client shared by every handler
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and path/query parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use stockline_infra::config::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(config: &AppConfig) -> Router {
    let jwt = Arc::new(stockline_auth::Hs256JwtValidator::new(config.auth.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::AppServices::in_memory(config));

    // Protected routes: require a verified caller.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
