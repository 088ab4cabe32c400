use axum::{Router, routing::get};

pub mod inventory;
pub mod lines;
pub mod orders;
pub mod releases;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/orders", orders::router())
        .nest("/lines", lines::router())
        .nest("/releases", releases::router())
        .nest("/inventory", inventory::router())
}
