use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use stockline_orders::{ReleaseId, ReleaseStatus};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(get_release))
        .route("/:id/status", post(update_release_status))
}

pub async fn get_release(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let release_id: ReleaseId = match dto::parse_id(&id, "release") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.get_release(release_id)).await
}

pub async fn update_release_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateReleaseStatusRequest>,
) -> axum::response::Response {
    let release_id: ReleaseId = match dto::parse_id(&id, "release") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status: ReleaseStatus = match body.status.parse() {
        Ok(v) => v,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", format!("{e}")),
    };

    let actor = *principal.actor();
    errors::respond_blocking(StatusCode::OK, &services, move |s| {
        s.fulfillment.update_release_status(&actor, release_id, status)
    })
    .await
}
