use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use stockline_orders::OrderLineId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/available", get(list_available_lines))
        .route("/:id", get(get_line))
        .route("/:id/audit", get(audit_line))
        .route("/:id/releases", get(list_releases).post(create_release))
}

pub async fn list_available_lines(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.run(|s| s.fulfillment.list_available_lines()).await {
        Ok(lines) => Json(lines).into_response(),
        Err(err) => errors::task_failed(err),
    }
}

pub async fn get_line(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let line_id: OrderLineId = match dto::parse_id(&id, "line") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.get_line(line_id)).await
}

pub async fn audit_line(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let line_id: OrderLineId = match dto::parse_id(&id, "line") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.audit_line(line_id)).await
}

pub async fn list_releases(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let line_id: OrderLineId = match dto::parse_id(&id, "line") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.list_releases(line_id)).await
}

pub async fn create_release(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreateReleaseRequest>,
) -> axum::response::Response {
    let line_id: OrderLineId = match dto::parse_id(&id, "line") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor = *principal.actor();
    errors::respond_blocking(StatusCode::CREATED, &services, move |s| {
        s.fulfillment
            .create_release(&actor, line_id, body.quantity, body.scheduled_delivery_date)
    })
    .await
}
