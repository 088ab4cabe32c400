use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use stockline_orders::BlanketOrderId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/complete", post(complete_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let (header, lines) = body.into_parts();
    let actor = *principal.actor();
    errors::respond_blocking(StatusCode::CREATED, &services, move |s| {
        s.fulfillment.create_order(&actor, header, lines)
    })
    .await
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: BlanketOrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.get_order(order_id)).await
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: BlanketOrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor = *principal.actor();
    errors::respond_blocking(StatusCode::OK, &services, move |s| {
        s.fulfillment.cancel_order(&actor, order_id)
    })
    .await
}

pub async fn complete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: BlanketOrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor = *principal.actor();
    errors::respond_blocking(StatusCode::OK, &services, move |s| {
        s.fulfillment.complete_order(&actor, order_id)
    })
    .await
}
