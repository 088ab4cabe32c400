use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stockline_infra::fulfillment::{AdjustStock, DeductStock};
use stockline_inventory::ItemId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/items", post(register_item))
        .route("/items/:id/balance", get(get_balance))
        .route("/items/:id/audit", get(audit_item))
        .route("/items/:id/deduct", post(deduct_stock))
        .route("/items/:id/adjust", post(adjust_stock))
        .route("/items/:id/recommendations", get(recommend_replenishment))
        .route("/movements", get(list_movements))
}

pub async fn register_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterItemRequest>,
) -> axum::response::Response {
    let item_id = body.item_id.unwrap_or_else(ItemId::generate);
    let actor = *principal.actor();
    errors::respond_blocking(StatusCode::CREATED, &services, move |s| {
        s.fulfillment.register_item(&actor, item_id, &body.name, body.policy)
    })
    .await
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.get_balance(item_id)).await
}

pub async fn audit_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.audit_item(item_id)).await
}

pub async fn deduct_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DeductStockRequest>,
) -> axum::response::Response {
    let item_id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = DeductStock {
        item_id,
        quantity: body.quantity,
        reference_type: body.reference_type,
        reference_id: body.reference_id,
    };
    let actor = *principal.actor();
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.deduct(&actor, request)).await
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let item_id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = AdjustStock {
        item_id,
        direction: body.direction,
        quantity: body.quantity,
        reason: body.reason,
        reference_type: body.reference_type,
        reference_id: body.reference_id,
    };
    let actor = *principal.actor();
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.adjust(&actor, request)).await
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::MovementsQuery>,
) -> axum::response::Response {
    let item_id: Option<ItemId> = match query.item_id.as_deref().map(|raw| dto::parse_id(raw, "item")) {
        Some(Ok(v)) => Some(v),
        Some(Err(resp)) => return resp,
        None => None,
    };
    errors::respond_blocking(StatusCode::OK, &services, move |s| s.fulfillment.list_movements(item_id)).await
}

/// Ask the forecast collaborator for replenishment advice on one item.
pub async fn recommend_replenishment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match dto::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let outcome = services
        .run(move |s| {
            let client = s.forecast.as_ref().ok_or_else(|| {
                errors::json_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "forecast_not_configured",
                    "no forecast collaborator is configured",
                )
            })?;
            let series = s
                .fulfillment
                .demand_history(item_id)
                .map_err(errors::fulfillment_error_to_response)?;
            client.recommend(&series).map_err(|err| {
                tracing::warn!(%item_id, error = %err, "forecast collaborator call failed");
                errors::json_error(StatusCode::BAD_GATEWAY, "forecast_unavailable", err.to_string())
            })
        })
        .await;

    match outcome {
        Ok(Ok(recommendations)) => Json(recommendations).into_response(),
        Ok(Err(resp)) => resp,
        Err(err) => errors::task_failed(err),
    }
}
