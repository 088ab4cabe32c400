use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::json;

use stockline_infra::fulfillment::{FulfillmentError, FulfillmentResult};

use crate::app::services::AppServices;

pub fn status_for(err: &FulfillmentError) -> StatusCode {
    match err {
        FulfillmentError::Validation(_) => StatusCode::BAD_REQUEST,
        FulfillmentError::Unauthorized(_) => StatusCode::FORBIDDEN,
        FulfillmentError::NotFound(_) => StatusCode::NOT_FOUND,
        FulfillmentError::DuplicateOrderNumber(_)
        | FulfillmentError::RetryableConflict(_)
        | FulfillmentError::AlreadyDelivered
        | FulfillmentError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
        FulfillmentError::InsufficientRemainingQuantity { .. } | FulfillmentError::InsufficientStock { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FulfillmentError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        FulfillmentError::Store(_) | FulfillmentError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn fulfillment_error_to_response(err: FulfillmentError) -> axum::response::Response {
    json_error(status_for(&err), err.code(), err.to_string())
}

/// Serialize `Ok` with `status`, or map the error.
pub fn respond<T: Serialize>(status: StatusCode, result: FulfillmentResult<T>) -> axum::response::Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(err) => fulfillment_error_to_response(err),
    }
}

/// Run `f` on the blocking pool and map its result like [`respond`].
pub async fn respond_blocking<T, F>(status: StatusCode, services: &Arc<AppServices>, f: F) -> axum::response::Response
where
    F: FnOnce(&AppServices) -> FulfillmentResult<T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    match services.run(f).await {
        Ok(result) => respond(status, result),
        Err(err) => task_failed(err),
    }
}

pub fn task_failed(err: tokio::task::JoinError) -> axum::response::Response {
    tracing::error!(error = %err, "service task did not complete");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "request could not be completed",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_statuses() {
        assert_eq!(
            status_for(&FulfillmentError::InsufficientStock {
                available: 1,
                requested: 2
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&FulfillmentError::AlreadyDelivered), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&FulfillmentError::RetryableConflict("stale".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&FulfillmentError::Transient("timeout".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&FulfillmentError::NotFound("release")), StatusCode::NOT_FOUND);
    }
}
