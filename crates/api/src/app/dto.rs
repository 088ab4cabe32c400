use core::str::FromStr;

use axum::http::StatusCode;
use chrono::NaiveDate;
use serde::Deserialize;

use stockline_inventory::{ItemId, MovementDirection, ReferenceType, StockPolicy};
use stockline_infra::fulfillment::{NewLine, OrderHeader};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrderLineRequest {
    pub item_id: ItemId,
    pub total_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub order_number: String,
    pub customer_name: String,
    pub order_date: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub lines: Vec<CreateOrderLineRequest>,
}

impl CreateOrderRequest {
    pub fn into_parts(self) -> (OrderHeader, Vec<NewLine>) {
        let header = OrderHeader {
            order_number: self.order_number,
            customer_name: self.customer_name,
            order_date: self.order_date,
            start_date: self.start_date,
            end_date: self.end_date,
        };
        let lines = self
            .lines
            .into_iter()
            .map(|l| NewLine {
                item_id: l.item_id,
                total_quantity: l.total_quantity,
            })
            .collect();
        (header, lines)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReleaseRequest {
    pub quantity: i64,
    pub scheduled_delivery_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReleaseStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterItemRequest {
    /// Catalog id; a new one is generated when absent.
    pub item_id: Option<ItemId>,
    pub name: String,
    #[serde(default)]
    pub policy: StockPolicy,
}

#[derive(Debug, Deserialize)]
pub struct DeductStockRequest {
    pub quantity: i64,
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub direction: MovementDirection,
    pub quantity: i64,
    pub reason: String,
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MovementsQuery {
    pub item_id: Option<String>,
}

// -------------------------
// Parsing helpers
// -------------------------

/// Parse a typed id from a path or query segment, or answer 400.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
