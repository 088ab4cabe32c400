//! Forecast/MRP collaborator.
//!
//! Reads OUT movements as demand history and asks the collaborator for
//! replenishment advice. Recommendations are returned to the caller as-is.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockline_inventory::{ItemId, Movement, MovementDirection};

use super::session::{OutboundRequest, Transport, TransportError};

pub const RECOMMENDATIONS_PATH: &str = "/v1/recommendations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandPoint {
    pub date: NaiveDate,
    pub quantity: i64,
}

/// Daily outbound quantities for one item, oldest day first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandSeries {
    pub item_id: ItemId,
    pub points: Vec<DemandPoint>,
}

impl DemandSeries {
    /// Sum OUT movements per calendar day (UTC), saturating at `i64::MAX`.
    /// Inbound movements are ignored.
    pub fn from_movements<'a>(item_id: ItemId, movements: impl IntoIterator<Item = &'a Movement>) -> Self {
        let mut daily: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for m in movements {
            if m.item_id == item_id && m.direction == MovementDirection::Out {
                let day = daily.entry(m.created_at.date_naive()).or_default();
                *day = day.saturating_add(m.quantity);
            }
        }

        Self {
            item_id,
            points: daily
                .into_iter()
                .map(|(date, quantity)| DemandPoint { date, quantity })
                .collect(),
        }
    }

    pub fn total(&self) -> i64 {
        self.points.iter().fold(0i64, |total, p| total.saturating_add(p.quantity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationKind {
    Replenish,
    Expedite,
    Defer,
}

/// Advisory output of the forecast collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: ItemId,
    pub kind: RecommendationKind,
    pub quantity: i64,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForecastClient<T> {
    transport: T,
}

impl<T: Transport> ForecastClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Send a demand series and return the collaborator's recommendations.
    pub fn recommend(&self, series: &DemandSeries) -> Result<Vec<Recommendation>, TransportError> {
        let body = serde_json::to_value(series).map_err(|e| TransportError::Decode(e.to_string()))?;
        let response = self.transport.send(&OutboundRequest::post(RECOMMENDATIONS_PATH, body))?;

        if !response.is_success() {
            return Err(TransportError::Status {
                status: response.status,
                message: response.body.to_string(),
            });
        }

        let recommendations: Vec<Recommendation> =
            serde_json::from_value(response.body).map_err(|e| TransportError::Decode(e.to_string()))?;
        tracing::debug!(
            item_id = %series.item_id,
            count = recommendations.len(),
            "forecast recommendations received"
        );
        Ok(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::session::OutboundResponse;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use stockline_inventory::ReferenceType;
    use uuid::Uuid;

    fn movement(item_id: ItemId, day: u32, direction: MovementDirection, quantity: i64) -> Movement {
        Movement {
            id: Uuid::now_v7(),
            item_id,
            direction,
            quantity,
            balance_after: 0,
            reference_type: ReferenceType::Release,
            reference_id: "r".to_string(),
            reason: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, day, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn series_sums_outbound_per_day() {
        let item = ItemId::generate();
        let movements = vec![
            movement(item, 2, MovementDirection::Out, 30),
            movement(item, 1, MovementDirection::In, 500),
            movement(item, 2, MovementDirection::Out, 20),
            movement(item, 4, MovementDirection::Out, 5),
            movement(ItemId::generate(), 4, MovementDirection::Out, 99),
        ];

        let series = DemandSeries::from_movements(item, &movements);
        assert_eq!(
            series.points,
            vec![
                DemandPoint {
                    date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                    quantity: 50
                },
                DemandPoint {
                    date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
                    quantity: 5
                },
            ]
        );
        assert_eq!(series.total(), 55);
    }

    struct FixedTransport(OutboundResponse);

    impl Transport for FixedTransport {
        fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError> {
            assert_eq!(request.path, RECOMMENDATIONS_PATH);
            Ok(self.0.clone())
        }
    }

    #[test]
    fn recommendations_are_decoded() {
        let item = ItemId::generate();
        let client = ForecastClient::new(FixedTransport(OutboundResponse {
            status: 200,
            body: json!([{
                "item_id": item.to_string(),
                "kind": "REPLENISH",
                "quantity": 400,
                "due_date": "2026-04-01"
            }]),
        }));

        let recs = client
            .recommend(&DemandSeries {
                item_id: item,
                points: vec![],
            })
            .unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::Replenish);
        assert_eq!(recs[0].note, None);
    }

    #[test]
    fn error_status_is_surfaced() {
        let client = ForecastClient::new(FixedTransport(OutboundResponse {
            status: 500,
            body: json!({"error": "boom"}),
        }));

        let err = client
            .recommend(&DemandSeries {
                item_id: ItemId::generate(),
                points: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 500, .. }));
    }
}
