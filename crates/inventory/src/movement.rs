//! Movement ledger entries and ledger replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ItemId;

/// Direction of a stock movement relative to available stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    /// Signed effect of `quantity` on available stock.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            MovementDirection::In => quantity,
            MovementDirection::Out => -quantity,
        }
    }
}

impl core::fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MovementDirection::In => f.write_str("IN"),
            MovementDirection::Out => f.write_str("OUT"),
        }
    }
}

/// What caused a movement.
///
/// `Release` is written only by delivery reconciliation; the others are manual
/// ledger corrections.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceType {
    Release,
    Adjustment,
    Production,
    Transfer,
    Correction,
}

impl ReferenceType {
    pub fn is_manual(self) -> bool {
        !matches!(self, ReferenceType::Release)
    }
}

impl core::fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ReferenceType::Release => "Release",
            ReferenceType::Adjustment => "Adjustment",
            ReferenceType::Production => "Production",
            ReferenceType::Transfer => "Transfer",
            ReferenceType::Correction => "Correction",
        };
        f.write_str(s)
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: Uuid,
    pub item_id: ItemId,
    pub direction: MovementDirection,
    pub quantity: i64,
    /// Available stock right after this entry was applied.
    pub balance_after: i64,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    pub fn delta(&self) -> i64 {
        self.direction.signed(self.quantity)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerReplayError {
    #[error("movement {movement_id} records balance {recorded}, replay gives {replayed}")]
    BalanceMismatch {
        movement_id: Uuid,
        recorded: i64,
        replayed: i64,
    },

    #[error("movement {0} drives the balance negative")]
    NegativeBalance(Uuid),

    #[error("movement {0} overflows the balance")]
    Overflow(Uuid),
}

/// Replay movements from a zero balance, in the given order.
///
/// Fails on the first entry whose recorded `balance_after` disagrees with the
/// running sum, or that would take the balance below zero or past `i64::MAX`.
pub fn replay_balance<'a>(
    movements: impl IntoIterator<Item = &'a Movement>,
) -> Result<i64, LedgerReplayError> {
    let mut balance = 0i64;
    for m in movements {
        balance = balance
            .checked_add(m.delta())
            .ok_or(LedgerReplayError::Overflow(m.id))?;
        if balance < 0 {
            return Err(LedgerReplayError::NegativeBalance(m.id));
        }
        if balance != m.balance_after {
            return Err(LedgerReplayError::BalanceMismatch {
                movement_id: m.id,
                recorded: m.balance_after,
                replayed: balance,
            });
        }
    }
    Ok(balance)
}
