use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::balance::Amount;
use crate::domain::user::UserId;

pub type OrderId = i64;

/// Lifecycle of an uploaded order.
///
/// Orders are created as `New` and only move via accrual responses.
/// `Invalid` and `Processed` are terminal: the extractor never polls them
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }
}

/// Status vocabulary of the accrual service.
///
/// `Registered` exists only on the wire; on our side a registered order is
/// still being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl AccrualStatus {
    /// Maps the wire status onto the order lifecycle. `Registered` folds
    /// into `Processing` so the order stays in the pending set.
    pub fn as_order_status(self) -> OrderStatus {
        match self {
            Self::Registered | Self::Processing => OrderStatus::Processing,
            Self::Invalid => OrderStatus::Invalid,
            Self::Processed => OrderStatus::Processed,
        }
    }
}

/// An order uploaded for reward accrual.
///
/// The number is globally unique: claimed by at most one user for its
/// lifetime. `accrual` is set only once the accrual service reports
/// `PROCESSED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub accrual: Option<Amount>,
    pub uploaded_at: DateTime<Utc>,
}
