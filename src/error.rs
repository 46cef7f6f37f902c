use thiserror::Error;

use crate::domain::order::OrderId;
use crate::domain::user::UserId;

pub type Result<T> = std::result::Result<T, LoyaltyError>;

/// Errors returned by ledger operations and the engine facade.
///
/// `AlreadyExists` and `AddedByAnotherUser` cover the three-way ownership
/// check shared by order creation and withdrawals: either the caller already
/// owns the number (idempotent duplicate) or somebody else claimed it first.
#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("number already registered by this user")]
    AlreadyExists,
    #[error("number already registered by another user")]
    AddedByAnotherUser,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("login already taken")]
    UserExists,
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("storage error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LoyaltyError {
    /// Wraps a backend failure the caller cannot act on.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal(Box::new(err))
    }
}

/// Failures while querying the accrual service.
///
/// All of these are transient from the pipeline's point of view: the attempt
/// is logged and dropped, and the order is retried on a later poll cycle.
#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("accrual request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected accrual response status {0}")]
    UnexpectedStatus(u16),
    #[error("throttled response without a valid Retry-After header")]
    MalformedRetryAfter,
}
