use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::balance::{Amount, UserBalance, Withdrawal};
use crate::domain::order::{AccrualStatus, Order, OrderId, OrderStatus};
use crate::domain::user::{User, UserId};
use crate::error::{AccrualError, Result};

/// The persistent ledger of users, orders, withdrawals and balances.
///
/// One trait rather than per-entity stores because `withdraw` and
/// `settle_accrual` are cross-entity transactions: each multi-step operation
/// commits atomically or not at all, and no other caller may observe a
/// partial state.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Registers a user with a unique login. The password hash is stored
    /// opaquely. A taken login fails with `UserExists`.
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId>;

    async fn user_by_login(&self, login: &str) -> Result<Option<User>>;

    /// Claims an order number for a user, inside one transaction:
    /// unknown number inserts a `New` order, a number owned by the same
    /// user fails `AlreadyExists`, one owned by somebody else fails
    /// `AddedByAnotherUser`.
    async fn create_order(&self, number: &str, user_id: UserId) -> Result<()>;

    async fn orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Orders still awaiting an accrual verdict, status `New` or
    /// `Processing`. Terminal orders are never returned.
    async fn pending_orders(&self) -> Result<Vec<Order>>;

    /// Writes the order's new status and accrual and credits the owner's
    /// balance when an accrual is present, as one atomic unit. An absent
    /// accrual credits nothing. Replaying the same status is a no-op and
    /// must not credit twice.
    async fn settle_accrual(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        accrual: Option<Amount>,
    ) -> Result<()>;

    async fn balance(&self, user_id: UserId) -> Result<UserBalance>;

    /// Debits the user's balance and records the withdrawal, inside one
    /// transaction: duplicate order numbers fail the three-way ownership
    /// check, and the debit happens only where `current >= amount`. On
    /// `InsufficientFunds` nothing is left behind, including the
    /// withdrawal row.
    async fn withdraw(&self, order_number: &str, amount: Amount, user_id: UserId) -> Result<()>;

    async fn withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>>;
}

pub type LedgerRef = Arc<dyn Ledger>;

/// Outcome of asking the accrual service about one order number.
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualReply {
    /// The service answered with a status and, for processed orders, the
    /// reward amount.
    Status {
        status: AccrualStatus,
        accrual: Option<Amount>,
    },
    /// The service is rate limiting; no calls should be made for
    /// `retry_after`.
    Throttled { retry_after: Duration },
}

/// The external reward oracle. Opaque: this crate never computes rewards,
/// it only asks.
#[async_trait]
pub trait AccrualOracle: Send + Sync {
    async fn check(&self, order_number: &str) -> std::result::Result<AccrualReply, AccrualError>;
}

pub type OracleRef = Arc<dyn AccrualOracle>;
