use tracing::{info, warn};

use crate::domain::balance::{Amount, UserBalance, Withdrawal};
use crate::domain::order::Order;
use crate::domain::ports::LedgerRef;
use crate::domain::user::UserId;
use crate::error::{LoyaltyError, Result};

/// The user-facing entry point for order submission and balance operations.
///
/// `LoyaltyEngine` owns the ledger handle and translates the transactional
/// outcomes for the boundary layer. Conflict arbitration itself stays
/// inside the ledger, where the uniqueness indexes live. Order numbers
/// arriving here are already checksum-validated upstream.
pub struct LoyaltyEngine {
    ledger: LedgerRef,
}

impl LoyaltyEngine {
    pub fn new(ledger: LedgerRef) -> Self {
        Self { ledger }
    }

    /// Submits an order number for accrual tracking.
    ///
    /// Re-submission by the owner yields `AlreadyExists`, which the
    /// boundary treats as "already tracked" rather than a failure.
    pub async fn submit_order(&self, number: &str, user_id: UserId) -> Result<()> {
        let result = self.ledger.create_order(number, user_id).await;
        match &result {
            Ok(()) => info!(order = number, user_id, "order accepted"),
            Err(LoyaltyError::AlreadyExists) => {
                info!(order = number, user_id, "order already tracked")
            }
            Err(LoyaltyError::AddedByAnotherUser) => {
                warn!(order = number, user_id, "order claimed by another user")
            }
            Err(err) => warn!(order = number, user_id, %err, "order submission failed"),
        }
        result
    }

    pub async fn orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.ledger.orders_by_user(user_id).await
    }

    pub async fn balance(&self, user_id: UserId) -> Result<UserBalance> {
        self.ledger.balance(user_id).await
    }

    /// Debits `amount` against a new order number, atomically.
    pub async fn withdraw(&self, order_number: &str, amount: Amount, user_id: UserId) -> Result<()> {
        let result = self.ledger.withdraw(order_number, amount, user_id).await;
        match &result {
            Ok(()) => info!(order = order_number, user_id, %amount, "withdrawal processed"),
            Err(LoyaltyError::InsufficientFunds) => {
                warn!(order = order_number, user_id, %amount, "withdrawal refused, insufficient funds")
            }
            Err(err) => warn!(order = order_number, user_id, %err, "withdrawal failed"),
        }
        result
    }

    pub async fn withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        self.ledger.withdrawals_by_user(user_id).await
    }
}
