use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::balance::{Amount, UserBalance, Withdrawal};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::Ledger;
use crate::domain::user::{User, UserId};
use crate::error::{LoyaltyError, Result};

#[derive(Debug, Clone)]
struct UserRecord {
    user: User,
    balance: UserBalance,
}

#[derive(Default)]
struct LedgerState {
    users: HashMap<UserId, UserRecord>,
    logins: HashMap<String, UserId>,
    orders: BTreeMap<OrderId, Order>,
    order_numbers: HashMap<String, OrderId>,
    withdrawals: HashMap<String, Withdrawal>,
    next_user_id: UserId,
    next_order_id: OrderId,
}

/// A thread-safe in-memory ledger.
///
/// The whole state sits behind one `RwLock`, so every multi-step operation
/// (order creation, accrual settlement, withdrawal) runs under a single
/// write guard and commits atomically. The number maps are the uniqueness
/// arbiters for orders and withdrawals.
///
/// Ideal for tests and for running without a persistent backend.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new, empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId> {
        let mut state = self.state.write().await;
        if state.logins.contains_key(login) {
            return Err(LoyaltyError::UserExists);
        }

        state.next_user_id += 1;
        let id = state.next_user_id;
        let user = User {
            id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            registered_at: Utc::now(),
        };
        state.logins.insert(login.to_string(), id);
        state.users.insert(
            id,
            UserRecord {
                user,
                balance: UserBalance::ZERO,
            },
        );
        Ok(id)
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .logins
            .get(login)
            .and_then(|id| state.users.get(id))
            .map(|record| record.user.clone()))
    }

    async fn create_order(&self, number: &str, user_id: UserId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(LoyaltyError::UserNotFound(user_id));
        }

        if let Some(existing_id) = state.order_numbers.get(number) {
            let owner = state.orders[existing_id].user_id;
            return Err(if owner == user_id {
                LoyaltyError::AlreadyExists
            } else {
                LoyaltyError::AddedByAnotherUser
            });
        }

        state.next_order_id += 1;
        let id = state.next_order_id;
        state.order_numbers.insert(number.to_string(), id);
        state.orders.insert(
            id,
            Order {
                id,
                number: number.to_string(),
                user_id,
                status: OrderStatus::New,
                accrual: None,
                uploaded_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn pending_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|order| !order.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn settle_accrual(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        accrual: Option<Amount>,
    ) -> Result<()> {
        let mut guard = self.state.write().await;
        let LedgerState { users, orders, .. } = &mut *guard;

        let order = orders
            .get_mut(&order_id)
            .ok_or(LoyaltyError::OrderNotFound(order_id))?;

        // Replay of an already-applied status must not credit twice.
        if order.status == status {
            return Ok(());
        }

        order.status = status;
        order.accrual = accrual;

        if let Some(amount) = accrual {
            let record = users
                .get_mut(&order.user_id)
                .ok_or(LoyaltyError::UserNotFound(order.user_id))?;
            record.balance.credit(amount);
        }
        Ok(())
    }

    async fn balance(&self, user_id: UserId) -> Result<UserBalance> {
        let state = self.state.read().await;
        state
            .users
            .get(&user_id)
            .map(|record| record.balance)
            .ok_or(LoyaltyError::UserNotFound(user_id))
    }

    async fn withdraw(&self, order_number: &str, amount: Amount, user_id: UserId) -> Result<()> {
        let mut guard = self.state.write().await;
        let LedgerState {
            users, withdrawals, ..
        } = &mut *guard;

        if let Some(existing) = withdrawals.get(order_number) {
            return Err(if existing.user_id == user_id {
                LoyaltyError::AlreadyExists
            } else {
                LoyaltyError::AddedByAnotherUser
            });
        }

        let record = users
            .get_mut(&user_id)
            .ok_or(LoyaltyError::UserNotFound(user_id))?;

        if !record.balance.try_withdraw(amount) {
            return Err(LoyaltyError::InsufficientFunds);
        }

        withdrawals.insert(
            order_number.to_string(),
            Withdrawal {
                user_id,
                order_number: order_number.to_string(),
                amount,
                processed_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let state = self.state.read().await;
        let mut rows: Vec<Withdrawal> = state
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|w| w.processed_at);
        Ok(rows)
    }
}
