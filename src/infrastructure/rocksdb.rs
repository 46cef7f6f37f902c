use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::balance::{Amount, UserBalance, Withdrawal};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::Ledger;
use crate::domain::user::{User, UserId};
use crate::error::{LoyaltyError, Result};

/// Column Family for user records (id to record).
pub const CF_USERS: &str = "users";
/// Column Family mapping logins to user ids.
pub const CF_LOGINS: &str = "logins";
/// Column Family for orders (id to order).
pub const CF_ORDERS: &str = "orders";
/// Column Family mapping order numbers to order ids. This index is the
/// uniqueness arbiter for order creation.
pub const CF_ORDER_NUMBERS: &str = "order_numbers";
/// Column Family for withdrawals keyed by order number.
pub const CF_WITHDRAWALS: &str = "withdrawals";
/// Column Family for id counters.
pub const CF_META: &str = "meta";

const NEXT_USER_ID: &str = "next_user_id";
const NEXT_ORDER_ID: &str = "next_order_id";

/// User row as stored: the account plus its balance pair, one value, so a
/// credit or debit is a single-key overwrite.
#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    user: User,
    balance: UserBalance,
}

/// A persistent ledger on RocksDB.
///
/// Every transactional operation serializes behind `write_lock` and commits
/// through a single `WriteBatch`, so multi-key updates (order + balance,
/// withdrawal + balance) land all-or-nothing. Reads outside transactions go
/// straight to the DB.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [
            CF_USERS,
            CF_LOGINS,
            CF_ORDERS,
            CF_ORDER_NUMBERS,
            CF_WITHDRAWALS,
            CF_META,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(LoyaltyError::internal)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LoyaltyError::internal(io::Error::other(format!("{name} column family not found")))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key).map_err(LoyaltyError::internal)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(LoyaltyError::internal)?,
            )),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value).map_err(LoyaltyError::internal)?;
        batch.put_cf(cf, key, bytes);
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch).map_err(LoyaltyError::internal)
    }

    /// Reads a counter and stages its increment into `batch`, so the bump
    /// commits together with the rows that consumed the id. Callers hold
    /// `write_lock`.
    fn next_id(&self, batch: &mut WriteBatch, counter: &str) -> Result<i64> {
        let cf = self.cf(CF_META)?;
        let current = self
            .db
            .get_cf(cf, counter)
            .map_err(LoyaltyError::internal)?
            .map(|bytes| {
                bytes
                    .try_into()
                    .map(i64::from_be_bytes)
                    .map_err(|_| LoyaltyError::internal(io::Error::other("corrupt id counter")))
            })
            .transpose()?
            .unwrap_or(0);
        let id = current + 1;
        batch.put_cf(cf, counter, id.to_be_bytes());
        Ok(id)
    }

    fn user_record(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        self.get_json(CF_USERS, &user_id.to_be_bytes())
    }

    fn order_by_id(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, &order_id.to_be_bytes())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(LoyaltyError::internal)?;
            rows.push(serde_json::from_slice(&value).map_err(LoyaltyError::internal)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl Ledger for RocksDbLedger {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId> {
        let _guard = self.write_lock.lock().await;

        let logins = self.cf(CF_LOGINS)?;
        if self
            .db
            .get_pinned_cf(logins, login.as_bytes())
            .map_err(LoyaltyError::internal)?
            .is_some()
        {
            return Err(LoyaltyError::UserExists);
        }

        let mut batch = WriteBatch::default();
        let id = self.next_id(&mut batch, NEXT_USER_ID)?;
        let record = UserRecord {
            user: User {
                id,
                login: login.to_string(),
                password_hash: password_hash.to_string(),
                registered_at: Utc::now(),
            },
            balance: UserBalance::ZERO,
        };
        batch.put_cf(logins, login.as_bytes(), id.to_be_bytes());
        self.put_json(&mut batch, CF_USERS, &id.to_be_bytes(), &record)?;
        self.commit(batch)?;
        Ok(id)
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        let logins = self.cf(CF_LOGINS)?;
        let Some(id_bytes) = self
            .db
            .get_cf(logins, login.as_bytes())
            .map_err(LoyaltyError::internal)?
        else {
            return Ok(None);
        };
        let id = id_bytes
            .try_into()
            .map(i64::from_be_bytes)
            .map_err(|_| LoyaltyError::internal(io::Error::other("corrupt login index")))?;
        Ok(self.user_record(id)?.map(|record| record.user))
    }

    async fn create_order(&self, number: &str, user_id: UserId) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if self.user_record(user_id)?.is_none() {
            return Err(LoyaltyError::UserNotFound(user_id));
        }

        let numbers = self.cf(CF_ORDER_NUMBERS)?;
        if let Some(id_bytes) = self
            .db
            .get_cf(numbers, number.as_bytes())
            .map_err(LoyaltyError::internal)?
        {
            let existing_id = id_bytes
                .try_into()
                .map(i64::from_be_bytes)
                .map_err(|_| LoyaltyError::internal(io::Error::other("corrupt number index")))?;
            let owner = self
                .order_by_id(existing_id)?
                .ok_or(LoyaltyError::OrderNotFound(existing_id))?
                .user_id;
            return Err(if owner == user_id {
                LoyaltyError::AlreadyExists
            } else {
                LoyaltyError::AddedByAnotherUser
            });
        }

        let mut batch = WriteBatch::default();
        let id = self.next_id(&mut batch, NEXT_ORDER_ID)?;
        let order = Order {
            id,
            number: number.to_string(),
            user_id,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        };
        batch.put_cf(numbers, number.as_bytes(), id.to_be_bytes());
        self.put_json(&mut batch, CF_ORDERS, &id.to_be_bytes(), &order)?;
        self.commit(batch)
    }

    async fn orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.scan(CF_ORDERS)?;
        orders.retain(|order| order.user_id == user_id);
        Ok(orders)
    }

    async fn pending_orders(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.scan(CF_ORDERS)?;
        orders.retain(|order| !order.status.is_terminal());
        Ok(orders)
    }

    async fn settle_accrual(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        accrual: Option<Amount>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut order = self
            .order_by_id(order_id)?
            .ok_or(LoyaltyError::OrderNotFound(order_id))?;

        // Replay of an already-applied status must not credit twice.
        if order.status == status {
            return Ok(());
        }

        order.status = status;
        order.accrual = accrual;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, &order_id.to_be_bytes(), &order)?;

        if let Some(amount) = accrual {
            let mut record = self
                .user_record(order.user_id)?
                .ok_or(LoyaltyError::UserNotFound(order.user_id))?;
            record.balance.credit(amount);
            self.put_json(&mut batch, CF_USERS, &order.user_id.to_be_bytes(), &record)?;
        }

        // One batch: the status write and the credit land together.
        self.commit(batch)
    }

    async fn balance(&self, user_id: UserId) -> Result<UserBalance> {
        self.user_record(user_id)?
            .map(|record| record.balance)
            .ok_or(LoyaltyError::UserNotFound(user_id))
    }

    async fn withdraw(&self, order_number: &str, amount: Amount, user_id: UserId) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) =
            self.get_json::<Withdrawal>(CF_WITHDRAWALS, order_number.as_bytes())?
        {
            return Err(if existing.user_id == user_id {
                LoyaltyError::AlreadyExists
            } else {
                LoyaltyError::AddedByAnotherUser
            });
        }

        let mut record = self
            .user_record(user_id)?
            .ok_or(LoyaltyError::UserNotFound(user_id))?;

        if !record.balance.try_withdraw(amount) {
            // Nothing staged yet: the refused debit leaves no trace.
            return Err(LoyaltyError::InsufficientFunds);
        }

        let withdrawal = Withdrawal {
            user_id,
            order_number: order_number.to_string(),
            amount,
            processed_at: Utc::now(),
        };

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_USERS, &user_id.to_be_bytes(), &record)?;
        self.put_json(
            &mut batch,
            CF_WITHDRAWALS,
            order_number.as_bytes(),
            &withdrawal,
        )?;
        self.commit(batch)
    }

    async fn withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let mut rows: Vec<Withdrawal> = self.scan(CF_WITHDRAWALS)?;
        rows.retain(|w| w.user_id == user_id);
        rows.sort_by_key(|w| w.processed_at);
        Ok(rows)
    }
}
