use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use crate::domain::user::UserId;
use crate::error::LoyaltyError;

/// A quantity of loyalty points held on an account.
///
/// Wrapper around `rust_decimal::Decimal` to keep point arithmetic exact and
/// to give balances a distinct type from transaction amounts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// A positive number of points moved by a single accrual or withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LoyaltyError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(LoyaltyError::InvalidAmount)
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LoyaltyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl PartialEq<Amount> for Balance {
    fn eq(&self, other: &Amount) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd<Amount> for Balance {
    fn partial_cmp(&self, other: &Amount) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The per-user balance pair: points currently spendable and points spent
/// over the account's lifetime.
///
/// `current` never goes negative. The only place it is decremented is
/// [`UserBalance::try_withdraw`], which refuses the debit instead.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserBalance {
    pub current: Balance,
    pub withdrawn: Balance,
}

impl UserBalance {
    pub const ZERO: Self = Self {
        current: Balance::ZERO,
        withdrawn: Balance::ZERO,
    };

    /// Credits accrued points to the spendable balance.
    pub fn credit(&mut self, amount: Amount) {
        self.current += amount.into();
    }

    /// Conditionally debits `amount`: the check and the mutation are one
    /// step, and the return value is the sole arbiter of whether the debit
    /// happened. Returns `false` without touching anything when `current`
    /// does not cover the amount.
    #[must_use]
    pub fn try_withdraw(&mut self, amount: Amount) -> bool {
        if self.current >= amount {
            self.current -= amount.into();
            self.withdrawn += amount.into();
            true
        } else {
            false
        }
    }
}

/// A committed debit against a user's balance. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub user_id: UserId,
    pub order_number: String,
    pub amount: Amount,
    pub processed_at: DateTime<Utc>,
}
