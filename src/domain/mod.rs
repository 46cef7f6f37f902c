//! Domain model: money value objects, orders, users and the storage/oracle
//! ports the rest of the crate is written against.

pub mod balance;
pub mod order;
pub mod ports;
pub mod user;

pub use balance::{Amount, Balance, UserBalance, Withdrawal};
pub use order::{AccrualStatus, Order, OrderId, OrderStatus};
pub use user::{User, UserId};
