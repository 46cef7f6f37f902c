//! Infrastructure adapters: ledger backends and the accrual service client.

pub mod accrual;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
