//! Store adapters implementing the domain ports.

pub mod commercetools;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
