//! Storage adapters.
//!
//! The embedded sled store holds the ledger records that retrieval reads.

pub mod sled_store;

pub use sled_store::{ImportSummary, SledRecordStore};
