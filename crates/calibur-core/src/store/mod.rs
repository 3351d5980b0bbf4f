//! # Store Module
//!
//! Durable DCA agent store using redb.
//!
//! Uses redb embedded database for:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! The store is a cache: the source of truth for whether DCA is enabled is
//! the onchain key registry, never this database.

mod dca;

pub use dca::{DcaConfig, DcaPurchase, DcaStore, StoreError};
