//! # Storage Module
//!
//! Document store access for the rental ledger.
//!
//! The domain talks to storage only through the traits in [`traits`]; a
//! [`Connection`] hands out one repository per collection. Two connections
//! ship with the crate:
//!
//! - **memory**: in-process collections, used by tests and embedded hosts
//! - **csv**: the same collections mirrored into CSV files in a data directory
//!
//! Both are built on [`documents`], which owns the collections and drives the
//! live rental subscriptions.

pub mod csv;
pub mod documents;
pub mod memory;
pub mod traits;

pub use self::csv::CsvConnection;
pub use memory::MemoryConnection;
pub use traits::{
    Connection, HistoryStorage, ProfileStorage, RentalFilter, RentalStorage, SnapshotStream,
};
