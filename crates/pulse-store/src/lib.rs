//! Job store for the Pulse distribution scheduler.
//!
//! Defines the `JobStore` contract the scheduler core runs against, with:
//! - Conditional run creation keyed by `(job_id, scheduled_for)` so a
//!   dispatch race cannot double-create an occurrence
//! - Compare-and-swap status transitions for run ownership
//! - Terminal-run immutability
//!
//! Two adapters are provided: `MemoryStore` (tests, embedded use) and
//! `RocksStore` (RocksDB with column-family isolation and time-prefixed
//! run keys for ordered scans).

pub mod column_families;
pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use store::{JobQuery, JobStore, RunQuery};
