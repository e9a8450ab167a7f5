//! Pulse Incremental Loader
//!
//! Propagates the partitioned raw store into the Postgres warehouse,
//! incrementally and idempotently. The loader scans the lake's manifest
//! index, selects partitions whose content is not yet durably reflected in
//! the warehouse (or that were explicitly requested), and applies each one
//! as a single transactional upsert batch keyed on `(channel, message_id)`.
//!
//! Repeated runs with an unchanged lake are no-ops; a failed partition never
//! halts a run and is automatically retried on the next one.

pub mod config;
pub mod loader;
pub mod lock;
pub mod select;
pub mod state;
pub mod warehouse;

pub use config::LoaderConfig;
pub use loader::{LoadMode, LoadRunResult, Loader, PartitionOutcome};
pub use select::{select_partitions, Selection};
pub use state::{LoadStateEntry, LoadStateStore};
pub use warehouse::{Warehouse, WarehouseStats};
