/**
 * Offline queue - durable local storage for error records and snapshot
 * batches, with age-based retention pruning.
 */

pub mod store;

pub use store::{OfflineRecord, OfflineStore, Table};
