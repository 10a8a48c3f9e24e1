/**
 * Agent-wide constants.
 */

/// Agent version string, derived at compile time from the package version.
pub const AGENT_VERSION: &str = concat!("argus/", env!("CARGO_PKG_VERSION"));

/// Sentinel used for frames whose function name could not be determined.
pub const UNKNOWN_FUNCTION: &str = "?";

/// Default breadcrumb ring capacity.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 50;

/// Default delivery delay in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 2000;

/// Default session-recording window attached to network-failure payloads.
pub const DEFAULT_SNAPSHOT_WINDOW_MS: u64 = 20_000;

/// Interval between snapshot checkouts (full batch flushes to the store).
pub const SNAPSHOT_CHECKOUT_MS: u64 = 10_000;

/// Period of the snapshot-table housekeeping sweep.
pub const SNAPSHOT_SWEEP_MS: i64 = 30 * 60 * 1000;

/// Bounded delivery-channel capacity. When full, new events are dropped.
pub const QUEUE_CAPACITY: usize = 100;

/// Maximum time `flush()` blocks waiting for the worker to drain.
pub const FLUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Trailing window of a fetched source inspected for a source-map directive.
pub const SOURCE_MAP_TAIL_CHARS: usize = 300;
