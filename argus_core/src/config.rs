/**
 * Configuration for the Argus agent.
 *
 * Passed to `Agent::install()`. All fields have defaults, so callers
 * construct with struct-update syntax:
 *
 * ```ignore
 * agent.install(argus_core::Options {
 *     id: "my-endpoint".into(),
 *     url: "https://collector.example/report".into(),
 *     offline_log: true,
 *     ..Default::default()
 * })?;
 * ```
 *
 * The merged configuration is immutable for the lifetime of an install;
 * uninstalling and re-installing applies a fresh merge.
 */
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use crate::protocol::constants::{
    DEFAULT_DELAY_MS, DEFAULT_SNAPSHOT_WINDOW_MS,
};
use crate::protocol::types::{CapturedError, ResponseEnvelope};
use crate::trace::BlobFetcher;

/// Invoked right before a record is delivered. Return `None` to drop it,
/// or a (possibly modified) record to proceed.
pub type BeforeSend = Arc<dyn Fn(CapturedError) -> Option<CapturedError> + Send + Sync>;

/// Product-specific override of the business-failure suppression rules.
/// Return `true` to suppress the capture.
pub type SuppressionPredicate = Arc<dyn Fn(&ResponseEnvelope) -> bool + Send + Sync>;

/// Uniform random source for sampling; injectable for deterministic tests.
pub type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Clone)]
pub struct Options {
    /// Endpoint identifier stamped into every record as `webId`.
    pub id: String,

    /// Report URL. Empty disables network dispatch entirely.
    pub url: String,

    /// Messages matching any pattern are never reported.
    pub ignore_errors: Vec<Regex>,

    /// Network captures whose URL contains any of these substrings are
    /// never reported.
    pub ignore_apis: Vec<String>,

    /// Delivery delay in milliseconds.
    pub delay: u64,

    /**
     * Sampling rate in `(0, 1]`: a capture survives when a uniform draw
     * from `[0, 1)` is below this value. `1.0` reports everything (the
     * draw can never reach it); `0.0` is accepted and drops everything.
     */
    pub random: f64,

    /// Attach session-recording snapshots to network-failure payloads.
    pub screen_shot: bool,

    /// Snapshot window (trailing milliseconds) attached per payload.
    pub screen_shot_time: u64,

    /// Persist captured errors to the offline store.
    pub offline_log: bool,

    /// Offline retention in days; `0` clears the error table on install
    /// instead of age-checking it.
    pub offline_log_exp: u32,

    /// Offline database location. `None` uses a file in the system
    /// temporary directory.
    pub offline_path: Option<PathBuf>,

    /// Pre-delivery callback (modify or drop outbound records).
    pub before_send: Option<BeforeSend>,

    /// Business-failure suppression override; the built-in rules apply
    /// when unset.
    pub suppress_response: Option<SuppressionPredicate>,

    /// Sampling source override; thread-local uniform randomness when
    /// unset.
    pub sampler: Option<Sampler>,

    /// Blob source fetcher override for the normalizer.
    pub blob_fetcher: Option<Arc<dyn BlobFetcher>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            id: String::new(),
            url: String::new(),
            ignore_errors: vec![
                Regex::new(r"^Script error\.?$").expect("default ignore pattern"),
            ],
            ignore_apis: Vec::new(),
            delay: DEFAULT_DELAY_MS,
            random: 1.0,
            screen_shot: false,
            screen_shot_time: DEFAULT_SNAPSHOT_WINDOW_MS,
            offline_log: false,
            offline_log_exp: 0,
            offline_path: None,
            before_send: None,
            suppress_response: None,
            sampler: None,
            blob_fetcher: None,
        }
    }
}

impl Options {
    /// Resolved offline database path.
    pub(crate) fn offline_db_path(&self) -> PathBuf {
        self.offline_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("argus-offline.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let options = Options::default();
        assert_eq!(options.delay, 2000);
        assert_eq!(options.random, 1.0);
        assert_eq!(options.screen_shot_time, 20_000);
        assert!(!options.offline_log);
        assert_eq!(options.offline_log_exp, 0);
        assert_eq!(options.ignore_errors.len(), 1);
        assert!(options.ignore_errors[0].is_match("Script error."));
        assert!(options.ignore_errors[0].is_match("Script error"));
        assert!(!options.ignore_errors[0].is_match("Script error: detail"));
    }
}
