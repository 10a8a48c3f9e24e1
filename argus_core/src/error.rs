/**
 * Error type for the agent's fallible setup paths.
 *
 * Runtime capture paths never return errors by contract: monitoring must
 * not crash or burden the monitored application, so failures there degrade
 * silently (logged through `tracing`). `AgentError` only surfaces from
 * `install()` and the store/worker constructors it calls.
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The offline store could not be opened or prepared.
    #[error("offline store unavailable: {0}")]
    Store(#[from] rusqlite::Error),

    /// The background delivery worker could not be spawned.
    #[error("failed to spawn delivery worker: {0}")]
    Worker(String),

    /// A configuration value was rejected at install time.
    #[error("invalid configuration: {0}")]
    Config(String),
}
