/*!
 * HTTP transport for delivering captured records to the collector.
 *
 * Uses `ureq` - a pure-Rust blocking HTTP client with no async runtime.
 * The delivery worker is already a dedicated background thread, so
 * blocking I/O is fine there.
 *
 * Design decisions:
 * - **Best-effort delivery** - errors are logged and never propagated.
 *   The agent must never crash the host application.
 * - **Single attempt** - no retries; transport failure is unobserved by
 *   the pipeline.
 */

use std::time::Duration;

use ureq::Agent;

use crate::protocol::constants::AGENT_VERSION;
use crate::protocol::types::CapturedError;

/**
 * Thin wrapper around `ureq::Agent` responsible for POSTing records.
 *
 * One `Transport` is created per install and moved into the delivery
 * worker thread.
 */
pub struct Transport {
    agent: Agent,
}

impl Transport {
    /**
     * Timeouts:
     * - 10 s connect
     * - 30 s total per request
     */
    pub fn new() -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(10)))
            .timeout_global(Some(Duration::from_secs(30)))
            .http_status_as_error(false)
            .build()
            .into();

        Self { agent }
    }

    /**
     * POSTs one record as `{"extraInfo": record}` with
     * `Content-Type: application/json`. Best-effort: failures are logged
     * and swallowed.
     */
    pub fn send(&self, endpoint: &str, record: &CapturedError) {
        let body = serde_json::json!({ "extraInfo": record });
        let result = self
            .agent
            .post(endpoint)
            .header("x-agent-version", AGENT_VERSION)
            .send_json(&body);

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                if !(200..300).contains(&status) {
                    tracing::warn!(status, "collector rejected a record");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to deliver a record");
            }
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
