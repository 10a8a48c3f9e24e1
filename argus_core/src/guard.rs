/**
 * RAII guard that drains pending deliveries on drop.
 *
 * ```ignore
 * fn main() {
 *     let host = argus_core::Host::standard("https://app.example/", "App");
 *     let _guard = argus::init(host, Default::default()).unwrap();
 *
 *     // ... application logic, captures happen here ...
 *
 * }   // <- _guard drops here, flushing the delivery queue
 * ```
 *
 * If the flush times out, the guard drops silently after logging -
 * best-effort delivery is the contract.
 */
use std::sync::Arc;

use crate::client::Agent;

pub struct Guard {
    agent: Arc<Agent>,
}

impl Guard {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if !self.agent.flush() {
            tracing::warn!("flush timed out; some records may not have been sent");
        }
    }
}
