/*!
 * Argus - an embeddable error-monitoring agent.
 *
 * This is the crate hosts should depend on. It re-exports the core API
 * and wires the standard instrumentation installers into a process-wide
 * agent.
 *
 * # Quick start
 *
 * ```ignore
 * fn main() {
 *     let host = argus::Host::standard("https://app.example/", "App");
 *     let _guard = argus::init(host, argus::Options {
 *         id: "my-endpoint".into(),
 *         url: "https://collector.example/report".into(),
 *         ..Default::default()
 *     }).unwrap();
 *
 *     // failures flowing through the host's wrapped primitives are
 *     // captured automatically; manual captures also work:
 *     argus::capture_error("something odd happened", argus::Capture::new("custom"));
 *
 * }   // <- _guard drops here, flushing pending deliveries
 * ```
 *
 * The process-wide agent is created on the first `init` and survives
 * uninstall/re-install cycles; the breadcrumb ring and the in-memory
 * dedup list persist across them.
 */

use std::sync::{Arc, OnceLock};

use serde_json::Value;

// ---------------------------------------------------------------------------
// Re-exports - the public surface area
// ---------------------------------------------------------------------------

pub use argus_core::{
    Agent, AgentError, BeforeSend, BlobFetcher, Breadcrumb, BreadcrumbTrail, Capture,
    CaptureSink, CapturedError, Callback, ExceptionLike, Frame, Guard, HookRegistry, HookTarget,
    Host, HostValue, InstallCtx, Installer, NormalizedValue, ObjectTarget, OfflineStore,
    Options, ParsedException, PluginFn, RawCapture, ResponseEnvelope, Sampler, SnapshotSink,
    SnapshotSource, SuppressionPredicate, Table, AGENT_VERSION,
};
pub use argus_instrument::default_installers;

// ---------------------------------------------------------------------------
// Process-wide agent
// ---------------------------------------------------------------------------

static AGENT: OnceLock<Arc<Agent>> = OnceLock::new();

/**
 * Installs the agent over `host` with the standard installer set and
 * returns the flush-on-drop guard.
 *
 * The first call creates the process-wide agent; later calls reuse it
 * (the host argument is ignored once the agent exists). Calling while
 * already installed is a no-op that still returns a guard.
 */
pub fn init(host: Arc<Host>, options: Options) -> Result<Guard, AgentError> {
    let agent = AGENT.get_or_init(|| Arc::new(Agent::new(host, default_installers())));
    agent.install(options)?;
    Ok(Guard::new(Arc::clone(agent)))
}

/// The process-wide agent, if `init` has been called.
pub fn agent() -> Option<&'static Arc<Agent>> {
    AGENT.get()
}

/// Restores every hooked member and detaches global listeners.
pub fn uninstall() {
    if let Some(agent) = AGENT.get() {
        agent.uninstall();
    }
}

/**
 * Manual capture entry point. Accepts anything convertible into a
 * `RawCapture` - exceptions, opaque JSON values, plain messages.
 * Silent no-op before `init`.
 */
pub fn capture_error(raw: impl Into<RawCapture>, capture: Capture) {
    if let Some(agent) = AGENT.get() {
        agent.capture_error(raw, capture);
    }
}

/// Records a contextual breadcrumb. Silent no-op before `init`.
pub fn capture_breadcrumb(kind: &str, detail: Value) {
    if let Some(agent) = AGENT.get() {
        agent.capture_breadcrumb(kind, detail);
    }
}

/// Queues an extension installer on the process-wide agent.
pub fn add_plugin(plugin: PluginFn, args: Value) {
    if let Some(agent) = AGENT.get() {
        agent.add_plugin(plugin, args);
    }
}

/// Drains pending deliveries; `true` when the queue emptied in time.
pub fn flush() -> bool {
    match AGENT.get() {
        Some(agent) => agent.flush(),
        None => true,
    }
}
