/*!
 * Argus Core - the capture-and-delivery engine.
 *
 * This crate provides the full monitoring pipeline: the hook framework,
 * stack normalizer, breadcrumb ring, offline queue, capture pipeline,
 * delivery transport, and the agent lifecycle controller. End users
 * should depend on the `argus` facade crate instead, which re-exports
 * everything and wires up the standard instrumentation installers.
 *
 * # Module structure
 *
 * - `protocol/` - what we capture and send: types and constants
 * - `hooks/` - member replacement with idempotent wrapping and restore
 * - `trace/` - textual-trace parsing and native-backtrace conversion
 * - `breadcrumbs` - the bounded contextual-event ring
 * - `offline/` - the durable two-table store with retention pruning
 * - `snapshot` - the session-recording seam
 * - `host` - the accessor-proxy substrate instrumentation operates on
 * - `pipeline` - the capture orchestrator (filter, dedup, sample, delay)
 * - `transport/` - HTTP delivery and the background worker
 * - `client` - the agent: install/uninstall lifecycle and plugins
 * - `guard` - RAII flush-on-drop
 */

pub mod breadcrumbs;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod host;
pub mod offline;
pub mod pipeline;
pub mod protocol;
pub mod snapshot;
pub mod trace;
pub mod transport;
mod util;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use breadcrumbs::BreadcrumbTrail;
pub use client::{Agent, InstallCtx, Installer, PluginFn};
pub use config::{BeforeSend, Options, Sampler, SuppressionPredicate};
pub use error::AgentError;
pub use guard::Guard;
pub use hooks::{
    panic_message, wrap_try_catch, CallArgs, CallOutcome, Callback, HookRegistry, HookTarget,
    HostValue, ObjectTarget,
};
pub use host::Host;
pub use offline::{OfflineRecord, OfflineStore, Table};
pub use pipeline::{should_suppress, CaptureSink, Pipeline};
pub use protocol::constants::AGENT_VERSION;
pub use protocol::types::{
    Breadcrumb, Capture, CapturedError, ExceptionLike, Frame, NormalizedValue, ParsedException,
    RawCapture, ResponseEnvelope,
};
pub use snapshot::{SnapshotSink, SnapshotSource};
pub use trace::{native_frames, BlobFetcher, Normalizer, UreqFetcher};
pub use util::now_ms;
