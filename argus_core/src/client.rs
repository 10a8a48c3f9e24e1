/**
 * The agent - lifecycle controller and the explicit context every
 * component hangs off.
 *
 * State machine: UNINSTALLED -> INSTALLED -> UNINSTALLED, re-entrant in
 * both directions:
 * - `install()` while installed is a no-op on the existing instance;
 * - `uninstall()` restores every hook record (newest first), detaches
 *   the listeners installers registered, stops the snapshot recorder,
 *   and transitions back. It is safe at any point; deliveries already
 *   scheduled may still complete afterwards.
 *
 * The breadcrumb ring and the in-memory sent list are process-lifetime
 * state owned by the agent itself; the pipeline, hook registry, offline
 * handle, and delivery worker are per-install and rebuilt on every
 * UNINSTALLED -> INSTALLED transition.
 *
 * Deferred extension installers registered through `add_plugin` are
 * drained at the install transition; registrations made while installed
 * are drained immediately.
 */
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;

use crate::breadcrumbs::BreadcrumbTrail;
use crate::config::Options;
use crate::error::AgentError;
use crate::hooks::HookRegistry;
use crate::host::Host;
use crate::offline::{OfflineStore, Table};
use crate::pipeline::{CaptureSink, Pipeline};
use crate::protocol::constants::QUEUE_CAPACITY;
use crate::protocol::types::{Capture, RawCapture};
use crate::snapshot::{SnapshotSink, SnapshotSource};
use crate::trace::{Normalizer, UreqFetcher};
use crate::transport::{DeliveryContext, Transport, Worker};

// ---------------------------------------------------------------------------
// Installer / InstallCtx
// ---------------------------------------------------------------------------

/**
 * One instrumentation installer: a producer that hooks host members or
 * registers listeners at install time. Undo happens through the hook
 * registry plus any detach actions recorded on the context.
 */
pub trait Installer: Send + Sync {
    fn name(&self) -> &'static str;
    fn install(&self, ctx: &InstallCtx);
}

/// Everything an installer may touch.
pub struct InstallCtx {
    pub host: Arc<Host>,
    pub registry: Arc<HookRegistry>,
    pub sink: Arc<dyn CaptureSink>,
    pub options: Arc<Options>,

    detachers: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl InstallCtx {
    pub fn new(
        host: Arc<Host>,
        registry: Arc<HookRegistry>,
        sink: Arc<dyn CaptureSink>,
        options: Arc<Options>,
    ) -> Self {
        Self {
            host,
            registry,
            sink,
            options,
            detachers: Mutex::new(Vec::new()),
        }
    }

    /// Records an action to run at uninstall, before hook restoration.
    pub fn on_uninstall(&self, action: impl FnOnce() + Send + 'static) {
        if let Ok(mut detachers) = self.detachers.lock() {
            detachers.push(Box::new(action));
        }
    }

    fn take_detachers(&self) -> Vec<Box<dyn FnOnce() + Send>> {
        self.detachers
            .lock()
            .map(|mut d| d.drain(..).collect())
            .unwrap_or_default()
    }
}

/// Extension point: invoked with the agent and its registration args.
pub type PluginFn = Arc<dyn Fn(&Agent, &Value) + Send + Sync>;

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

struct InstalledState {
    pipeline: Arc<Pipeline>,
    registry: Arc<HookRegistry>,
    ctx: Arc<InstallCtx>,
    options: Arc<Options>,
}

enum State {
    Uninstalled,
    Installed(InstalledState),
}

pub struct Agent {
    host: Arc<Host>,
    installers: Vec<Arc<dyn Installer>>,
    recorder: Option<Arc<dyn SnapshotSource>>,

    trail: Arc<BreadcrumbTrail>,
    sent: Arc<Mutex<Vec<String>>>,
    plugins: Mutex<Vec<(PluginFn, Value)>>,
    state: RwLock<State>,
}

impl Agent {
    pub fn new(host: Arc<Host>, installers: Vec<Arc<dyn Installer>>) -> Self {
        Self {
            host,
            installers,
            recorder: None,
            trail: Arc::new(BreadcrumbTrail::default()),
            sent: Arc::new(Mutex::new(Vec::new())),
            plugins: Mutex::new(Vec::new()),
            state: RwLock::new(State::Uninstalled),
        }
    }

    /// Attaches an opaque session recorder, started when snapshot capture
    /// is enabled.
    pub fn with_recorder(mut self, recorder: Arc<dyn SnapshotSource>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub fn installed(&self) -> bool {
        matches!(
            self.state.read().as_deref(),
            Ok(State::Installed(_))
        )
    }

    // -----------------------------------------------------------------------
    // install / uninstall
    // -----------------------------------------------------------------------

    /**
     * Merges the options and brings the agent up. A second call while
     * installed is a no-op on the existing instance.
     */
    pub fn install(&self, mut options: Options) -> Result<(), AgentError> {
        {
            let mut state = match self.state.write() {
                Ok(state) => state,
                Err(_) => return Err(AgentError::Config("agent state poisoned".into())),
            };
            if matches!(*state, State::Installed(_)) {
                return Ok(());
            }

            /*
             * Offline storage backs both the offline log and snapshot
             * capture. A failed open degrades those features for the
             * session instead of failing the install.
             */
            let store = if options.offline_log || options.screen_shot {
                match OfflineStore::open(&options.offline_db_path()) {
                    Ok(store) => {
                        store.clear_logs(Table::Error, options.offline_log_exp);
                        store.clear_logs(Table::Snapshot, 0);
                        Some(store)
                    }
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            "offline store unavailable; disabling offline log and snapshots"
                        );
                        options.offline_log = false;
                        options.screen_shot = false;
                        None
                    }
                }
            } else {
                None
            };

            let options = Arc::new(options);
            let snapshots = if options.screen_shot {
                store.clone().map(SnapshotSink::new)
            } else {
                None
            };

            /* Delivery plumbing: bounded channel + background worker. */
            let (sender, receiver) = crossbeam_channel::bounded(QUEUE_CAPACITY);
            let hurry = Arc::new(AtomicBool::new(false));
            Worker::spawn(
                receiver,
                DeliveryContext {
                    transport: Transport::new(),
                    options: Arc::clone(&options),
                    store: store.clone(),
                    snapshots: snapshots.clone(),
                    sent: Arc::clone(&self.sent),
                },
                Arc::clone(&hurry),
            )
            .map_err(AgentError::Worker)?;

            let fetcher = options
                .blob_fetcher
                .clone()
                .unwrap_or_else(|| Arc::new(UreqFetcher::new()));
            let normalizer = Normalizer::new(fetcher, &self.host.page.url());

            let registry = Arc::new(HookRegistry::new());
            let pipeline = Arc::new(Pipeline::new(
                Arc::clone(&options),
                Arc::clone(&self.host),
                Arc::clone(&self.trail),
                Arc::clone(&self.sent),
                store,
                normalizer,
                sender,
                hurry,
            ));

            let ctx = Arc::new(InstallCtx::new(
                Arc::clone(&self.host),
                Arc::clone(&registry),
                Arc::clone(&pipeline) as Arc<dyn CaptureSink>,
                Arc::clone(&options),
            ));

            for installer in &self.installers {
                tracing::debug!(installer = installer.name(), "installing");
                installer.install(&ctx);
            }

            if options.screen_shot {
                if let (Some(recorder), Some(snapshots)) = (&self.recorder, &snapshots) {
                    recorder.start(snapshots.clone());
                }
            }

            *state = State::Installed(InstalledState {
                pipeline,
                registry,
                ctx,
                options,
            });
        }

        self.drain_plugins();
        Ok(())
    }

    /**
     * Tears instrumentation down and restores every hooked member.
     * Scheduled deliveries still in the worker queue are allowed to
     * complete; they are not suppressed.
     */
    pub fn uninstall(&self) {
        let installed = match self.state.write() {
            Ok(mut state) => match std::mem::replace(&mut *state, State::Uninstalled) {
                State::Installed(installed) => installed,
                State::Uninstalled => return,
            },
            Err(_) => return,
        };

        if installed.options.screen_shot {
            if let Some(recorder) = &self.recorder {
                recorder.stop();
            }
        }

        /*
         * Detach before restoring: listener removal has to flow through
         * the still-wrapped members so original handles map to their
         * wrappers.
         */
        for detach in installed.ctx.take_detachers().into_iter().rev() {
            detach();
        }

        installed.registry.restore_all();

        /*
         * Dropping the installed state drops the pipeline and with it the
         * only channel sender; the worker drains what is queued and
         * exits.
         */
    }

    // -----------------------------------------------------------------------
    // Producer entry points
    // -----------------------------------------------------------------------

    /// Routes to the pipeline; silent no-op while uninstalled.
    pub fn capture_error(&self, raw: impl Into<RawCapture>, capture: Capture) {
        if let Some(pipeline) = self.pipeline() {
            pipeline.capture_error(raw.into(), capture);
        }
    }

    /// Appends to the breadcrumb ring. The ring is process-lifetime
    /// state, so recording works regardless of install state.
    pub fn capture_breadcrumb(&self, kind: &str, detail: Value) {
        self.trail.record(kind, detail);
    }

    // -----------------------------------------------------------------------
    // Plugins
    // -----------------------------------------------------------------------

    /**
     * Queues an extension installer. Drained at the next install
     * transition, or immediately when already installed.
     */
    pub fn add_plugin(&self, plugin: PluginFn, args: Value) {
        if let Ok(mut plugins) = self.plugins.lock() {
            plugins.push((plugin, args));
        }
        if self.installed() {
            self.drain_plugins();
        }
    }

    fn drain_plugins(&self) {
        loop {
            /* Pop outside the invocation so plugins can re-register. */
            let next = match self.plugins.lock() {
                Ok(mut plugins) => {
                    if plugins.is_empty() {
                        None
                    } else {
                        Some(plugins.remove(0))
                    }
                }
                Err(_) => None,
            };
            match next {
                Some((plugin, args)) => plugin(self, &args),
                None => break,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    /// Drains scheduled deliveries, hurrying them past their remaining
    /// delay. `true` when the queue emptied within the timeout.
    pub fn flush(&self) -> bool {
        match self.pipeline() {
            Some(pipeline) => pipeline.flush(),
            None => true,
        }
    }

    fn pipeline(&self) -> Option<Arc<Pipeline>> {
        match self.state.read() {
            Ok(state) => match &*state {
                State::Installed(installed) => Some(Arc::clone(&installed.pipeline)),
                State::Uninstalled => None,
            },
            Err(_) => None,
        }
    }
}
