/**
 * Background worker thread that drains the delivery queue.
 *
 * ```text
 *  ┌──────────────┐     bounded channel     ┌────────────────┐
 *  │ Capture path │ ───── WorkerMsg ──────► │  Worker thread  │
 *  │ (any thread) │                         │  (single)       │
 *  └──────────────┘                         └───────┬────────┘
 *                                                   │ sleep until due,
 *                                                   │ then deliver
 *                                            ┌──────▼──────┐
 *                                            │  Collector  │
 *                                            └─────────────┘
 * ```
 *
 * Each `Deliver` message carries a due instant (capture time plus the
 * configured delay). The channel is FIFO and every message uses the same
 * delay, so due times arrive monotonically and a single sleep per message
 * implements the schedule. The worker sleeps in short slices and checks
 * the shared hurry flag, so a flush can push pending deliveries out
 * without waiting out their remaining delay.
 *
 * The loop runs until the channel disconnects, which happens when the
 * pipeline (the only sender) is dropped at uninstall. Messages already in
 * the channel at that point are still delivered - in-flight sends after
 * uninstall are accepted behavior.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::config::Options;
use crate::offline::{OfflineRecord, OfflineStore, Table};
use crate::protocol::types::CapturedError;
use crate::snapshot::SnapshotSink;
use crate::util::now_ms;

use super::http::Transport;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One scheduled delivery.
pub struct Delivery {
    pub due: Instant,
    pub record: CapturedError,

    /// Serialized normalized value - the dedup bookkeeping key.
    pub value_key: String,
}

pub enum WorkerMsg {
    Deliver(Box<Delivery>),

    /// Requests a wake-up once all preceding messages are processed.
    Flush(Arc<FlushSignal>),
}

// ---------------------------------------------------------------------------
// FlushSignal
// ---------------------------------------------------------------------------

/**
 * Condvar pair used to block a `flush()` caller until the worker has
 * drained everything queued before the flush request.
 */
pub struct FlushSignal {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

impl FlushSignal {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        if let Ok(mut done) = self.mutex.lock() {
            *done = true;
            self.condvar.notify_all();
        }
    }

    /// `true` when the flush completed in time, `false` on timeout.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        if let Ok(guard) = self.mutex.lock() {
            match self.condvar.wait_timeout_while(guard, timeout, |done| !*done) {
                Ok((_, result)) => !result.timed_out(),
                Err(_) => false,
            }
        } else {
            false
        }
    }
}

impl Default for FlushSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// DeliveryContext
// ---------------------------------------------------------------------------

/// Everything the worker needs to finish a delivery.
pub struct DeliveryContext {
    pub transport: Transport,
    pub options: Arc<Options>,
    pub store: Option<OfflineStore>,
    pub snapshots: Option<SnapshotSink>,

    /// In-memory sent list shared with the pipeline's dedup check.
    pub sent: Arc<Mutex<Vec<String>>>,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct Worker;

impl Worker {
    /**
     * Spawns the delivery thread. Fire-and-forget: no join handle is
     * kept; the flush path is how callers wait for drainage.
     */
    pub fn spawn(
        receiver: Receiver<WorkerMsg>,
        context: DeliveryContext,
        hurry: Arc<AtomicBool>,
    ) -> Result<(), String> {
        thread::Builder::new()
            .name("argus-worker".into())
            .spawn(move || {
                /*
                 * A panic inside delivery must not kill the thread
                 * silently mid-queue; contain it, log, and stop.
                 */
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    Self::run_loop(&receiver, &context, &hurry);
                }));

                if result.is_err() {
                    tracing::warn!("delivery worker panicked; pending records dropped");
                }
            })
            .map(|_| ())
            .map_err(|e| format!("failed to spawn worker thread: {e}"))
    }

    fn run_loop(
        receiver: &Receiver<WorkerMsg>,
        context: &DeliveryContext,
        hurry: &Arc<AtomicBool>,
    ) {
        while let Ok(msg) = receiver.recv() {
            match msg {
                WorkerMsg::Deliver(delivery) => {
                    wait_until(delivery.due, hurry);
                    deliver(context, *delivery);
                }
                WorkerMsg::Flush(signal) => {
                    signal.notify();
                }
            }
        }
    }
}

/// Sleeps in 50 ms slices until `due`, or until the hurry flag is raised.
fn wait_until(due: Instant, hurry: &Arc<AtomicBool>) {
    const SLICE: std::time::Duration = std::time::Duration::from_millis(50);
    loop {
        if hurry.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= due {
            return;
        }
        thread::sleep(SLICE.min(due - now));
    }
}

/**
 * Finishes one delivery:
 * 1. attaches the snapshot window to network-failure payloads;
 * 2. lifts `requestId` to the top of the record;
 * 3. persists the record (offline mode) or appends the value key to the
 *    in-memory sent list (dedup bookkeeping);
 * 4. POSTs to the report URL, unless none is configured.
 */
fn deliver(context: &DeliveryContext, delivery: Delivery) {
    let Delivery {
        mut record,
        value_key,
        ..
    } = delivery;

    if record.value.is_ajax_error() {
        if context.options.screen_shot {
            if let Some(snapshots) = &context.snapshots {
                record.snapshot = Some(snapshots.collect(context.options.screen_shot_time));
            }
        }
        record.request_id = record.value.field("requestId").cloned();
    }

    /*
     * The pre-delivery callback may rewrite or drop the record. Dropping
     * here leaves no dedup bookkeeping behind, matching a record that
     * was never delivered.
     */
    if let Some(before_send) = &context.options.before_send {
        match before_send(record) {
            Some(modified) => record = modified,
            None => return,
        }
    }

    if let Some(store) = &context.store {
        let payload = match serde_json::to_value(&record) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        store.add_log(
            &OfflineRecord::error(now_ms(), value_key, payload),
            Table::Error,
        );
    } else if let Ok(mut sent) = context.sent.lock() {
        sent.push(value_key);
    }

    if !context.options.url.is_empty() {
        context.transport.send(&context.options.url, &record);
    }
}
