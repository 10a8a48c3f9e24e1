/**
 * Session-recording seam.
 *
 * The recorder itself is an opaque producer: the agent only defines where
 * its output goes. A `SnapshotSource` pushes recording events into a
 * `SnapshotSink`; the sink buffers them and, on each checkout, persists
 * the finished batch to the snapshot table keyed by its checkout time.
 * At delivery time the pipeline collects the batches covering the
 * configured window and attaches them to network-failure payloads.
 */
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::offline::{OfflineRecord, OfflineStore, Table};
use crate::protocol::constants::{SNAPSHOT_CHECKOUT_MS, SNAPSHOT_SWEEP_MS};
use crate::util::now_ms;

// ---------------------------------------------------------------------------
// SnapshotSource
// ---------------------------------------------------------------------------

/// An opaque session recorder. Started when snapshot capture is enabled,
/// stopped at uninstall.
pub trait SnapshotSource: Send + Sync {
    fn start(&self, sink: SnapshotSink);
    fn stop(&self);
}

// ---------------------------------------------------------------------------
// SnapshotSink
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SnapshotSink {
    store: OfflineStore,
    pending: Arc<Mutex<Vec<Value>>>,
    last_sweep: Arc<Mutex<i64>>,
}

impl SnapshotSink {
    pub(crate) fn new(store: OfflineStore) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(Vec::new())),
            last_sweep: Arc::new(Mutex::new(now_ms())),
        }
    }

    /**
     * Accepts one recording event. When the recorder marks a checkout,
     * the batch accumulated so far is persisted first and the buffer
     * restarts with this event.
     */
    pub fn push(&self, event: Value, checkout: bool) {
        if let Ok(mut pending) = self.pending.lock() {
            if checkout && !pending.is_empty() {
                let batch: Vec<Value> = pending.drain(..).collect();
                self.store.add_log(
                    &OfflineRecord::snapshot(now_ms(), Value::Array(batch)),
                    Table::Snapshot,
                );
            }
            pending.push(event);
        }

        self.sweep_if_due();
    }

    /**
     * The events covering the trailing `window_ms`: the most recent
     * persisted batches plus the in-progress buffer, oldest first.
     */
    pub fn collect(&self, window_ms: u64) -> Vec<Value> {
        let batches = self.store.get_logs(Table::Snapshot);
        let keep = (window_ms / SNAPSHOT_CHECKOUT_MS).saturating_sub(1) as usize;
        let skip = batches.len().saturating_sub(keep);

        let mut events = Vec::new();
        for batch in batches.into_iter().skip(skip) {
            if let Value::Array(items) = batch.payload {
                events.extend(items);
            }
        }
        if let Ok(pending) = self.pending.lock() {
            events.extend(pending.iter().cloned());
        }
        events
    }

    /*
     * Housekeeping: the snapshot table is scratch space, swept wholesale
     * every half hour so a long-lived session cannot grow it unbounded.
     */
    fn sweep_if_due(&self) {
        let now = now_ms();
        let due = self
            .last_sweep
            .lock()
            .map(|mut last| {
                if now - *last >= SNAPSHOT_SWEEP_MS {
                    *last = now;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);

        if due {
            self.store.clear_logs(Table::Snapshot, 0);
        }
    }
}
