/**
 * Bounded FIFO of contextual events.
 *
 * Producers append through `record`; the pipeline attaches a `snapshot`
 * copy to every capture. Entirely in-memory, process-lifetime scoped, and
 * shared across install cycles - re-installing the agent does not clear
 * recorded context.
 */
use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use crate::protocol::constants::DEFAULT_MAX_BREADCRUMBS;
use crate::protocol::types::Breadcrumb;
use crate::util::now_ms;

pub struct BreadcrumbTrail {
    entries: Mutex<VecDeque<Breadcrumb>>,
    capacity: usize,
}

impl BreadcrumbTrail {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /**
     * Appends an entry stamped with the current time. On overflow the
     * oldest entry is evicted; recording never fails.
     */
    pub fn record(&self, kind: impl Into<String>, detail: Value) {
        let crumb = Breadcrumb {
            kind: kind.into(),
            detail,
            time: now_ms(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(crumb);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
    }

    /// Ordered copy of the current trail, oldest first.
    pub fn snapshot(&self) -> Vec<Breadcrumb> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BreadcrumbTrail {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BREADCRUMBS)
    }
}
