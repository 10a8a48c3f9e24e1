/**
 * The hook registry - ordered record of every member replacement, with
 * exact restoration on uninstall.
 *
 * Installation path:
 * 1. Read the current member (shadow-aware).
 * 2. If it is already a wrapper callback, do nothing - wrapping is
 *    idempotent and never nests.
 * 3. Record `{target, member, original}` BEFORE mutation.
 * 4. Apply the factory's replacement via `HookTarget::set`; if the target
 *    refuses, keep the replacement in a private shadow slot instead of
 *    propagating the refusal.
 *
 * Restoration walks the records in reverse registration order. Each
 * record is independent, so reverse order is a convention rather than a
 * requirement, but it keeps nested wraps of the same member correct.
 */
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::target::HookTarget;
use super::value::HostValue;

// ---------------------------------------------------------------------------
// HookRecord
// ---------------------------------------------------------------------------

/// One member replacement: enough to restore the pre-install state.
pub struct HookRecord {
    pub target: Arc<dyn HookTarget>,
    pub member: String,
    pub original: HostValue,
}

// ---------------------------------------------------------------------------
// HookRegistry
// ---------------------------------------------------------------------------

pub struct HookRegistry {
    records: Mutex<Vec<HookRecord>>,

    /// Replacements for targets that refused assignment, keyed by target
    /// identity + member name. Reads through `member()` consult this
    /// before the target itself.
    shadows: Mutex<HashMap<(usize, String), HostValue>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            shadows: Mutex::new(HashMap::new()),
        }
    }

    fn key(target: &Arc<dyn HookTarget>, member: &str) -> (usize, String) {
        (
            Arc::as_ptr(target) as *const () as usize,
            member.to_string(),
        )
    }

    /**
     * Shadow-aware member read: the installed replacement when the target
     * refused direct mutation, the target's own member otherwise.
     */
    pub fn member(&self, target: &Arc<dyn HookTarget>, member: &str) -> HostValue {
        if let Ok(shadows) = self.shadows.lock() {
            if let Some(value) = shadows.get(&Self::key(target, member)) {
                return value.clone();
            }
        }
        target.get(member)
    }

    /**
     * Replaces `member` on `target` with the factory's result.
     *
     * The factory receives the original member (possibly `Absent`) and
     * returns the replacement. Never panics toward the caller and never
     * reports failure: a refused assignment falls back to a shadow slot.
     */
    pub fn wrap(
        &self,
        target: &Arc<dyn HookTarget>,
        member: &str,
        factory: impl FnOnce(HostValue) -> HostValue,
    ) {
        let current = self.member(target, member);

        /*
         * Idempotence: an installed wrapper is never wrapped again.
         */
        if let HostValue::Callback(cb) = &current {
            if cb.is_wrapper() {
                return;
            }
        }

        let replacement = factory(current.clone());

        if let Ok(mut records) = self.records.lock() {
            records.push(HookRecord {
                target: Arc::clone(target),
                member: member.to_string(),
                original: current,
            });
        }

        if target.set(member, replacement.clone()).is_err() {
            tracing::debug!(
                target_label = target.label(),
                member,
                "target refused assignment, using shadow slot"
            );
            if let Ok(mut shadows) = self.shadows.lock() {
                shadows.insert(Self::key(target, member), replacement);
            }
        }
    }

    /**
     * Restores every hooked member to its recorded original, newest
     * record first, and drops all shadow slots.
     */
    pub fn restore_all(&self) {
        let records: Vec<HookRecord> = match self.records.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => return,
        };

        for record in records.into_iter().rev() {
            let key = Self::key(&record.target, &record.member);
            let shadowed = self
                .shadows
                .lock()
                .map(|mut s| s.remove(&key).is_some())
                .unwrap_or(false);

            /*
             * A shadowed member never reached the target, so there is
             * nothing to write back.
             */
            if !shadowed {
                let _ = record.target.set(&record.member, record.original);
            }
        }

        if let Ok(mut shadows) = self.shadows.lock() {
            shadows.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::target::ObjectTarget;
    use crate::hooks::value::Callback;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn target_with_counter() -> (Arc<dyn HookTarget>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let original = Callback::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HostValue::null())
        });
        let target: Arc<dyn HookTarget> =
            Arc::new(ObjectTarget::new("timer").with_member("setTimeout", original));
        (target, calls)
    }

    fn passthrough_factory(original: HostValue) -> HostValue {
        match original {
            HostValue::Callback(orig) => {
                HostValue::Callback(Callback::wrapper(move |args| orig.invoke(args)))
            }
            other => other,
        }
    }

    #[test]
    fn wrapping_twice_keeps_the_first_wrapper() {
        let (target, calls) = target_with_counter();
        let registry = HookRegistry::new();

        registry.wrap(&target, "setTimeout", passthrough_factory);
        let first = target.get("setTimeout").as_callback().unwrap().clone();

        registry.wrap(&target, "setTimeout", passthrough_factory);
        let second = target.get("setTimeout").as_callback().unwrap().clone();

        assert!(first.ptr_eq(&second));
        assert_eq!(registry.len(), 1);

        /* Still calls through to the original exactly once. */
        second.call0().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restore_returns_the_identical_original() {
        let (target, _) = target_with_counter();
        let original = target.get("setTimeout").as_callback().unwrap().clone();

        let registry = HookRegistry::new();
        registry.wrap(&target, "setTimeout", passthrough_factory);
        assert!(!target
            .get("setTimeout")
            .as_callback()
            .unwrap()
            .ptr_eq(&original));

        registry.restore_all();
        assert!(target
            .get("setTimeout")
            .as_callback()
            .unwrap()
            .ptr_eq(&original));
        assert!(registry.is_empty());
    }

    #[test]
    fn refused_assignment_falls_back_to_shadow() {
        let object = Arc::new(ObjectTarget::new("frozen").with_member("value", json!(1)));
        object.seal();
        let target: Arc<dyn HookTarget> = object.clone();

        let registry = HookRegistry::new();
        registry.wrap(&target, "value", |_| HostValue::Json(json!(2)));

        /* The target itself is untouched, the registry sees the shadow. */
        assert_eq!(object.get("value").as_json(), Some(&json!(1)));
        assert_eq!(registry.member(&target, "value").as_json(), Some(&json!(2)));

        registry.restore_all();
        assert_eq!(registry.member(&target, "value").as_json(), Some(&json!(1)));
    }

    #[test]
    fn wrap_handles_absent_members() {
        let target: Arc<dyn HookTarget> = Arc::new(ObjectTarget::new("global"));
        let registry = HookRegistry::new();

        registry.wrap(&target, "onerror", |original| {
            assert!(original.is_absent());
            HostValue::Callback(Callback::wrapper(|_| Ok(HostValue::null())))
        });

        assert!(target.get("onerror").as_callback().is_some());
        registry.restore_all();
        assert!(target.get("onerror").is_absent());
    }
}
