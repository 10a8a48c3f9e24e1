/**
 * The accessor-proxy seam of the hook framework.
 *
 * Each family of host objects (global object, timer service, console,
 * network service, event targets) exposes its members through `HookTarget`
 * instead of runtime reflection. The framework reads and replaces members
 * exclusively through this interface; a target is free to refuse
 * assignment, in which case the registry falls back to a shadow slot.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::value::HostValue;

// ---------------------------------------------------------------------------
// HookTarget
// ---------------------------------------------------------------------------

/// Returned by `HookTarget::set` when the target does not permit direct
/// mutation of the member.
#[derive(Debug)]
pub struct SetRefused;

impl fmt::Display for SetRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target refused member assignment")
    }
}

pub trait HookTarget: Send + Sync {
    /// Stable family label, e.g. `"global"`, `"timer"`, `"network"`.
    fn label(&self) -> &str;

    /// Reads a member. `HostValue::Absent` when the member does not exist.
    fn get(&self, member: &str) -> HostValue;

    /// Replaces a member. May refuse; must not panic.
    fn set(&self, member: &str, value: HostValue) -> Result<(), SetRefused>;
}

// ---------------------------------------------------------------------------
// ObjectTarget - the stock implementation
// ---------------------------------------------------------------------------

/**
 * A plain member-map target. `seal()` makes all subsequent assignments
 * refuse, which models hosts that throw on mutation and exercises the
 * registry's shadow fallback.
 */
pub struct ObjectTarget {
    label: String,
    members: RwLock<HashMap<String, HostValue>>,
    sealed: AtomicBool,
}

impl ObjectTarget {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            members: RwLock::new(HashMap::new()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Builder-style member registration.
    pub fn with_member(self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&self, name: impl Into<String>, value: impl Into<HostValue>) {
        if let Ok(mut members) = self.members.write() {
            members.insert(name.into(), value.into());
        }
    }

    /// After sealing, every `set` refuses.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }
}

impl HookTarget for ObjectTarget {
    fn label(&self) -> &str {
        &self.label
    }

    fn get(&self, member: &str) -> HostValue {
        self.members
            .read()
            .ok()
            .and_then(|m| m.get(member).cloned())
            .unwrap_or(HostValue::Absent)
    }

    fn set(&self, member: &str, value: HostValue) -> Result<(), SetRefused> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(SetRefused);
        }
        match self.members.write() {
            Ok(mut members) => {
                members.insert(member.to_string(), value);
                Ok(())
            }
            Err(_) => Err(SetRefused),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::value::Callback;
    use serde_json::json;

    #[test]
    fn get_and_set_round_trip() {
        let target = ObjectTarget::new("global").with_member("flag", json!(true));
        assert_eq!(target.get("flag").as_json(), Some(&json!(true)));
        assert!(target.get("missing").is_absent());

        target
            .set("onerror", Callback::new(|_| Ok(HostValue::null())).into())
            .unwrap();
        assert!(target.get("onerror").as_callback().is_some());
    }

    #[test]
    fn sealed_target_refuses_assignment() {
        let target = ObjectTarget::new("frozen").with_member("x", json!(1));
        target.seal();
        assert!(target.set("x", json!(2).into()).is_err());
        assert_eq!(target.get("x").as_json(), Some(&json!(1)));
    }
}
