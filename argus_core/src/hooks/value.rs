/**
 * Host value and callback handles.
 *
 * Host objects expose named members that are either invocable callbacks
 * or plain JSON data. `Callback` is the invocable handle: cheaply
 * clonable, identity-comparable, and carrying two pieces of hidden
 * bookkeeping used by the hook framework:
 *
 * - a `wrapped` marker set on wrapper callbacks, so an already-wrapped
 *   callback is never wrapped a second time;
 * - a one-shot link from an original callback to its wrapper, so that
 *   (a) re-wrapping returns the existing wrapper instance and (b) a
 *   listener registered through a wrapper can later be removed using the
 *   original handle.
 */
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::protocol::types::ExceptionLike;

// ---------------------------------------------------------------------------
// HostValue
// ---------------------------------------------------------------------------

/// A dynamically typed host value: member slots, call arguments, and call
/// results all use this shape.
#[derive(Clone)]
pub enum HostValue {
    Json(Value),
    Callback(Callback),
    Absent,
}

impl HostValue {
    pub fn null() -> Self {
        HostValue::Json(Value::Null)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            HostValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            HostValue::Callback(cb) => Some(cb),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, HostValue::Absent)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Json(v) => write!(f, "Json({v})"),
            HostValue::Callback(cb) => cb.fmt(f),
            HostValue::Absent => write!(f, "Absent"),
        }
    }
}

impl From<Value> for HostValue {
    fn from(v: Value) -> Self {
        HostValue::Json(v)
    }
}

impl From<Callback> for HostValue {
    fn from(cb: Callback) -> Self {
        HostValue::Callback(cb)
    }
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// Arguments passed to a host callback.
pub type CallArgs = Vec<HostValue>;

/// Result of invoking a host callback. `Err` is the host-level "throw":
/// wrappers observe it, forward it to the pipeline, and pass it through
/// unchanged so the host still sees the original failure.
pub type CallOutcome = Result<HostValue, ExceptionLike>;

struct CallbackInner {
    func: Box<dyn Fn(CallArgs) -> CallOutcome + Send + Sync>,

    /// Set on callbacks produced by the hook framework.
    wrapped: bool,

    /// Link from an original callback to the wrapper built over it.
    wrapper: OnceLock<Callback>,
}

/// An invocable host member. Clones share identity (`ptr_eq`).
#[derive(Clone)]
pub struct Callback {
    inner: Arc<CallbackInner>,
}

impl Callback {
    /// A plain host callback.
    pub fn new(func: impl Fn(CallArgs) -> CallOutcome + Send + Sync + 'static) -> Self {
        Self::build(func, false)
    }

    /// A callback carrying the hidden wrapped marker. Only the hook
    /// framework and installers should create these.
    pub fn wrapper(func: impl Fn(CallArgs) -> CallOutcome + Send + Sync + 'static) -> Self {
        Self::build(func, true)
    }

    fn build(
        func: impl Fn(CallArgs) -> CallOutcome + Send + Sync + 'static,
        wrapped: bool,
    ) -> Self {
        Self {
            inner: Arc::new(CallbackInner {
                func: Box::new(func),
                wrapped,
                wrapper: OnceLock::new(),
            }),
        }
    }

    pub fn invoke(&self, args: CallArgs) -> CallOutcome {
        (self.inner.func)(args)
    }

    /// Convenience for zero-argument invocation.
    pub fn call0(&self) -> CallOutcome {
        self.invoke(Vec::new())
    }

    pub fn is_wrapper(&self) -> bool {
        self.inner.wrapped
    }

    /// The wrapper previously built over this callback, if any.
    pub fn existing_wrapper(&self) -> Option<Callback> {
        self.inner.wrapper.get().cloned()
    }

    /// Records the wrapper built over this callback. First write wins.
    pub fn link_wrapper(&self, wrapper: &Callback) {
        let _ = self.inner.wrapper.set(wrapper.clone());
    }

    /// Identity comparison: true when both handles refer to the same
    /// underlying callback.
    pub fn ptr_eq(&self, other: &Callback) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Callback({:p}{})",
            Arc::as_ptr(&self.inner),
            if self.inner.wrapped { ", wrapper" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_identity() {
        let cb = Callback::new(|_| Ok(HostValue::null()));
        let clone = cb.clone();
        assert!(cb.ptr_eq(&clone));

        let other = Callback::new(|_| Ok(HostValue::null()));
        assert!(!cb.ptr_eq(&other));
    }

    #[test]
    fn wrapper_link_is_one_shot() {
        let original = Callback::new(|_| Ok(HostValue::null()));
        let first = Callback::wrapper(|_| Ok(HostValue::null()));
        let second = Callback::wrapper(|_| Ok(HostValue::null()));

        original.link_wrapper(&first);
        original.link_wrapper(&second);

        assert!(original.existing_wrapper().unwrap().ptr_eq(&first));
    }

    #[test]
    fn invoke_passes_args_and_outcome() {
        let cb = Callback::new(|args| {
            let n = args[0].as_json().and_then(Value::as_i64).unwrap_or(0);
            Ok(HostValue::Json(json!(n + 1)))
        });
        let out = cb.invoke(vec![HostValue::Json(json!(41))]).unwrap();
        assert_eq!(out.as_json(), Some(&json!(42)));
    }
}
