/**
 * The try/catch wrapper - the capture-and-rethrow primitive every
 * installer builds on.
 *
 * A wrapped callback behaves exactly like the original from the host's
 * point of view: arguments, return value, and failures all pass through.
 * The only addition is observation - an `Err` outcome or a panic inside
 * the original is forwarded to the pipeline before being re-raised.
 */
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::pipeline::CaptureSink;
use crate::protocol::types::{Capture, ExceptionLike, RawCapture};

use super::value::Callback;

/**
 * Wraps `original` so failures inside it are captured with the given
 * context.
 *
 * Idempotent: a wrapper is returned unchanged, and a callback that was
 * wrapped before yields the same wrapper instance, never a second layer.
 * The returned wrapper is linked back onto the original so later lookups
 * (and listener removal) can map one to the other.
 */
pub fn wrap_try_catch(
    sink: &Arc<dyn CaptureSink>,
    capture: Capture,
    original: &Callback,
) -> Callback {
    if original.is_wrapper() {
        return original.clone();
    }
    if let Some(existing) = original.existing_wrapper() {
        return existing;
    }

    let sink = Arc::clone(sink);
    let orig = original.clone();

    let wrapper = Callback::wrapper(move |args| {
        let outcome = catch_unwind(AssertUnwindSafe(|| orig.invoke(args)));

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(exception)) => {
                /*
                 * Host-level throw: capture, then hand the failure back
                 * unchanged so the host still observes it.
                 */
                sink.capture_error(
                    RawCapture::Exception(exception.clone()),
                    capture.clone(),
                );
                Err(exception)
            }
            Err(payload) => {
                let exception =
                    ExceptionLike::new("panic", panic_message(payload.as_ref()));
                sink.capture_error(RawCapture::Exception(exception), capture.clone());
                resume_unwind(payload);
            }
        }
    });

    original.link_wrapper(&wrapper);
    wrapper
}

/// Extracts a printable message from a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(s) => (*s).to_string(),
        None => match payload.downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "<unknown panic>".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::value::HostValue;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Sink that records every capture it receives.
    #[derive(Default)]
    struct RecordingSink {
        captures: Mutex<Vec<(RawCapture, Capture)>>,
    }

    impl CaptureSink for RecordingSink {
        fn capture_error(&self, raw: RawCapture, capture: Capture) {
            self.captures.lock().unwrap().push((raw, capture));
        }

        fn capture_breadcrumb(&self, _kind: &str, _detail: Value) {}
    }

    fn recording_sink() -> (Arc<dyn CaptureSink>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Arc::clone(&sink) as Arc<dyn CaptureSink>, sink)
    }

    #[test]
    fn wrapping_twice_yields_the_same_wrapper() {
        let (sink, _) = recording_sink();
        let original = Callback::new(|_| Ok(HostValue::null()));

        let first = wrap_try_catch(&sink, Capture::try_catch("setTimeout"), &original);
        let second = wrap_try_catch(&sink, Capture::try_catch("setTimeout"), &original);
        assert!(first.ptr_eq(&second));

        /* Wrapping the wrapper itself is also a no-op. */
        let third = wrap_try_catch(&sink, Capture::try_catch("setTimeout"), &first);
        assert!(third.ptr_eq(&first));
    }

    #[test]
    fn success_passes_value_through_without_capture() {
        let (sink, recorded) = recording_sink();
        let original = Callback::new(|_| Ok(HostValue::Json(json!("ok"))));
        let wrapped = wrap_try_catch(&sink, Capture::try_catch("setTimeout"), &original);

        let out = wrapped.call0().unwrap();
        assert_eq!(out.as_json(), Some(&json!("ok")));
        assert!(recorded.captures.lock().unwrap().is_empty());
    }

    #[test]
    fn err_outcome_is_captured_and_rethrown() {
        let (sink, recorded) = recording_sink();
        let original =
            Callback::new(|_| Err(ExceptionLike::new("TypeError", "x is undefined")));
        let wrapped = wrap_try_catch(&sink, Capture::try_catch("setInterval"), &original);

        let err = wrapped.call0().unwrap_err();
        assert_eq!(err.message, "x is undefined");

        let captures = recorded.captures.lock().unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].1.kind, "tryCatch");
        assert_eq!(captures[0].1.function.as_deref(), Some("setInterval"));
    }

    #[test]
    fn panic_is_captured_and_resumed() {
        let (sink, recorded) = recording_sink();
        let original = Callback::new(|_| panic!("boom in callback"));
        let wrapped = wrap_try_catch(&sink, Capture::try_catch("setTimeout"), &original);

        let result = catch_unwind(AssertUnwindSafe(|| wrapped.call0()));
        assert!(result.is_err());

        let captures = recorded.captures.lock().unwrap();
        assert_eq!(captures.len(), 1);
        match &captures[0].0 {
            RawCapture::Exception(ex) => {
                assert_eq!(ex.name, "panic");
                assert_eq!(ex.message, "boom in callback");
            }
            other => panic!("unexpected capture: {other:?}"),
        }
    }
}
