/**
 * The capture pipeline - the orchestrator between producers and delivery.
 *
 * `capture_error` runs the full policy chain; every step may silently
 * drop the capture and nothing is ever surfaced to the caller:
 *
 * 1. normalize (exception-shaped input goes through the stack parser,
 *    opaque values pass through);
 * 2. ignore-API filter for network failures;
 * 3. ignore-pattern filter on the message;
 * 4. record assembly (breadcrumb snapshot, page metadata);
 * 5. dedup - against persisted records when offline storage is active,
 *    against the process-wide in-memory sent list otherwise, never both;
 * 6. sampling;
 * 7. delayed, fire-and-forget delivery scheduling.
 *
 * `capture_breadcrumb` is synchronous and just appends to the ring.
 *
 * Producers reach the pipeline exclusively through the `CaptureSink`
 * trait - the agent's only two inbound entry points.
 */
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};
use serde_json::Value;

use crate::breadcrumbs::BreadcrumbTrail;
use crate::config::Options;
use crate::host::Host;
use crate::offline::OfflineStore;
use crate::protocol::constants::FLUSH_TIMEOUT;
use crate::protocol::types::{
    Capture, CapturedError, NormalizedValue, ParsedException, RawCapture, ResponseEnvelope,
};
use crate::trace::Normalizer;
use crate::transport::{Delivery, FlushSignal, WorkerMsg};
use crate::util::now_ms;

// ---------------------------------------------------------------------------
// CaptureSink
// ---------------------------------------------------------------------------

/**
 * The producer-facing surface of the pipeline. Network proxies, error
 * channel adapters, and UI observers call these two functions and
 * nothing else.
 */
pub trait CaptureSink: Send + Sync {
    fn capture_error(&self, raw: RawCapture, capture: Capture);
    fn capture_breadcrumb(&self, kind: &str, detail: Value);
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    options: Arc<Options>,
    host: Arc<Host>,
    trail: Arc<BreadcrumbTrail>,

    /// Process-wide list of serialized values already sent, consulted
    /// only when offline storage is inactive.
    sent: Arc<Mutex<Vec<String>>>,

    /// Offline handle, present when offline storage is active.
    store: Option<OfflineStore>,

    normalizer: Normalizer,
    sampler: Arc<dyn Fn() -> f64 + Send + Sync>,

    sender: Sender<WorkerMsg>,
    hurry: Arc<AtomicBool>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        options: Arc<Options>,
        host: Arc<Host>,
        trail: Arc<BreadcrumbTrail>,
        sent: Arc<Mutex<Vec<String>>>,
        store: Option<OfflineStore>,
        normalizer: Normalizer,
        sender: Sender<WorkerMsg>,
        hurry: Arc<AtomicBool>,
    ) -> Self {
        let sampler: Arc<dyn Fn() -> f64 + Send + Sync> = match options.sampler.clone() {
            Some(sampler) => sampler,
            None => Arc::new(|| rand::random::<f64>()),
        };
        Self {
            options,
            host,
            trail,
            sent,
            store,
            normalizer,
            sampler,
            sender,
            hurry,
        }
    }

    /**
     * Fire-and-forget capture. Internal faults are contained: the
     * monitoring agent never becomes the reason the host crashes.
     */
    pub fn capture_error(&self, raw: RawCapture, capture: Capture) {
        let result = catch_unwind(AssertUnwindSafe(|| self.run_capture(raw, capture)));
        if result.is_err() {
            tracing::warn!("capture processing panicked; the capture was dropped");
        }
    }

    pub fn capture_breadcrumb(&self, kind: &str, detail: Value) {
        self.trail.record(kind, detail);
    }

    fn run_capture(&self, raw: RawCapture, capture: Capture) {
        /* Step 1: normalize. */
        let value = match raw {
            RawCapture::Exception(exception) => match self.normalizer.normalize(&exception) {
                Some(parsed) => NormalizedValue::Exception(parsed),
                /*
                 * No textual trace at all: keep the capture meaningful
                 * with a frameless parsed value.
                 */
                None => NormalizedValue::Exception(ParsedException {
                    kind: exception.name,
                    message: exception.message,
                    frames: Vec::new(),
                }),
            },
            RawCapture::Parsed(parsed) => NormalizedValue::Exception(parsed),
            RawCapture::Value(value) => NormalizedValue::Opaque(value),
        };

        /* Step 2: configured APIs are never reported. */
        if value.is_ajax_error() {
            let url = value
                .field("url")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if self
                .options
                .ignore_apis
                .iter()
                .any(|api| url.contains(api.as_str()))
            {
                return;
            }
        }

        /* Step 3: configured messages are never reported. */
        if let Some(message) = value.message() {
            if self
                .options
                .ignore_errors
                .iter()
                .any(|pattern| pattern.is_match(message))
            {
                return;
            }
        }

        /* Step 4: assemble the outbound record. */
        let record = CapturedError {
            web_id: self.options.id.clone(),
            timestamp: now_ms(),
            bread_crumbs: self.trail.snapshot(),
            capture,
            value,
            user_agent: self.host.page.user_agent(),
            system: self.host.page.platform(),
            url: self.host.page.url(),
            title: self.host.page.title(),
            request_id: None,
            snapshot: None,
        };

        /* Step 5: dedup - exactly one source is consulted. */
        let Some(value_key) = record.value.dedup_key() else {
            return;
        };
        match &self.store {
            Some(store) => {
                if store.has_value(&value_key) {
                    return;
                }
            }
            None => {
                let duplicate = self
                    .sent
                    .lock()
                    .map(|sent| sent.iter().any(|key| key == &value_key))
                    .unwrap_or(false);
                if duplicate {
                    return;
                }
            }
        }

        /* Step 6: sampling. The draw lies in [0, 1). */
        if (self.sampler)() >= self.options.random {
            return;
        }

        /* Step 7: schedule delivery after the configured delay. */
        let delivery = Delivery {
            due: Instant::now() + Duration::from_millis(self.options.delay),
            record,
            value_key,
        };
        match self.sender.try_send(WorkerMsg::Deliver(Box::new(delivery))) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("delivery queue is full; dropping a record");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("delivery worker is gone; dropping a record");
            }
        }
    }

    /**
     * Blocks until the worker has drained everything queued so far, or
     * until the timeout. Pending deliveries are hurried past their
     * remaining delay.
     */
    pub fn flush(&self) -> bool {
        self.hurry.store(true, Ordering::SeqCst);
        let signal = Arc::new(FlushSignal::new());
        let flushed = match self
            .sender
            .send_timeout(WorkerMsg::Flush(Arc::clone(&signal)), FLUSH_TIMEOUT)
        {
            Ok(()) => signal.wait_timeout(FLUSH_TIMEOUT),
            Err(_) => false,
        };
        self.hurry.store(false, Ordering::SeqCst);
        flushed
    }
}

impl CaptureSink for Pipeline {
    fn capture_error(&self, raw: RawCapture, capture: Capture) {
        Pipeline::capture_error(self, raw, capture);
    }

    fn capture_breadcrumb(&self, kind: &str, detail: Value) {
        Pipeline::capture_breadcrumb(self, kind, detail);
    }
}

// ---------------------------------------------------------------------------
// Business-failure suppression
// ---------------------------------------------------------------------------

/**
 * Whether a business-failure envelope should be suppressed rather than
 * reported. The configured predicate wins when present; the built-in
 * rules encode the stock policy:
 *
 * (a) no message, a field-scoped message, or a redirect message - the
 *     failure is a form-validation or flow-control artifact;
 * (b) known challenge codes, unless the challenge was cancelled.
 */
pub fn should_suppress(options: &Options, envelope: &ResponseEnvelope) -> bool {
    if let Some(predicate) = &options.suppress_response {
        return predicate(envelope);
    }
    default_suppression(envelope)
}

fn default_suppression(envelope: &ResponseEnvelope) -> bool {
    match &envelope.message {
        None | Some(Value::Null) => return true,
        Some(Value::String(message)) if message.is_empty() => return true,
        Some(message) => {
            if message.get("field").is_some() || message.get("redirect").is_some() {
                return true;
            }
        }
    }

    if matches!(
        envelope.code.as_deref(),
        Some("MFARequired") | Some("MFACheckedFailed")
    ) && !envelope.is_cancelled()
    {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(body: &str) -> ResponseEnvelope {
        ResponseEnvelope::from_body(body).unwrap()
    }

    #[test]
    fn suppresses_missing_field_scoped_and_redirect_messages() {
        assert!(default_suppression(&envelope(r#"{"success": false}"#)));
        assert!(default_suppression(&envelope(
            r#"{"success": false, "message": ""}"#
        )));
        assert!(default_suppression(&envelope(
            r#"{"success": false, "message": {"field": "email"}}"#
        )));
        assert!(default_suppression(&envelope(
            r#"{"success": false, "message": {"redirect": "/login"}}"#
        )));
        assert!(!default_suppression(&envelope(
            r#"{"success": false, "message": "quota exceeded"}"#
        )));
    }

    #[test]
    fn suppresses_challenge_codes_unless_cancelled() {
        assert!(default_suppression(&envelope(
            r#"{"success": false, "message": "mfa", "code": "MFARequired"}"#
        )));
        assert!(default_suppression(&envelope(
            r#"{"success": false, "message": "mfa", "code": "MFACheckedFailed"}"#
        )));
        assert!(!default_suppression(&envelope(
            r#"{"success": false, "message": "mfa", "code": "MFARequired", "cancelled": true}"#
        )));
        assert!(!default_suppression(&envelope(
            r#"{"success": false, "message": "other", "code": "SomethingElse"}"#
        )));
    }

    #[test]
    fn configured_predicate_overrides_the_default_rules() {
        let options = Options {
            suppress_response: Some(Arc::new(|_| false)),
            ..Default::default()
        };
        /* The default rules would suppress this. */
        assert!(!should_suppress(&options, &envelope(r#"{"success": false}"#)));
    }
}
