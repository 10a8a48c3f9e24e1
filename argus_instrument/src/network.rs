/**
 * Network-call proxy.
 *
 * Wraps the host's `request` member. Every exchange leaves a breadcrumb;
 * three failure channels produce captures:
 *
 * - `statusCodeError` - transport succeeded with a non-200 status, unless
 *   the exchange was aborted by the caller (aborts are not failures);
 * - `responseError` - transport succeeded with 200 but the JSON body is a
 *   business-failure envelope, subject to the suppression predicate;
 * - `xhrError` - the transport itself failed.
 *
 * Observation never alters the exchange: the original outcome is returned
 * to the caller untouched, and observation faults are contained.
 */
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use argus_core::{
    should_suppress, Callback, Capture, CaptureSink, ExceptionLike, Host, HostValue, InstallCtx,
    Installer, Options, RawCapture, ResponseEnvelope,
};
use serde_json::{json, Value};

pub struct NetworkInstaller;

impl Installer for NetworkInstaller {
    fn name(&self) -> &'static str {
        "network-proxy"
    }

    fn install(&self, ctx: &InstallCtx) {
        let sink = Arc::clone(&ctx.sink);
        let options = Arc::clone(&ctx.options);
        let host = Arc::clone(&ctx.host);

        ctx.registry
            .wrap(&ctx.host.network_object(), "request", move |original| {
                let Some(orig) = original.as_callback().cloned() else {
                    return original;
                };
                let sink = Arc::clone(&sink);
                let options = Arc::clone(&options);
                let host = Arc::clone(&host);

                HostValue::Callback(Callback::wrapper(move |args| {
                    let request = args
                        .first()
                        .and_then(HostValue::as_json)
                        .cloned()
                        .unwrap_or(Value::Null);

                    let outcome = orig.invoke(args);

                    let _ = catch_unwind(AssertUnwindSafe(|| {
                        observe(&sink, &options, &host, &request, &outcome);
                    }));

                    outcome
                }))
            });
    }
}

fn observe(
    sink: &Arc<dyn CaptureSink>,
    options: &Arc<Options>,
    host: &Arc<Host>,
    request: &Value,
    outcome: &Result<HostValue, ExceptionLike>,
) {
    match outcome {
        Ok(HostValue::Json(response)) => {
            observe_response(sink, options, host, request, response)
        }
        Err(exception) => {
            let mut error = ajax_error_value(request, &Value::Null);
            error["message"] = json!(exception.message);
            sink.capture_error(RawCapture::Value(error), Capture::new("xhrError"));
        }
        Ok(_) => {}
    }
}

fn observe_response(
    sink: &Arc<dyn CaptureSink>,
    options: &Arc<Options>,
    host: &Arc<Host>,
    request: &Value,
    response: &Value,
) {
    let status = response.get("status").and_then(Value::as_i64).unwrap_or(0);
    let aborted = response
        .get("aborted")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    /* Every observed exchange is context for later failures. */
    sink.capture_breadcrumb(
        "XMLHttpRequest",
        json!({
            "page": { "url": host.page.url() },
            "method": field(request, response, "method"),
            "url": field(request, response, "url"),
            "status": status,
            "statusText": response.get("statusText"),
        }),
    );

    let error = ajax_error_value(request, response);

    if status != 200 && !aborted {
        sink.capture_error(RawCapture::Value(error.clone()), Capture::new("statusCodeError"));
        return;
    }

    let content_type = response
        .get("contentType")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if status == 200 && content_type.starts_with("application/json") {
        let Some(body) = response.get("body").and_then(Value::as_str) else {
            return;
        };
        let Some(envelope) = ResponseEnvelope::from_body(body) else {
            return;
        };
        if envelope.is_business_failure() && !should_suppress(options, &envelope) {
            sink.capture_error(RawCapture::Value(error), Capture::new("responseError"));
        }
    }
}

/// The opaque `ajaxError` value carried by all network-failure captures.
fn ajax_error_value(request: &Value, response: &Value) -> Value {
    json!({
        "type": "ajaxError",
        "status": response.get("status").and_then(Value::as_i64).unwrap_or(0),
        "statusText": response.get("statusText"),
        "requestId": response.get("requestId"),
        "resHeader": response.get("headers"),
        "resData": response.get("body"),
        "method": field(request, response, "method"),
        "url": field(request, response, "url"),
    })
}

fn field<'a>(request: &'a Value, response: &'a Value, name: &str) -> &'a Value {
    response
        .get(name)
        .or_else(|| request.get(name))
        .unwrap_or(&Value::Null)
}
