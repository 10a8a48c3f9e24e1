/**
 * Global failure channels.
 *
 * Three producers in one installer:
 * - the global `onerror` member, wrapped so every uncaught failure is
 *   captured before the host's own handler (if any) runs;
 * - the global `error` event channel. Once the `onerror` wrapper has
 *   fired at least once the two channels overlap, so the listener then
 *   only reports static-resource load failures; until then it doubles as
 *   the uncaught-failure channel for hosts that never invoke `onerror`;
 * - the `unhandledrejection` event channel for rejected asynchronous
 *   operations.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use argus_core::{
    Callback, Capture, CaptureSink, ExceptionLike, HostValue, InstallCtx, Installer, RawCapture,
};
use serde_json::Value;

pub struct GlobalChannelInstaller;

impl Installer for GlobalChannelInstaller {
    fn name(&self) -> &'static str {
        "global-channels"
    }

    fn install(&self, ctx: &InstallCtx) {
        let armed = Arc::new(AtomicBool::new(false));

        self.wrap_onerror(ctx, &armed);

        let error_listener = self.error_listener(ctx, &armed);
        ctx.host
            .add_event_listener("global", "error", error_listener.clone());

        let rejection_listener = self.rejection_listener(ctx);
        ctx.host
            .add_event_listener("global", "unhandledrejection", rejection_listener.clone());

        let host = Arc::clone(&ctx.host);
        ctx.on_uninstall(move || {
            host.remove_event_listener("global", "error", error_listener);
            host.remove_event_listener("global", "unhandledrejection", rejection_listener);
        });
    }
}

impl GlobalChannelInstaller {
    fn wrap_onerror(&self, ctx: &InstallCtx, armed: &Arc<AtomicBool>) {
        let sink = Arc::clone(&ctx.sink);
        let armed = Arc::clone(armed);

        ctx.registry
            .wrap(&ctx.host.global_object(), "onerror", move |original| {
                let previous = original.as_callback().cloned();
                let sink = Arc::clone(&sink);
                let armed = Arc::clone(&armed);

                HostValue::Callback(Callback::wrapper(move |args| {
                    armed.store(true, Ordering::SeqCst);
                    sink.capture_error(onerror_args_to_raw(&args), Capture::new("globalError"));

                    /* The host's own handler keeps working. */
                    match &previous {
                        Some(previous) => previous.invoke(args),
                        None => Ok(HostValue::null()),
                    }
                }))
            });
    }

    fn error_listener(&self, ctx: &InstallCtx, armed: &Arc<AtomicBool>) -> Callback {
        let sink = Arc::clone(&ctx.sink);
        let armed = Arc::clone(armed);

        Callback::new(move |args| {
            let event = args
                .first()
                .and_then(HostValue::as_json)
                .cloned()
                .unwrap_or(Value::Null);

            if armed.load(Ordering::SeqCst) {
                /*
                 * The onerror channel covers uncaught failures; only
                 * element load failures are left for this listener.
                 */
                if let Some(url) = resource_url(&event) {
                    sink.capture_error(
                        RawCapture::Exception(ExceptionLike::new("sourceError", url)),
                        Capture::new("globalListenerError"),
                    );
                }
            } else {
                let raw = match event.get("error") {
                    Some(error) if !error.is_null() => RawCapture::from(error.clone()),
                    _ => {
                        let message = event
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        RawCapture::Exception(ExceptionLike::new("errorMsg", message))
                    }
                };
                sink.capture_error(raw, Capture::new("globalListenerError"));
            }
            Ok(HostValue::null())
        })
    }

    fn rejection_listener(&self, ctx: &InstallCtx) -> Callback {
        let sink = Arc::clone(&ctx.sink);

        Callback::new(move |args| {
            let reason = args
                .first()
                .and_then(HostValue::as_json)
                .and_then(|event| event.get("reason"))
                .cloned()
                .unwrap_or(Value::String(String::new()));
            sink.capture_error(RawCapture::from(reason), Capture::new("promiseError"));
            Ok(HostValue::null())
        })
    }
}

/// The `onerror` convention: (message, url, line, column, error).
fn onerror_args_to_raw(args: &[HostValue]) -> RawCapture {
    if let Some(error) = args.get(4).and_then(HostValue::as_json) {
        if let Some(exception) = ExceptionLike::from_value(error) {
            return RawCapture::Exception(exception);
        }
    }
    let message = args
        .first()
        .and_then(HostValue::as_json)
        .and_then(Value::as_str)
        .unwrap_or_default();
    RawCapture::Exception(ExceptionLike::new("errorMsg", message))
}

/// An element-target event with a source URL: a resource load failure.
fn resource_url(event: &Value) -> Option<String> {
    let target = event.get("target")?;
    target.get("tagName")?.as_str()?;
    let url = target
        .get("src")
        .or_else(|| target.get("href"))?
        .as_str()?;
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{HookRegistry, Host, Options};
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingSink {
        captures: Mutex<Vec<(RawCapture, Capture)>>,
    }

    impl CaptureSink for RecordingSink {
        fn capture_error(&self, raw: RawCapture, capture: Capture) {
            self.captures.lock().unwrap().push((raw, capture));
        }

        fn capture_breadcrumb(&self, _kind: &str, _detail: Value) {}
    }

    fn installed_host() -> (Arc<Host>, Arc<RecordingSink>) {
        let host = Host::standard("https://app.example/", "App");
        let sink = Arc::new(RecordingSink {
            captures: Mutex::new(Vec::new()),
        });
        let ctx = InstallCtx::new(
            Arc::clone(&host),
            Arc::new(HookRegistry::new()),
            Arc::clone(&sink) as Arc<dyn CaptureSink>,
            Arc::new(Options::default()),
        );
        GlobalChannelInstaller.install(&ctx);
        (host, sink)
    }

    #[test]
    fn uncaught_errors_flow_through_the_onerror_wrapper() {
        let (host, sink) = installed_host();
        host.raise_error(&ExceptionLike::new("TypeError", "boom"));

        let captures = sink.captures.lock().unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].1.kind, "globalError");
        match &captures[0].0 {
            RawCapture::Exception(ex) => assert_eq!(ex.name, "TypeError"),
            other => panic!("unexpected capture: {other:?}"),
        }
    }

    #[test]
    fn resource_failures_surface_once_the_handler_is_armed() {
        let (host, sink) = installed_host();

        /* Arm the onerror channel first. */
        host.raise_error(&ExceptionLike::new("Error", "any"));
        host.fail_resource("img", "https://cdn.example/logo.png");

        let captures = sink.captures.lock().unwrap();
        assert_eq!(captures.len(), 2);
        assert_eq!(captures[1].1.kind, "globalListenerError");
        match &captures[1].0 {
            RawCapture::Exception(ex) => {
                assert_eq!(ex.name, "sourceError");
                assert_eq!(ex.message, "https://cdn.example/logo.png");
            }
            other => panic!("unexpected capture: {other:?}"),
        }
    }

    #[test]
    fn unarmed_error_events_fall_back_to_the_listener_channel() {
        let (host, sink) = installed_host();
        host.dispatch_event("global", "error", json!({"message": "worker crashed"}));

        let captures = sink.captures.lock().unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].1.kind, "globalListenerError");
    }

    #[test]
    fn rejections_are_captured_as_promise_errors() {
        let (host, sink) = installed_host();
        host.reject_promise(json!({"name": "Error", "message": "rejected"}));

        let captures = sink.captures.lock().unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].1.kind, "promiseError");
    }
}
