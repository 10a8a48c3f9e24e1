/**
 * UI breadcrumb observers - producers that only ever record context.
 *
 * - clicks: the event target is serialized into a short CSS-like path;
 * - keypresses: collapsed into `input` breadcrumbs on a one-second
 *   debounce window so typing does not flood the ring;
 * - navigation: `hashchange` events record the from/to pair;
 * - console: every level member is wrapped to record the first argument
 *   before calling through.
 */
use std::sync::{Arc, Mutex};

use argus_core::{now_ms, Callback, CaptureSink, Host, HostValue, InstallCtx, Installer};
use serde_json::{json, Value};

const KEYPRESS_DEBOUNCE_MS: i64 = 1000;
const CONSOLE_LEVELS: [&str; 5] = ["debug", "info", "warn", "error", "log"];

/// Element-path serialization bounds.
const MAX_TRAVERSE_HEIGHT: usize = 5;
const MAX_OUTPUT_LEN: usize = 80;

pub struct UiBreadcrumbInstaller;

impl Installer for UiBreadcrumbInstaller {
    fn name(&self) -> &'static str {
        "ui-breadcrumbs"
    }

    fn install(&self, ctx: &InstallCtx) {
        let click = event_breadcrumb_listener(ctx, "click");
        ctx.host.add_event_listener("global", "click", click.clone());

        let keypress = keypress_listener(ctx);
        ctx.host
            .add_event_listener("global", "keypress", keypress.clone());

        let navigation = navigation_listener(ctx);
        ctx.host
            .add_event_listener("global", "hashchange", navigation.clone());

        self.wrap_console(ctx);

        let host = Arc::clone(&ctx.host);
        ctx.on_uninstall(move || {
            host.remove_event_listener("global", "click", click);
            host.remove_event_listener("global", "keypress", keypress);
            host.remove_event_listener("global", "hashchange", navigation);
        });
    }
}

impl UiBreadcrumbInstaller {
    fn wrap_console(&self, ctx: &InstallCtx) {
        let console = ctx.host.console_object();

        for level in CONSOLE_LEVELS {
            let sink = Arc::clone(&ctx.sink);
            let host = Arc::clone(&ctx.host);

            ctx.registry.wrap(&console, level, move |original| {
                let Some(orig) = original.as_callback().cloned() else {
                    return original;
                };
                let sink = Arc::clone(&sink);
                let host = Arc::clone(&host);

                HostValue::Callback(Callback::wrapper(move |args| {
                    let message = args
                        .first()
                        .and_then(HostValue::as_json)
                        .cloned()
                        .unwrap_or(Value::Null);
                    sink.capture_breadcrumb(
                        "console",
                        json!({
                            "level": level,
                            "message": message,
                            "page": { "url": host.page.url() },
                        }),
                    );
                    orig.invoke(args)
                }))
            });
        }
    }
}

fn event_breadcrumb_listener(ctx: &InstallCtx, kind: &'static str) -> Callback {
    let sink = Arc::clone(&ctx.sink);
    let host = Arc::clone(&ctx.host);

    Callback::new(move |args| {
        let event = args
            .first()
            .and_then(HostValue::as_json)
            .cloned()
            .unwrap_or(Value::Null);
        record_target_breadcrumb(&sink, &host, kind, &event);
        Ok(HostValue::null())
    })
}

fn keypress_listener(ctx: &InstallCtx) -> Callback {
    let sink = Arc::clone(&ctx.sink);
    let host = Arc::clone(&ctx.host);
    let last = Arc::new(Mutex::new(0i64));

    Callback::new(move |args| {
        let now = now_ms();
        let due = last
            .lock()
            .map(|mut stamp| {
                let due = now - *stamp >= KEYPRESS_DEBOUNCE_MS;
                *stamp = now;
                due
            })
            .unwrap_or(false);

        if due {
            let event = args
                .first()
                .and_then(HostValue::as_json)
                .cloned()
                .unwrap_or(Value::Null);
            record_target_breadcrumb(&sink, &host, "input", &event);
        }
        Ok(HostValue::null())
    })
}

fn navigation_listener(ctx: &InstallCtx) -> Callback {
    let sink = Arc::clone(&ctx.sink);

    Callback::new(move |args| {
        let event = args
            .first()
            .and_then(HostValue::as_json)
            .cloned()
            .unwrap_or(Value::Null);
        sink.capture_breadcrumb(
            "navigation",
            json!({
                "page": {
                    "from": event.get("oldURL"),
                    "to": event.get("newURL"),
                },
            }),
        );
        Ok(HostValue::null())
    })
}

fn record_target_breadcrumb(
    sink: &Arc<dyn CaptureSink>,
    host: &Arc<Host>,
    kind: &str,
    event: &Value,
) {
    let target = event.get("target").cloned().unwrap_or(Value::Null);
    sink.capture_breadcrumb(
        kind,
        json!({
            "target": element_path(&target),
            "page": { "url": host.page.url() },
            "outerText": target.get("outerText"),
            "outerHTML": target.get("outerHTML"),
            "value": target.get("value"),
        }),
    );
}

// ---------------------------------------------------------------------------
// Element-path serialization
// ---------------------------------------------------------------------------

/**
 * Serializes an element and its ancestry into a short selector-like
 * string, innermost element last: `div#main > form > button.primary`.
 * Traversal stops at the document root, after five levels, or once the
 * output budget is spent.
 */
fn element_path(element: &Value) -> String {
    const SEPARATOR: &str = " > ";

    let mut out: Vec<String> = Vec::new();
    let mut len = 0;
    let mut current = Some(element);
    let mut height = 0;

    while let Some(elem) = current {
        if height >= MAX_TRAVERSE_HEIGHT {
            break;
        }
        height += 1;

        let next = element_string(elem);
        if next == "html"
            || (height > 1
                && len + out.len() * SEPARATOR.len() + next.len() >= MAX_OUTPUT_LEN)
        {
            break;
        }
        if next.is_empty() {
            break;
        }

        len += next.len();
        out.push(next);
        current = elem.get("parent");
    }

    out.reverse();
    out.join(SEPARATOR)
}

/// One element: `tag#id.class1.class2[name="q"]`.
fn element_string(element: &Value) -> String {
    let Some(tag) = element.get("tagName").and_then(Value::as_str) else {
        return String::new();
    };

    let mut out = String::new();
    out.push_str(&tag.to_lowercase());

    if let Some(id) = element.get("id").and_then(Value::as_str) {
        if !id.is_empty() {
            out.push('#');
            out.push_str(id);
        }
    }

    if let Some(class) = element.get("className").and_then(Value::as_str) {
        for name in class.split_whitespace() {
            out.push('.');
            out.push_str(name);
        }
    }

    for key in ["type", "name", "title", "alt"] {
        if let Some(attr) = element.get(key).and_then(Value::as_str) {
            out.push_str(&format!("[{key}=\"{attr}\"]"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{Capture, HookRegistry, Options, RawCapture};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        crumbs: Mutex<Vec<(String, Value)>>,
    }

    impl CaptureSink for RecordingSink {
        fn capture_error(&self, _raw: RawCapture, _capture: Capture) {}

        fn capture_breadcrumb(&self, kind: &str, detail: Value) {
            self.crumbs.lock().unwrap().push((kind.to_string(), detail));
        }
    }

    fn installed() -> (Arc<Host>, Arc<RecordingSink>) {
        let host = Host::standard("https://app.example/", "App");
        let sink = Arc::new(RecordingSink::default());
        let ctx = InstallCtx::new(
            Arc::clone(&host),
            Arc::new(HookRegistry::new()),
            Arc::clone(&sink) as Arc<dyn CaptureSink>,
            Arc::new(Options::default()),
        );
        UiBreadcrumbInstaller.install(&ctx);
        (host, sink)
    }

    #[test]
    fn element_path_walks_ancestry_innermost_last() {
        let target = json!({
            "tagName": "BUTTON",
            "className": "primary save",
            "parent": {
                "tagName": "FORM",
                "id": "checkout",
                "parent": { "tagName": "HTML" },
            },
        });
        assert_eq!(element_path(&target), "form#checkout > button.primary.save");
    }

    #[test]
    fn element_path_honors_the_output_budget() {
        let target = json!({
            "tagName": "SPAN",
            "className": "a-very-long-class-name-that-keeps-going",
            "parent": {
                "tagName": "DIV",
                "className": "another-very-long-class-name-right-here",
                "parent": { "tagName": "DIV", "id": "outer" },
            },
        });
        let path = element_path(&target);
        assert!(path.len() < MAX_OUTPUT_LEN + 16);
        assert!(path.ends_with("span.a-very-long-class-name-that-keeps-going"));
    }

    #[test]
    fn clicks_record_the_serialized_target() {
        let (host, sink) = installed();
        host.dispatch_event(
            "global",
            "click",
            json!({"target": {"tagName": "A", "id": "home", "value": null}}),
        );

        let crumbs = sink.crumbs.lock().unwrap();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].0, "click");
        assert_eq!(crumbs[0].1["target"], "a#home");
        assert_eq!(crumbs[0].1["page"]["url"], "https://app.example/");
    }

    #[test]
    fn keypresses_are_debounced_into_input_crumbs() {
        let (host, sink) = installed();
        for _ in 0..5 {
            host.dispatch_event(
                "global",
                "keypress",
                json!({"target": {"tagName": "INPUT", "name": "q"}}),
            );
        }

        let crumbs = sink.crumbs.lock().unwrap();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].0, "input");
        assert_eq!(crumbs[0].1["target"], "input[name=\"q\"]");
    }

    #[test]
    fn navigation_records_from_and_to() {
        let (host, sink) = installed();
        host.navigate("https://app.example/#settings");

        let crumbs = sink.crumbs.lock().unwrap();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].0, "navigation");
        assert_eq!(crumbs[0].1["page"]["from"], "https://app.example/");
        assert_eq!(crumbs[0].1["page"]["to"], "https://app.example/#settings");
    }

    #[test]
    fn console_calls_record_level_and_message_and_still_log() {
        let (host, sink) = installed();
        host.console_call("warn", json!("low disk space"));

        let crumbs = sink.crumbs.lock().unwrap();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].0, "console");
        assert_eq!(crumbs[0].1["level"], "warn");
        assert_eq!(crumbs[0].1["message"], "low disk space");

        /* The original console member still ran. */
        assert_eq!(
            host.console_lines(),
            vec![("warn".to_string(), "low disk space".to_string())],
        );
    }
}
