/**
 * The host substrate - the embedding application's callback-based
 * primitives, exposed to the hook framework as accessor-proxy objects.
 *
 * A `Host` groups one object per family:
 * - `global` - the error handler member (`onerror`) plus an event target
 * - `timer` - `setTimeout` / `setInterval` / `requestAnimationFrame`
 * - `console` - one member per log level
 * - `network` - the `request` member the network proxy observes
 * - any number of additional named event targets
 *
 * The host also carries page metadata used in payload assembly, a
 * cooperative timer queue, and dispatch helpers. Dispatch always routes
 * through the object's *current* member, so installed wrappers are
 * exercised exactly as a real host would exercise them. The dispatch
 * helpers are the host's outermost frames: panics unwinding out of
 * wrapped callbacks stop here.
 */
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{json, Value};

use crate::hooks::{Callback, HookTarget, HostValue, ObjectTarget};
use crate::protocol::types::ExceptionLike;

// ---------------------------------------------------------------------------
// PageInfo
// ---------------------------------------------------------------------------

/// Mutable page metadata attached to every captured record.
pub struct PageInfo {
    url: RwLock<String>,
    title: RwLock<String>,
    user_agent: RwLock<String>,
    platform: RwLock<String>,
}

impl PageInfo {
    fn new(url: &str, title: &str) -> Self {
        Self {
            url: RwLock::new(url.to_string()),
            title: RwLock::new(title.to_string()),
            user_agent: RwLock::new("argus-host".to_string()),
            platform: RwLock::new(std::env::consts::OS.to_string()),
        }
    }

    pub fn url(&self) -> String {
        self.url.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn title(&self) -> String {
        self.title.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn platform(&self) -> String {
        self.platform.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_url(&self, url: &str) {
        if let Ok(mut slot) = self.url.write() {
            *slot = url.to_string();
        }
    }

    pub fn set_title(&self, title: &str) {
        if let Ok(mut slot) = self.title.write() {
            *slot = title.to_string();
        }
    }

    pub fn set_user_agent(&self, ua: &str) {
        if let Ok(mut slot) = self.user_agent.write() {
            *slot = ua.to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct PendingTimer {
    id: u64,
    callback: Callback,
    interval: bool,
}

#[derive(Default)]
struct TimerQueue {
    next_id: u64,
    pending: Vec<PendingTimer>,
}

#[derive(Default)]
struct ListenerState {
    listeners: Mutex<HashMap<String, Vec<Callback>>>,
}

/// One named event target: its proxy object plus listener storage.
struct EventTargetEntry {
    label: String,
    object: Arc<ObjectTarget>,
    state: Arc<ListenerState>,
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub struct Host {
    global: Arc<ObjectTarget>,
    timer: Arc<ObjectTarget>,
    console: Arc<ObjectTarget>,
    network: Arc<ObjectTarget>,

    timers: Arc<Mutex<TimerQueue>>,
    targets: RwLock<Vec<EventTargetEntry>>,
    console_lines: Arc<Mutex<Vec<(String, String)>>>,
    scripted: Arc<Mutex<VecDeque<Result<Value, ExceptionLike>>>>,

    pub page: PageInfo,
}

impl Host {
    /// A host with the standard object families.
    pub fn standard(page_url: &str, title: &str) -> Arc<Self> {
        let timers = Arc::new(Mutex::new(TimerQueue::default()));
        let timer = Arc::new(
            ObjectTarget::new("timer")
                .with_member("setTimeout", register_timer(&timers, false))
                .with_member("setInterval", register_timer(&timers, true))
                .with_member("requestAnimationFrame", register_timer(&timers, false))
                .with_member("clearTimeout", cancel_timer(&timers))
                .with_member("clearInterval", cancel_timer(&timers)),
        );

        let console_lines = Arc::new(Mutex::new(Vec::new()));
        let console = Arc::new(ObjectTarget::new("console"));
        for level in ["debug", "info", "warn", "error", "log"] {
            let lines = Arc::clone(&console_lines);
            console.insert(
                level,
                Callback::new(move |args: Vec<HostValue>| {
                    let message = args
                        .first()
                        .and_then(HostValue::as_json)
                        .map(json_as_text)
                        .unwrap_or_default();
                    if let Ok(mut lines) = lines.lock() {
                        lines.push((level.to_string(), message));
                    }
                    Ok(HostValue::null())
                }),
            );
        }

        let scripted: Arc<Mutex<VecDeque<Result<Value, ExceptionLike>>>> =
            Arc::new(Mutex::new(VecDeque::new()));
        let script = Arc::clone(&scripted);
        let network = Arc::new(ObjectTarget::new("network").with_member(
            "request",
            Callback::new(move |args: Vec<HostValue>| {
                let request = args
                    .first()
                    .and_then(HostValue::as_json)
                    .cloned()
                    .unwrap_or(Value::Null);
                serve_request(&script, &request)
            }),
        ));

        /* The global object doubles as an event target. */
        let (global, global_state) = new_event_target("global");

        Arc::new(Self {
            global: Arc::clone(&global),
            timer,
            console,
            network,
            timers,
            targets: RwLock::new(vec![EventTargetEntry {
                label: "global".into(),
                object: global,
                state: global_state,
            }]),
            console_lines,
            scripted,
            page: PageInfo::new(page_url, title),
        })
    }

    // -----------------------------------------------------------------------
    // Object accessors (the hook framework's view)
    // -----------------------------------------------------------------------

    pub fn global_object(&self) -> Arc<dyn HookTarget> {
        Arc::clone(&self.global) as Arc<dyn HookTarget>
    }

    pub fn timer_object(&self) -> Arc<dyn HookTarget> {
        Arc::clone(&self.timer) as Arc<dyn HookTarget>
    }

    pub fn console_object(&self) -> Arc<dyn HookTarget> {
        Arc::clone(&self.console) as Arc<dyn HookTarget>
    }

    pub fn network_object(&self) -> Arc<dyn HookTarget> {
        Arc::clone(&self.network) as Arc<dyn HookTarget>
    }

    /// Every event-target family, the global object included.
    pub fn event_targets(&self) -> Vec<(String, Arc<dyn HookTarget>)> {
        self.targets
            .read()
            .map(|targets| {
                targets
                    .iter()
                    .map(|e| (e.label.clone(), Arc::clone(&e.object) as Arc<dyn HookTarget>))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registers an additional named event-target family.
    pub fn add_event_target(&self, label: &str) {
        let (object, state) = new_event_target(label);
        if let Ok(mut targets) = self.targets.write() {
            targets.push(EventTargetEntry {
                label: label.to_string(),
                object,
                state,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Listener registration and event dispatch
    // -----------------------------------------------------------------------

    /// Registers a listener through the target's current
    /// `addEventListener` member (wrapped once instrumentation is on).
    pub fn add_event_listener(&self, target: &str, kind: &str, listener: Callback) {
        if let Some(member) = self.target_member(target, "addEventListener") {
            let _ = member.invoke(vec![
                HostValue::Json(json!(kind)),
                HostValue::Callback(listener),
            ]);
        }
    }

    pub fn remove_event_listener(&self, target: &str, kind: &str, listener: Callback) {
        if let Some(member) = self.target_member(target, "removeEventListener") {
            let _ = member.invoke(vec![
                HostValue::Json(json!(kind)),
                HostValue::Callback(listener),
            ]);
        }
    }

    /// Delivers an event to every registered listener, in registration
    /// order. Listener failures never propagate past the dispatch.
    pub fn dispatch_event(&self, target: &str, kind: &str, event: Value) {
        let listeners: Vec<Callback> = self
            .targets
            .read()
            .ok()
            .and_then(|targets| {
                targets.iter().find(|e| e.label == target).map(|entry| {
                    entry
                        .state
                        .listeners
                        .lock()
                        .map(|map| map.get(kind).cloned().unwrap_or_default())
                        .unwrap_or_default()
                })
            })
            .unwrap_or_default();

        for listener in listeners {
            let event = event.clone();
            let _ = catch_unwind(AssertUnwindSafe(|| {
                listener.invoke(vec![HostValue::Json(event)])
            }));
        }
    }

    fn target_member(&self, target: &str, member: &str) -> Option<Callback> {
        let targets = self.targets.read().ok()?;
        let entry = targets.iter().find(|e| e.label == target)?;
        entry.object.get(member).as_callback().cloned()
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /**
     * Runs every pending timer callback once, cooperatively. Interval
     * timers stay queued, one-shot timers are consumed. Panics unwinding
     * out of a callback are contained here, like a real event loop's top
     * frame.
     */
    pub fn run_timers(&self) -> usize {
        let batch: Vec<Callback> = match self.timers.lock() {
            Ok(mut queue) => {
                let callbacks = queue
                    .pending
                    .iter()
                    .map(|t| t.callback.clone())
                    .collect();
                queue.pending.retain(|t| t.interval);
                callbacks
            }
            Err(_) => Vec::new(),
        };

        for callback in &batch {
            let _ = catch_unwind(AssertUnwindSafe(|| callback.call0()));
        }
        batch.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.lock().map(|q| q.pending.len()).unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Error channels
    // -----------------------------------------------------------------------

    /// Routes an uncaught failure through the current `onerror` member.
    pub fn raise_error(&self, exception: &ExceptionLike) {
        if let Some(handler) = self.global.get("onerror").as_callback().cloned() {
            let payload = serde_json::to_value(exception).unwrap_or(Value::Null);
            let _ = catch_unwind(AssertUnwindSafe(|| {
                handler.invoke(vec![
                    HostValue::Json(json!(exception.message)),
                    HostValue::Json(json!(self.page.url())),
                    HostValue::Json(Value::Null),
                    HostValue::Json(Value::Null),
                    HostValue::Json(payload),
                ])
            }));
        }
    }

    /// Signals a rejected asynchronous operation.
    pub fn reject_promise(&self, reason: Value) {
        self.dispatch_event("global", "unhandledrejection", json!({ "reason": reason }));
    }

    /// Signals a static-resource load failure.
    pub fn fail_resource(&self, tag: &str, url: &str) {
        self.dispatch_event(
            "global",
            "error",
            json!({ "target": { "tagName": tag, "src": url } }),
        );
    }

    // -----------------------------------------------------------------------
    // Network
    // -----------------------------------------------------------------------

    /// Issues a request through the current `request` member.
    pub fn request(&self, method: &str, url: &str) -> Result<HostValue, ExceptionLike> {
        match self.network.get("request").as_callback() {
            Some(member) => member.invoke(vec![HostValue::Json(json!({
                "method": method,
                "url": url,
            }))]),
            None => Ok(HostValue::Absent),
        }
    }

    /// Queues the next scripted response. Missing fields are filled from
    /// the request.
    pub fn script_response(&self, response: Value) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(Ok(response));
        }
    }

    /// Queues a transport-level failure for the next request.
    pub fn script_transport_error(&self, exception: ExceptionLike) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(Err(exception));
        }
    }

    // -----------------------------------------------------------------------
    // Console and navigation
    // -----------------------------------------------------------------------

    /// Logs through the current console member for `level`.
    pub fn console_call(&self, level: &str, message: Value) {
        if let Some(member) = self.console.get(level).as_callback() {
            let _ = member.invoke(vec![HostValue::Json(message)]);
        }
    }

    pub fn console_lines(&self) -> Vec<(String, String)> {
        self.console_lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Changes the page URL and fires the navigation event.
    pub fn navigate(&self, to: &str) {
        let from = self.page.url();
        self.page.set_url(to);
        self.dispatch_event(
            "global",
            "hashchange",
            json!({ "oldURL": from, "newURL": to }),
        );
    }
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

fn register_timer(timers: &Arc<Mutex<TimerQueue>>, interval: bool) -> Callback {
    let timers = Arc::clone(timers);
    Callback::new(move |args: Vec<HostValue>| {
        let Some(callback) = args.first().and_then(HostValue::as_callback).cloned() else {
            return Ok(HostValue::null());
        };
        let id = match timers.lock() {
            Ok(mut queue) => {
                queue.next_id += 1;
                let id = queue.next_id;
                queue.pending.push(PendingTimer {
                    id,
                    callback,
                    interval,
                });
                id
            }
            Err(_) => 0,
        };
        Ok(HostValue::Json(json!(id)))
    })
}

fn cancel_timer(timers: &Arc<Mutex<TimerQueue>>) -> Callback {
    let timers = Arc::clone(timers);
    Callback::new(move |args: Vec<HostValue>| {
        let id = args
            .first()
            .and_then(HostValue::as_json)
            .and_then(Value::as_u64);
        if let (Some(id), Ok(mut queue)) = (id, timers.lock()) {
            queue.pending.retain(|t| t.id != id);
        }
        Ok(HostValue::null())
    })
}

fn new_event_target(label: &str) -> (Arc<ObjectTarget>, Arc<ListenerState>) {
    let state = Arc::new(ListenerState::default());
    let object = Arc::new(ObjectTarget::new(label));

    let add_state = Arc::clone(&state);
    object.insert(
        "addEventListener",
        Callback::new(move |args: Vec<HostValue>| {
            let kind = args
                .first()
                .and_then(HostValue::as_json)
                .and_then(Value::as_str)
                .map(str::to_string);
            let listener = args.get(1).and_then(HostValue::as_callback).cloned();
            if let (Some(kind), Some(listener)) = (kind, listener) {
                if let Ok(mut listeners) = add_state.listeners.lock() {
                    listeners.entry(kind).or_default().push(listener);
                }
            }
            Ok(HostValue::null())
        }),
    );

    let remove_state = Arc::clone(&state);
    object.insert(
        "removeEventListener",
        Callback::new(move |args: Vec<HostValue>| {
            let kind = args
                .first()
                .and_then(HostValue::as_json)
                .and_then(Value::as_str)
                .map(str::to_string);
            let listener = args.get(1).and_then(HostValue::as_callback).cloned();
            if let (Some(kind), Some(listener)) = (kind, listener) {
                if let Ok(mut listeners) = remove_state.listeners.lock() {
                    if let Some(registered) = listeners.get_mut(&kind) {
                        registered.retain(|l| !l.ptr_eq(&listener));
                    }
                }
            }
            Ok(HostValue::null())
        }),
    );

    (object, state)
}

fn serve_request(
    scripted: &Arc<Mutex<VecDeque<Result<Value, ExceptionLike>>>>,
    request: &Value,
) -> Result<HostValue, ExceptionLike> {
    let next = scripted.lock().ok().and_then(|mut queue| queue.pop_front());
    let mut response = match next {
        Some(Ok(response)) => response,
        Some(Err(exception)) => return Err(exception),
        None => json!({ "status": 200, "statusText": "OK", "aborted": false }),
    };

    if let Some(object) = response.as_object_mut() {
        for key in ["url", "method"] {
            if !object.contains_key(key) {
                if let Some(value) = request.get(key) {
                    object.insert(key.to_string(), value.clone());
                }
            }
        }
    }
    Ok(HostValue::Json(response))
}

fn json_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn timers_register_and_run_once() {
        let host = Host::standard("https://app.example/", "App");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let register = host.timer_object().get("setTimeout");
        let id = register
            .as_callback()
            .unwrap()
            .invoke(vec![
                HostValue::Callback(Callback::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(HostValue::null())
                })),
                HostValue::Json(json!(0)),
            ])
            .unwrap();
        assert!(id.as_json().and_then(Value::as_u64).is_some());

        assert_eq!(host.run_timers(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn interval_timers_stay_pending() {
        let host = Host::standard("https://app.example/", "App");
        let register = host.timer_object().get("setInterval");
        register
            .as_callback()
            .unwrap()
            .invoke(vec![HostValue::Callback(Callback::new(|_| {
                Ok(HostValue::null())
            }))])
            .unwrap();

        host.run_timers();
        assert_eq!(host.pending_timers(), 1);
    }

    #[test]
    fn listeners_receive_dispatched_events() {
        let host = Host::standard("https://app.example/", "App");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let listener = Callback::new(move |args: Vec<HostValue>| {
            sink.lock().unwrap().push(args[0].as_json().cloned());
            Ok(HostValue::null())
        });
        host.add_event_listener("global", "click", listener.clone());
        host.dispatch_event("global", "click", json!({"target": {"tagName": "a"}}));
        assert_eq!(seen.lock().unwrap().len(), 1);

        host.remove_event_listener("global", "click", listener);
        host.dispatch_event("global", "click", json!({}));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn scripted_responses_fill_in_request_fields() {
        let host = Host::standard("https://app.example/", "App");
        host.script_response(json!({"status": 500, "statusText": "Internal Server Error"}));

        let response = host.request("GET", "/api/list").unwrap();
        let response = response.as_json().unwrap();
        assert_eq!(response["status"], 500);
        assert_eq!(response["url"], "/api/list");
        assert_eq!(response["method"], "GET");

        /* Unscripted requests succeed. */
        let response = host.request("GET", "/ok").unwrap();
        assert_eq!(response.as_json().unwrap()["status"], 200);
    }

    #[test]
    fn navigation_updates_page_and_fires_event() {
        let host = Host::standard("https://app.example/#a", "App");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        host.add_event_listener(
            "global",
            "hashchange",
            Callback::new(move |args: Vec<HostValue>| {
                sink.lock().unwrap().push(args[0].as_json().cloned().unwrap());
                Ok(HostValue::null())
            }),
        );

        host.navigate("https://app.example/#b");
        assert_eq!(host.page.url(), "https://app.example/#b");
        let events = seen.lock().unwrap();
        assert_eq!(events[0]["oldURL"], "https://app.example/#a");
        assert_eq!(events[0]["newURL"], "https://app.example/#b");
    }
}
