/**
 * Minimal walkthrough for the Argus agent.
 *
 * Builds a standard host, installs the agent over it, and pushes a few
 * failures through the wrapped primitives:
 *
 *   cargo run -p argus_demo
 *   cargo run -p argus_demo -- --offline   # persist to the offline store
 *   cargo run -p argus_demo -- --panic     # exercise the panic hook
 *
 * Point REPORT_URL at a collector to see real deliveries; with the
 * default empty URL the agent does everything except the final POST.
 */
use std::sync::Arc;

use serde_json::json;

/// Set to your collector endpoint to observe deliveries.
const REPORT_URL: &str = "";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "argus_core=debug".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let offline = args.iter().any(|a| a == "--offline");
    let test_panic = args.iter().any(|a| a == "--panic");

    let host = argus::Host::standard("https://demo.example/checkout", "Checkout");

    let _guard = argus::init(
        Arc::clone(&host),
        argus::Options {
            id: "demo-endpoint".into(),
            url: REPORT_URL.into(),
            delay: 200,
            offline_log: offline,
            before_send: Some(Arc::new(|record| {
                println!(
                    "[demo] delivering: capture={} value={}",
                    record.capture.kind,
                    serde_json::to_string(&record.value).unwrap_or_default(),
                );
                Some(record)
            })),
            ..Default::default()
        },
    )
    .expect("failed to install the agent");

    /*
     * Context: a click, some console output, a navigation.
     */
    host.dispatch_event(
        "global",
        "click",
        json!({"target": {"tagName": "BUTTON", "id": "pay"}}),
    );
    host.console_call("warn", json!("card form left empty"));
    host.navigate("https://demo.example/checkout#confirm");

    /*
     * A failing timer callback - captured, then re-raised to the host.
     */
    let register = host.timer_object().get("setTimeout");
    register
        .as_callback()
        .expect("setTimeout member")
        .invoke(vec![
            argus::HostValue::Callback(argus::Callback::new(|_| {
                Err(argus::ExceptionLike::new("TypeError", "total is undefined"))
            })),
            argus::HostValue::Json(json!(0)),
        ])
        .ok();
    host.run_timers();
    println!("[demo] timer failure captured");

    /*
     * A failing network call - one statusCodeError record.
     */
    host.script_response(json!({
        "status": 500,
        "statusText": "Internal Server Error",
        "requestId": "demo-req-1",
    }));
    let _ = host.request("POST", "/api/charge");
    println!("[demo] network failure captured");

    /*
     * A business failure inside a 200 response.
     */
    host.script_response(json!({
        "status": 200,
        "contentType": "application/json;charset=UTF-8",
        "body": "{\"success\": false, \"message\": \"card declined\"}",
    }));
    let _ = host.request("POST", "/api/charge");
    println!("[demo] business failure captured");

    /*
     * A rejected asynchronous operation.
     */
    host.reject_promise(json!({"name": "Error", "message": "inventory check timed out"}));

    if test_panic {
        println!("[demo] triggering a panic...");
        panic!("demo panic");
    }

    println!("[demo] done; records flush when the guard drops");
}
