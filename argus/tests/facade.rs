/**
 * The process-wide facade. Kept in its own test binary: the global agent
 * is a per-process singleton, so exactly one test exercises it.
 */
use std::sync::{Arc, Mutex};

use argus::{Capture, CapturedError, ExceptionLike, Host, Options};
use serde_json::json;

#[test]
fn global_agent_round_trip() {
    let host = Host::standard("https://app.example/", "App");
    let collected: Arc<Mutex<Vec<CapturedError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);

    let guard = argus::init(
        Arc::clone(&host),
        Options {
            id: "facade-test".into(),
            delay: 0,
            before_send: Some(Arc::new(move |record: CapturedError| {
                sink.lock().unwrap().push(record.clone());
                Some(record)
            })),
            ..Default::default()
        },
    )
    .unwrap();

    argus::capture_breadcrumb("click", json!({"n": 1}));
    argus::capture_error(
        ExceptionLike::new("Error", "facade boom"),
        Capture::new("globalError"),
    );
    assert!(argus::flush());

    {
        let records = collected.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].web_id, "facade-test");
        assert_eq!(records[0].bread_crumbs.len(), 1);
    }

    /* A second init while installed is a no-op that still guards. */
    let second = argus::init(Arc::clone(&host), Options::default());
    assert!(second.is_ok());
    drop(second);

    argus::uninstall();
    assert!(!argus::agent().unwrap().installed());

    /* Captures are silent no-ops while uninstalled. */
    argus::capture_error("late", Capture::new("custom"));
    argus::flush();
    assert_eq!(collected.lock().unwrap().len(), 1);

    /* Re-install works; the dedup list survived the cycle. */
    let sink = Arc::clone(&collected);
    argus::init(
        host,
        Options {
            delay: 0,
            before_send: Some(Arc::new(move |record: CapturedError| {
                sink.lock().unwrap().push(record.clone());
                Some(record)
            })),
            ..Default::default()
        },
    )
    .unwrap();
    argus::capture_error(
        ExceptionLike::new("Error", "facade boom"),
        Capture::new("globalError"),
    );
    argus::flush();
    /* Byte-identical to the first capture: deduped. */
    assert_eq!(collected.lock().unwrap().len(), 1);

    argus::uninstall();
    drop(guard);
}
