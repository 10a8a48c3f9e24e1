/*!
 * Panic-hook installer - the uncaught-failure channel of a Rust host.
 *
 * `install` registers a `std::panic::set_hook` handler that:
 * 1. extracts the panic message, thread name, and a native backtrace;
 * 2. builds a pre-parsed exception (`kind = "panic"`) and forwards it to
 *    the pipeline with a `globalError` capture context;
 * 3. calls the previous hook, so default stderr output is preserved.
 *
 * # Re-entrancy and lifecycle
 *
 * A thread-local flag breaks recursion if capture itself panics. The
 * process-wide hook is registered once and never unstitched - panic-hook
 * chains cannot be safely removed - so uninstall just disarms it by
 * clearing the sink slot; a later install re-arms it.
 */
use std::cell::Cell;
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use argus_core::{
    native_frames, panic_message, Capture, CaptureSink, InstallCtx, Installer, ParsedException,
    RawCapture,
};

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// The hook itself is registered at most once per process.
static HOOK_REGISTERED: AtomicBool = AtomicBool::new(false);

/// Where captured panics go. `None` while the agent is uninstalled.
static SINK: RwLock<Option<Arc<dyn CaptureSink>>> = RwLock::new(None);

thread_local! {
    /// Breaks recursion if capture panics inside the hook.
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

// ---------------------------------------------------------------------------
// Installer
// ---------------------------------------------------------------------------

pub struct PanicInstaller;

impl Installer for PanicInstaller {
    fn name(&self) -> &'static str {
        "panic-hook"
    }

    fn install(&self, ctx: &InstallCtx) {
        if let Ok(mut sink) = SINK.write() {
            *sink = Some(Arc::clone(&ctx.sink));
        }
        ctx.on_uninstall(|| {
            if let Ok(mut sink) = SINK.write() {
                *sink = None;
            }
        });

        if HOOK_REGISTERED.swap(true, Ordering::SeqCst) {
            return;
        }

        let previous_hook = panic::take_hook();

        panic::set_hook(Box::new(move |info| {
            let is_recursive = IN_HOOK.with(|flag| {
                if flag.get() {
                    true
                } else {
                    flag.set(true);
                    false
                }
            });

            if !is_recursive {
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handle_panic(info);
                }));

                IN_HOOK.with(|flag| flag.set(false));
            }

            previous_hook(info);
        }));
    }
}

// ---------------------------------------------------------------------------
// Internal: build and forward the panic capture
// ---------------------------------------------------------------------------

fn handle_panic(info: &PanicHookInfo) {
    let Some(sink) = SINK.read().ok().and_then(|slot| slot.clone()) else {
        return;
    };

    let message = panic_message(info.payload());
    let thread_name = std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string();

    let bt = backtrace::Backtrace::new();
    let frames = native_frames(&bt);

    let parsed = ParsedException {
        kind: "panic".to_string(),
        message: format!("{message} [thread: {thread_name}]"),
        frames,
    };

    sink.capture_error(RawCapture::Parsed(parsed), Capture::new("globalError"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{HookRegistry, Host, Options};
    use serde_json::Value;
    use std::sync::Mutex;

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

    #[test]
    fn panics_are_captured_while_armed_and_ignored_after_disarm() {
        let host = Host::standard("https://app.example/", "App");
        let sink = Arc::new(RecordingSink::default());
        let ctx = InstallCtx::new(
            Arc::clone(&host),
            Arc::new(HookRegistry::new()),
            Arc::clone(&sink) as Arc<dyn CaptureSink>,
            Arc::new(Options::default()),
        );
        PanicInstaller.install(&ctx);

        let _ = std::panic::catch_unwind(|| panic!("deliberate test panic"));

        {
            let captures = sink.captures.lock().unwrap();
            assert_eq!(captures.len(), 1);
            assert_eq!(captures[0].1.kind, "globalError");
            match &captures[0].0 {
                RawCapture::Parsed(parsed) => {
                    assert_eq!(parsed.kind, "panic");
                    assert!(parsed.message.contains("deliberate test panic"));
                }
                other => panic!("unexpected capture: {other:?}"),
            }
        }

        /* Disarm via the recorded uninstall action. */
        if let Ok(mut slot) = SINK.write() {
            *slot = None;
        }
        let _ = std::panic::catch_unwind(|| panic!("after disarm"));
        assert_eq!(sink.captures.lock().unwrap().len(), 1);
    }
}
