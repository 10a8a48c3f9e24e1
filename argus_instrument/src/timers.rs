/**
 * Timer instrumentation: wraps the host's deferred-callback primitives
 * so the callbacks they register run under try/catch observation.
 *
 * The wrapper swaps the callback argument for its wrapped form and then
 * calls the original primitive, so registration semantics and the
 * returned timer id pass through untouched.
 */
use std::sync::Arc;

use argus_core::{wrap_try_catch, Callback, Capture, HostValue, InstallCtx, Installer};

const TIMER_MEMBERS: [&str; 3] = ["setTimeout", "setInterval", "requestAnimationFrame"];

pub struct TimerInstaller;

impl Installer for TimerInstaller {
    fn name(&self) -> &'static str {
        "timers"
    }

    fn install(&self, ctx: &InstallCtx) {
        let timer = ctx.host.timer_object();

        for member in TIMER_MEMBERS {
            let sink = Arc::clone(&ctx.sink);
            ctx.registry.wrap(&timer, member, move |original| {
                let Some(orig) = original.as_callback().cloned() else {
                    return original;
                };

                HostValue::Callback(Callback::wrapper(move |mut args| {
                    let callback = args.first().and_then(HostValue::as_callback).cloned();
                    if let Some(callback) = callback {
                        let wrapped =
                            wrap_try_catch(&sink, Capture::try_catch(member), &callback);
                        args[0] = HostValue::Callback(wrapped);
                    }
                    orig.invoke(args)
                }))
            });
        }
    }
}
