/**
 * Event-listener instrumentation: wraps listener registration on every
 * event-target family.
 *
 * - `addEventListener` swaps the handler for its try/catch-wrapped form
 *   before delegating, so handlers registered after install run under
 *   observation.
 * - `removeEventListener` maps a raw handler to the wrapper that was
 *   actually stored, so hosts can still remove by the original handle.
 */
use std::sync::Arc;

use argus_core::{wrap_try_catch, Callback, Capture, HostValue, InstallCtx, Installer};

pub struct ListenerInstaller;

impl Installer for ListenerInstaller {
    fn name(&self) -> &'static str {
        "listeners"
    }

    fn install(&self, ctx: &InstallCtx) {
        for (_label, target) in ctx.host.event_targets() {
            let sink = Arc::clone(&ctx.sink);
            ctx.registry.wrap(&target, "addEventListener", move |original| {
                let Some(orig) = original.as_callback().cloned() else {
                    return original;
                };

                HostValue::Callback(Callback::wrapper(move |mut args| {
                    let handler = args.get(1).and_then(HostValue::as_callback).cloned();
                    if let Some(handler) = handler {
                        let wrapped = wrap_try_catch(
                            &sink,
                            Capture::try_catch("addEventListener"),
                            &handler,
                        );
                        args[1] = HostValue::Callback(wrapped);
                    }
                    orig.invoke(args)
                }))
            });

            ctx.registry
                .wrap(&target, "removeEventListener", move |original| {
                    let Some(orig) = original.as_callback().cloned() else {
                        return original;
                    };

                    HostValue::Callback(Callback::wrapper(move |mut args| {
                        let handler = args.get(1).and_then(HostValue::as_callback).cloned();
                        if let Some(handler) = handler {
                            /* Remove what was stored: the wrapper, if one exists. */
                            if let Some(wrapper) = handler.existing_wrapper() {
                                args[1] = HostValue::Callback(wrapper);
                            }
                        }
                        orig.invoke(args)
                    }))
                });
        }
    }
}
