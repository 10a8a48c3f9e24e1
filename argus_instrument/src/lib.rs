/*!
 * Argus Instrument - the standard instrumentation installers.
 *
 * Each installer is a thin producer over the core pipeline's two entry
 * points (`capture_error`, `capture_breadcrumb`):
 *
 * - `panic` - the Rust-native uncaught-failure channel
 * - `globals` - `onerror` wrap, resource-load and rejection listeners
 * - `timers` - `setTimeout` / `setInterval` / `requestAnimationFrame`
 * - `listeners` - `addEventListener` / `removeEventListener` wrapping
 * - `network` - the request proxy with status/envelope/abort handling
 * - `crumbs` - click, input, navigation, and console breadcrumbs
 *
 * `default_installers()` returns the full set in install order; the
 * `argus` facade wires it into `init()`.
 */

pub mod crumbs;
pub mod globals;
pub mod listeners;
pub mod network;
pub mod panic;
pub mod timers;

pub use crumbs::UiBreadcrumbInstaller;
pub use globals::GlobalChannelInstaller;
pub use listeners::ListenerInstaller;
pub use network::NetworkInstaller;
pub use panic::PanicInstaller;
pub use timers::TimerInstaller;

use std::sync::Arc;

use argus_core::Installer;

/// The standard installer set, in install order.
pub fn default_installers() -> Vec<Arc<dyn Installer>> {
    vec![
        Arc::new(GlobalChannelInstaller),
        Arc::new(NetworkInstaller),
        Arc::new(TimerInstaller),
        Arc::new(ListenerInstaller),
        Arc::new(UiBreadcrumbInstaller),
        Arc::new(PanicInstaller),
    ]
}
