/**
 * Hook framework - transparent member replacement with exact restoration.
 *
 * - `value` - dynamically typed host values and callback handles
 * - `target` - the accessor-proxy trait and stock object implementation
 * - `registry` - ordered hook records, shadow fallback, restore-all
 * - `wrap` - the try/catch capture wrapper
 */

pub mod registry;
pub mod target;
pub mod value;
pub mod wrap;

pub use registry::{HookRecord, HookRegistry};
pub use target::{HookTarget, ObjectTarget, SetRefused};
pub use value::{CallArgs, CallOutcome, Callback, HostValue};
pub use wrap::{panic_message, wrap_try_catch};
