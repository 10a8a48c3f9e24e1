/**
 * Transport layer - HTTP delivery and the background worker thread.
 *
 * - `http` - ureq-based client wrapper
 * - `worker` - background thread, bounded channel, delayed delivery,
 *   flush signaling
 */

pub mod http;
pub mod worker;

pub use http::Transport;
pub use worker::{Delivery, DeliveryContext, FlushSignal, Worker, WorkerMsg};
