/**
 * Protocol layer - the data structures and constants of the capture
 * pipeline.
 *
 * - `types` - raw/normalized/outbound shapes
 * - `constants` - agent-wide defaults and sentinels
 */

pub mod constants;
pub mod types;
