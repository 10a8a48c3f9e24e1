/**
 * Small shared helpers.
 */

/// Current time as epoch milliseconds. All timestamps in the agent and
/// the offline store use this representation.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
