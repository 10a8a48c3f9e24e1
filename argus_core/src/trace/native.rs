/**
 * Conversion of in-process native backtraces into the shared `Frame`
 * shape. Used by producers that observe failures with no textual trace
 * to parse - most notably the panic hook.
 */
use crate::protocol::constants::UNKNOWN_FUNCTION;
use crate::protocol::types::Frame;

/**
 * Converts a resolved `backtrace::Backtrace` into frames, skipping
 * symbols that carry neither a file nor a function name. Frame order is
 * as captured: innermost call first.
 */
pub fn native_frames(bt: &backtrace::Backtrace) -> Vec<Frame> {
    let mut frames = Vec::new();

    for frame in bt.frames() {
        for symbol in frame.symbols() {
            let function = symbol.name().map(|n| n.to_string());
            let file = symbol.filename().map(|p| p.display().to_string());

            if function.is_none() && file.is_none() {
                continue;
            }

            frames.push(Frame {
                url: file,
                function: function.unwrap_or_else(|| UNKNOWN_FUNCTION.to_string()),
                args: Vec::new(),
                line: symbol.lineno(),
                column: symbol.colno(),
            });
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_backtrace_produces_named_frames() {
        let bt = backtrace::Backtrace::new();
        let frames = native_frames(&bt);

        /* Every emitted frame resolved something useful. */
        for frame in &frames {
            assert!(frame.url.is_some() || frame.function != UNKNOWN_FUNCTION);
        }
    }
}
