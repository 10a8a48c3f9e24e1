/**
 * The stack normalizer - turns a raw exception's textual trace into an
 * engine-independent frame list.
 *
 * Three call-site grammars are tried per line, in priority order: the V8
 * notation (`at func (url:line:col)`), the WinJS notation, and the Gecko
 * notation (`func(args)@url:line:col`). The first grammar that matches a
 * line wins; lines matching none are skipped. Frames come out in input
 * order, outermost call first, exactly as the host engine printed them.
 */
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::protocol::constants::{SOURCE_MAP_TAIL_CHARS, UNKNOWN_FUNCTION};
use crate::protocol::types::{ExceptionLike, Frame, ParsedException};

use super::blob::BlobFetcher;

// ---------------------------------------------------------------------------
// Grammars
// ---------------------------------------------------------------------------

static V8_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*at (?:(.*?) ?\()?((?:file|https?|blob|chrome-extension|native|eval|webpack|<anonymous>|[a-z]:|/).*?)(?::(\d+))?(?::(\d+))?\)?\s*$",
    )
    .expect("v8 frame grammar")
});

static WINJS_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*at (?:((?:\[object object\])?.+) )?\(?((?:file|ms-appx(?:-web)|https?|webpack|blob):.*?):(\d+)(?::(\d+))?\)?\s*$",
    )
    .expect("winjs frame grammar")
});

static GECKO_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(.*?)(?:\((.*?)\))?(?:^|@)((?:file|https?|blob|chrome|webpack|resource|moz-extension).*?:/.*?|\[native code\]|[^@]*(?:bundle|\d+\.js))(?::(\d+))?(?::(\d+))?\s*$",
    )
    .expect("gecko frame grammar")
});

/// Re-match applied to V8 `eval` locations to recover the outermost
/// file/line/column triple.
static V8_EVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\S*)(?::(\d+))(?::(\d+))\)").expect("v8 eval grammar"));

/// Re-match applied to Gecko ` > eval` locations; drops the column.
static GECKO_EVAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\S+) line (\d+)(?: > eval line \d+)* > eval").expect("gecko eval grammar")
});

static SOURCE_MAP_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//# sourceMappingURL=(.*)$").expect("source map directive"));

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

pub struct Normalizer {
    fetcher: Arc<dyn BlobFetcher>,

    /// Page origin used to resolve `~`-relative source-map URLs.
    origin: String,
}

impl Normalizer {
    pub fn new(fetcher: Arc<dyn BlobFetcher>, page_url: &str) -> Self {
        let origin = url::Url::parse(page_url)
            .ok()
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_default();
        Self { fetcher, origin }
    }

    /**
     * Parses the exception's textual trace.
     *
     * Returns `None` only when no trace text is present at all. A trace
     * in which no line matches any grammar yields a `ParsedException`
     * with an empty frame list.
     */
    pub fn normalize(&self, exception: &ExceptionLike) -> Option<ParsedException> {
        let stack = exception.stack.as_deref().filter(|s| !s.is_empty())?;

        let mut frames = Vec::new();
        for (index, line) in stack.lines().enumerate() {
            let Some(mut frame) = self.parse_line(index, line, exception) else {
                continue;
            };

            if frame
                .url
                .as_deref()
                .is_some_and(|u| u.starts_with("blob:"))
            {
                self.rewrite_blob_url(&mut frame);
            }

            frames.push(frame);
        }

        Some(ParsedException {
            kind: exception.name.clone(),
            message: exception.message.clone(),
            frames,
        })
    }

    fn parse_line(&self, index: usize, line: &str, exception: &ExceptionLike) -> Option<Frame> {
        if let Some(caps) = V8_FRAME.captures(line) {
            let mut location = caps.get(2).map_or(String::new(), |m| m.as_str().to_string());
            let is_native = location.starts_with("native");
            let is_eval = location.starts_with("eval");
            let mut line_no = parse_u32(&caps, 3);
            let mut column = parse_u32(&caps, 4);

            /*
             * Evaluated code: discard the nested eval location in favor
             * of the outermost file/line/column triple.
             */
            if is_eval {
                if let Some(sub) = V8_EVAL.captures(&location.clone()) {
                    location = sub[1].to_string();
                    line_no = parse_u32(&sub, 2);
                    column = parse_u32(&sub, 3);
                }
            }

            return Some(Frame {
                url: if is_native { None } else { Some(location.clone()) },
                function: function_or_unknown(&caps, 1),
                args: if is_native { vec![location] } else { Vec::new() },
                line: line_no,
                column,
            });
        }

        if let Some(caps) = WINJS_FRAME.captures(line) {
            return Some(Frame {
                url: Some(caps[2].to_string()),
                function: function_or_unknown(&caps, 1),
                args: Vec::new(),
                line: parse_u32(&caps, 3),
                column: parse_u32(&caps, 4),
            });
        }

        if let Some(caps) = GECKO_FRAME.captures(line) {
            let mut location = caps[3].to_string();
            let mut line_no = parse_u32(&caps, 4);
            let mut column = parse_u32(&caps, 5);

            if location.contains(" > eval") {
                if let Some(sub) = GECKO_EVAL.captures(&location.clone()) {
                    /* No column is recoverable for evaluated code. */
                    location = sub[1].to_string();
                    line_no = parse_u32(&sub, 2);
                    column = None;
                }
            } else if index == 0 && column.is_none() {
                /*
                 * Top frame without a column: some engines expose the
                 * column separately on the exception object, 0-based.
                 */
                if let Some(col) = exception.column_number {
                    column = Some(col + 1);
                }
            }

            return Some(Frame {
                url: Some(location),
                function: function_or_unknown(&caps, 1),
                args: caps
                    .get(2)
                    .map(|m| m.as_str().split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
                line: line_no,
                column,
            });
        }

        None
    }

    /**
     * Frames pointing into an in-memory blob get their URL rewritten to
     * the bundle the blob was built from, by reading the source-map
     * directive out of the blob's trailing bytes. Any failure along the
     * way leaves the frame untouched.
     */
    fn rewrite_blob_url(&self, frame: &mut Frame) {
        let Some(url) = frame.url.as_deref() else {
            return;
        };
        let Some(source) = self.fetcher.fetch(url) else {
            return;
        };

        /* The directive always sits at the very end of the file. */
        let chars = source.chars().count();
        let tail: String = source
            .chars()
            .skip(chars.saturating_sub(SOURCE_MAP_TAIL_CHARS))
            .collect();

        let Some(caps) = SOURCE_MAP_DIRECTIVE.captures(&tail) else {
            return;
        };

        let mut map_url = caps[1].to_string();
        if let Some(rest) = map_url.strip_prefix('~') {
            map_url = format!("{}{}", self.origin, rest);
        }

        /* Strip the ".map" suffix to land on the bundle URL. */
        if map_url.len() > 4 {
            map_url.truncate(map_url.len() - 4);
            frame.url = Some(map_url);
        }
    }
}

fn parse_u32(caps: &regex::Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

fn function_or_unknown(caps: &regex::Captures<'_>, index: usize) -> String {
    match caps.get(index) {
        Some(m) if !m.as_str().is_empty() => m.as_str().to_string(),
        _ => UNKNOWN_FUNCTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fetcher returning a canned body, recording requested URLs.
    struct StubFetcher {
        body: Option<String>,
        requests: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn some(body: &str) -> Self {
            Self {
                body: Some(body.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn none() -> Self {
            Self {
                body: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl BlobFetcher for StubFetcher {
        fn fetch(&self, url: &str) -> Option<String> {
            self.requests.lock().unwrap().push(url.to_string());
            self.body.clone()
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(StubFetcher::none()), "https://app.example/page")
    }

    fn exception(stack: &str) -> ExceptionLike {
        ExceptionLike::new("TypeError", "x is undefined").with_stack(stack)
    }

    #[test]
    fn absent_or_empty_trace_yields_none() {
        let nm = normalizer();
        assert!(nm
            .normalize(&ExceptionLike::new("Error", "no trace"))
            .is_none());
        assert!(nm.normalize(&exception("")).is_none());
    }

    #[test]
    fn unmatched_lines_yield_empty_frame_list_not_none() {
        let nm = normalizer();
        let parsed = nm
            .normalize(&exception("garbage line\nanother one"))
            .unwrap();
        assert_eq!(parsed.kind, "TypeError");
        assert_eq!(parsed.message, "x is undefined");
        assert!(parsed.frames.is_empty());
    }

    #[test]
    fn v8_trace_with_named_anonymous_and_native_frames() {
        let nm = normalizer();
        let parsed = nm
            .normalize(&exception(
                "TypeError: x is undefined\n    \
                 at foo (https://app.example/static/app.js:10:20)\n    \
                 at https://app.example/static/app.js:33:44\n    \
                 at native",
            ))
            .unwrap();

        assert_eq!(parsed.frames.len(), 3);

        let named = &parsed.frames[0];
        assert_eq!(named.function, "foo");
        assert_eq!(named.url.as_deref(), Some("https://app.example/static/app.js"));
        assert_eq!((named.line, named.column), (Some(10), Some(20)));

        let anonymous = &parsed.frames[1];
        assert_eq!(anonymous.function, "?");
        assert_eq!((anonymous.line, anonymous.column), (Some(33), Some(44)));

        let native = &parsed.frames[2];
        assert_eq!(native.url, None);
        assert_eq!(native.args, vec!["native".to_string()]);
    }

    #[test]
    fn v8_eval_frame_uses_outermost_location() {
        let nm = normalizer();
        let parsed = nm
            .normalize(&exception(
                "    at eval (eval at foo (https://app.example/a.js:66:7), <anonymous>:1:30)",
            ))
            .unwrap();

        let frame = &parsed.frames[0];
        assert_eq!(frame.url.as_deref(), Some("https://app.example/a.js"));
        assert_eq!((frame.line, frame.column), (Some(66), Some(7)));
    }

    #[test]
    fn gecko_trace_with_args_and_unknown_function() {
        let nm = normalizer();
        let parsed = nm
            .normalize(&exception(
                "foo@https://app.example/static/app.js:10:20\n\
                 bar(arg1,arg2)@https://app.example/static/app.js:30:2\n\
                 @https://app.example/static/app.js:40:1",
            ))
            .unwrap();

        assert_eq!(parsed.frames.len(), 3);
        assert_eq!(parsed.frames[0].function, "foo");
        assert_eq!(
            parsed.frames[1].args,
            vec!["arg1".to_string(), "arg2".to_string()]
        );
        assert_eq!(parsed.frames[2].function, "?");
        assert_eq!(parsed.frames[2].line, Some(40));
    }

    #[test]
    fn gecko_eval_frame_drops_the_column() {
        let nm = normalizer();
        let parsed = nm
            .normalize(&exception(
                "@https://app.example/a.js line 26 > eval:2:96",
            ))
            .unwrap();

        let frame = &parsed.frames[0];
        assert_eq!(frame.url.as_deref(), Some("https://app.example/a.js"));
        assert_eq!(frame.line, Some(26));
        assert_eq!(frame.column, None);
    }

    #[test]
    fn first_frame_column_fixup_is_one_based() {
        let nm = normalizer();
        let mut ex = exception("foo@https://app.example/a.js:10");
        ex.column_number = Some(4);

        let parsed = nm.normalize(&ex).unwrap();
        assert_eq!(parsed.frames[0].column, Some(5));

        /* Applies to the first line only. */
        let mut ex = exception(
            "foo@https://app.example/a.js:10:1\nbar@https://app.example/a.js:20",
        );
        ex.column_number = Some(4);
        let parsed = nm.normalize(&ex).unwrap();
        assert_eq!(parsed.frames[1].column, None);
    }

    #[test]
    fn winjs_frame_parses() {
        let nm = normalizer();
        let parsed = nm
            .normalize(&exception(
                "   at Anonymous function (ms-appx-web://app/js/main.js:10:5)",
            ))
            .unwrap();

        let frame = &parsed.frames[0];
        assert_eq!(frame.function, "Anonymous function");
        assert_eq!(frame.url.as_deref(), Some("ms-appx-web://app/js/main.js"));
        assert_eq!((frame.line, frame.column), (Some(10), Some(5)));
    }

    #[test]
    fn blob_url_is_rewritten_from_source_map_directive() {
        let fetcher = Arc::new(StubFetcher::some(
            "...bundle body...\n//# sourceMappingURL=~/static/app.js.map",
        ));
        let nm = Normalizer::new(fetcher.clone(), "https://app.example/page");

        let parsed = nm
            .normalize(&exception(
                "    at foo (blob:https://app.example/abc-123:1:2)",
            ))
            .unwrap();

        assert_eq!(
            parsed.frames[0].url.as_deref(),
            Some("https://app.example/static/app.js"),
        );
        assert_eq!(
            fetcher.requests.lock().unwrap().as_slice(),
            ["blob:https://app.example/abc-123"],
        );
    }

    #[test]
    fn blob_rewrite_failures_leave_the_frame_unchanged() {
        /* Fetch failure. */
        let nm = Normalizer::new(Arc::new(StubFetcher::none()), "https://app.example/");
        let parsed = nm
            .normalize(&exception("    at foo (blob:https://app.example/x:1:2)"))
            .unwrap();
        assert_eq!(
            parsed.frames[0].url.as_deref(),
            Some("blob:https://app.example/x"),
        );

        /* No directive in the body. */
        let nm = Normalizer::new(
            Arc::new(StubFetcher::some("no directive here")),
            "https://app.example/",
        );
        let parsed = nm
            .normalize(&exception("    at foo (blob:https://app.example/x:1:2)"))
            .unwrap();
        assert_eq!(
            parsed.frames[0].url.as_deref(),
            Some("blob:https://app.example/x"),
        );
    }

    #[test]
    fn directive_is_only_read_from_the_trailing_window() {
        let mut body = String::from("//# sourceMappingURL=~/early.js.map\n");
        body.push_str(&"x".repeat(400));
        let nm = Normalizer::new(Arc::new(StubFetcher::some(&body)), "https://app.example/");

        let parsed = nm
            .normalize(&exception("    at foo (blob:https://app.example/x:1:2)"))
            .unwrap();
        assert_eq!(
            parsed.frames[0].url.as_deref(),
            Some("blob:https://app.example/x"),
        );
    }
}
