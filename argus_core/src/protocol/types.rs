/**
 * Core type definitions for the Argus agent.
 *
 * These structures define the capture protocol end to end: the raw shapes
 * producers hand to the pipeline (`ExceptionLike`, `RawCapture`), the
 * normalized shapes the stack parser emits (`ParsedException`, `Frame`,
 * `NormalizedValue`), the contextual records (`Breadcrumb`, `Capture`),
 * and the outbound payload (`CapturedError`).
 *
 * The collector receives: { "extraInfo": CapturedError } as JSON with
 * camelCase field names.
 */
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ExceptionLike - the raw exception shape
// ---------------------------------------------------------------------------

/**
 * A raw, engine-agnostic exception as observed at a capture site.
 *
 * `stack` is the platform-specific textual trace when one exists; the
 * normalizer turns it into structured frames. `column_number` is the
 * separate column field some engines expose for the top frame only
 * (0-based, converted during normalization).
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionLike {
    /// Error class name, e.g. `"TypeError"`, `"panic"`, `"errorMsg"`.
    pub name: String,

    /// Human-readable message.
    pub message: String,

    /// Raw textual trace, if the failure carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Engine-reported column of the top frame (0-based), when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

impl ExceptionLike {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            column_number: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /**
     * Builds an `ExceptionLike` from any std error. No textual trace is
     * available through the trait, so the normalizer will report `None`
     * for such values and the pipeline falls back to a frameless record.
     */
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        Self::new("Error", err.to_string())
    }

    /**
     * Interprets a host-provided JSON value as an exception when it is
     * exception-shaped (carries both `name` and `message`).
     */
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let name = obj.get("name")?.as_str()?.to_string();
        let message = obj.get("message")?.as_str()?.to_string();
        Some(Self {
            name,
            message,
            stack: obj.get("stack").and_then(Value::as_str).map(str::to_string),
            column_number: obj
                .get("columnNumber")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
        })
    }
}

// ---------------------------------------------------------------------------
// RawCapture - what producers hand to the pipeline
// ---------------------------------------------------------------------------

/**
 * Input accepted by `capture_error`.
 *
 * - `Exception` goes through the stack normalizer.
 * - `Parsed` bypasses it (used by producers that already hold structured
 *   frames, e.g. the panic hook with a native backtrace).
 * - `Value` is an opaque passthrough (network/business failures carrying
 *   domain fields such as `status`, `url`, `requestId`).
 */
#[derive(Debug, Clone)]
pub enum RawCapture {
    Exception(ExceptionLike),
    Parsed(ParsedException),
    Value(Value),
}

impl From<ExceptionLike> for RawCapture {
    fn from(ex: ExceptionLike) -> Self {
        RawCapture::Exception(ex)
    }
}

impl From<ParsedException> for RawCapture {
    fn from(parsed: ParsedException) -> Self {
        RawCapture::Parsed(parsed)
    }
}

impl From<Value> for RawCapture {
    fn from(value: Value) -> Self {
        /*
         * Exception-shaped JSON is promoted so it flows through the
         * normalizer; anything else stays opaque.
         */
        match ExceptionLike::from_value(&value) {
            Some(ex) => RawCapture::Exception(ex),
            None => RawCapture::Value(value),
        }
    }
}

impl From<&str> for RawCapture {
    fn from(message: &str) -> Self {
        RawCapture::Value(Value::String(message.to_string()))
    }
}

impl From<String> for RawCapture {
    fn from(message: String) -> Self {
        RawCapture::Value(Value::String(message))
    }
}

// ---------------------------------------------------------------------------
// Frame / ParsedException / NormalizedValue
// ---------------------------------------------------------------------------

/**
 * One structured call-site from a parsed trace.
 *
 * Ordering within `ParsedException::frames` preserves trace line order
 * (outermost call first). Fields serialize with explicit nulls so two
 * identical frames always produce identical JSON for dedup.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Source location; `None` for native/built-in frames.
    pub url: Option<String>,

    /// Function name, `"?"` when unknown.
    #[serde(rename = "func")]
    pub function: String,

    /// Call arguments when the grammar exposes them; native frames carry
    /// their descriptor as a single synthetic argument.
    pub args: Vec<String>,

    pub line: Option<u32>,
    pub column: Option<u32>,
}

/**
 * A fully normalized exception: kind, message, and structured frames.
 * The frame list may be empty when no trace line matched any grammar.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedException {
    #[serde(rename = "type")]
    pub kind: String,

    pub message: String,

    #[serde(rename = "stack")]
    pub frames: Vec<Frame>,
}

/**
 * The value slot of a captured error: either a parsed exception or an
 * opaque passthrough. Its serialized form is the dedup key.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Exception(ParsedException),
    Opaque(Value),
}

impl NormalizedValue {
    /// The failure message, when one can be read off the value.
    pub fn message(&self) -> Option<&str> {
        match self {
            NormalizedValue::Exception(parsed) => Some(&parsed.message),
            NormalizedValue::Opaque(value) => match value {
                Value::String(s) => Some(s),
                _ => value.get("message").and_then(Value::as_str),
            },
        }
    }

    /// True for opaque network-failure values (`type == "ajaxError"`).
    pub fn is_ajax_error(&self) -> bool {
        matches!(self.field("type"), Some(Value::String(ref t)) if t == "ajaxError")
    }

    /// Reads a named field off an opaque value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            NormalizedValue::Opaque(value) => value.get(name),
            NormalizedValue::Exception(_) => None,
        }
    }

    /**
     * The exact-match dedup key: the serialized value. Byte-identical
     * values and only byte-identical values collide.
     */
    pub fn dedup_key(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

// ---------------------------------------------------------------------------
// Breadcrumb / Capture
// ---------------------------------------------------------------------------

/**
 * A timestamped contextual event (click, navigation, console output,
 * network call) retained in the ring and attached to every capture.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breadcrumb {
    #[serde(rename = "type")]
    pub kind: String,

    pub detail: Value,

    /// Epoch milliseconds at record time.
    pub time: i64,
}

/**
 * Capture context: where and how a failure was observed.
 *
 * `kind` is the channel (`tryCatch`, `globalError`, `promiseError`,
 * `statusCodeError`, ...); `function` names the wrapped primitive and
 * `handler` the user callback, when known.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

impl Capture {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            function: None,
            handler: None,
        }
    }

    /// Context for an exception caught inside a wrapped callback.
    pub fn try_catch(function: impl Into<String>) -> Self {
        Self {
            kind: "tryCatch".into(),
            function: Some(function.into()),
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }
}

// ---------------------------------------------------------------------------
// CapturedError - the outbound record
// ---------------------------------------------------------------------------

/**
 * The assembled record delivered to the collector. Immutable once built;
 * the worker only fills `request_id` and `snapshot` at delivery time for
 * network-failure payloads.
 */
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedError {
    /// Endpoint identifier from the configuration.
    pub web_id: String,

    /// Epoch milliseconds at assembly time.
    pub timestamp: i64,

    /// Ring snapshot at capture time, oldest first.
    pub bread_crumbs: Vec<Breadcrumb>,

    pub capture: Capture,

    pub value: NormalizedValue,

    pub user_agent: String,

    /// Host platform descriptor.
    pub system: String,

    /// Page URL at capture time.
    pub url: String,

    /// Page title at capture time.
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,

    /// Session-recording events attached to network-failure payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Vec<Value>>,
}

// ---------------------------------------------------------------------------
// ResponseEnvelope - business-failure envelope of observed network calls
// ---------------------------------------------------------------------------

/**
 * The structured body of a transport-successful response that may still
 * indicate a business failure. All fields are optional; unknown bodies
 * simply fail to qualify.
 */
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub success: Option<Value>,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub cancelled: Option<Value>,

    #[serde(default)]
    pub message: Option<Value>,
}

impl ResponseEnvelope {
    /// Parses a response body; `None` when it is not a JSON object.
    pub fn from_body(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        value.as_object()?;
        serde_json::from_value(value).ok()
    }

    /// `success` explicitly false, either as a bool or the string "false".
    pub fn is_business_failure(&self) -> bool {
        match &self.success {
            Some(Value::Bool(false)) => true,
            Some(Value::String(s)) => s == "false",
            _ => false,
        }
    }

    /// Truthiness of the `cancelled` flag, JSON-style.
    pub fn is_cancelled(&self) -> bool {
        match &self.cancelled {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}
