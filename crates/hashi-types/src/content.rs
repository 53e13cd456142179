//! Message content shapes.
//!
//! Field names follow the notebook messaging protocol so these serialize
//! directly into [`Message::content`](crate::Message::content).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// MIME bundles
// ============================================================================

/// MIME-type keyed display data (`{"text/html": ..., "text/plain": ...}`).
///
/// Insertion order is preserved; front-ends pick the richest type they
/// understand, so producers list the preferred representation first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeBundle(IndexMap<String, serde_json::Value>);

impl MimeBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bundle with a single `text/html` body.
    pub fn html(body: impl Into<String>) -> Self {
        Self::single("text/html", body)
    }

    /// A bundle with a single `text/latex` body.
    pub fn latex(body: impl Into<String>) -> Self {
        Self::single("text/latex", body)
    }

    /// A bundle with a single `text/plain` body.
    pub fn plain(body: impl Into<String>) -> Self {
        Self::single("text/plain", body)
    }

    fn single(mime: &str, body: impl Into<String>) -> Self {
        let mut bundle = Self::new();
        bundle.insert(mime, serde_json::Value::String(body.into()));
        bundle
    }

    pub fn insert(&mut self, mime: impl Into<String>, body: serde_json::Value) {
        self.0.insert(mime.into(), body);
    }

    pub fn get(&self, mime: &str) -> Option<&serde_json::Value> {
        self.0.get(mime)
    }

    /// Convenience for string-bodied MIME types.
    pub fn get_str(&self, mime: &str) -> Option<&str> {
        self.0.get(mime).and_then(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, serde_json::Value)> for MimeBundle {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Free-form metadata map attached to bundles and messages.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The data/metadata pair produced by one execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub data: MimeBundle,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Bundle {
    /// A bundle with the given data and empty metadata.
    pub fn with_data(data: MimeBundle) -> Self {
        Self { data, metadata: Metadata::new() }
    }
}

// ============================================================================
// Shell content
// ============================================================================

/// `status` field of every shell reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
    Abort,
}

/// `execute_request` content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_true")]
    pub store_history: bool,
    #[serde(default)]
    pub allow_stdin: bool,
}

fn default_true() -> bool {
    true
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: true,
            allow_stdin: false,
        }
    }
}

/// Successful execution: the bundle plus the execution counter.
///
/// Doubles as the `execute_result` IOPub content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub execution_count: u32,
    #[serde(default)]
    pub data: MimeBundle,
    #[serde(default)]
    pub metadata: Metadata,
}

/// `execute_reply` content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteReply {
    pub status: ReplyStatus,
    pub execution_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_expressions: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(flatten)]
    pub error: Option<ErrorContent>,
}

impl ExecuteReply {
    pub fn ok(execution_count: u32) -> Self {
        Self {
            status: ReplyStatus::Ok,
            execution_count,
            user_expressions: Some(serde_json::Map::new()),
            error: None,
        }
    }

    pub fn error(execution_count: u32, error: ErrorContent) -> Self {
        Self {
            status: ReplyStatus::Error,
            execution_count,
            user_expressions: None,
            error: Some(error),
        }
    }
}

/// Error fields (`ename`, `evalue`, `traceback`).
///
/// Used in `error` IOPub messages and flattened into error replies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContent {
    pub ename: String,
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

impl ErrorContent {
    pub fn new(ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Self {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback: Vec::new(),
        }
    }

    pub fn with_traceback(mut self, traceback: Vec<String>) -> Self {
        self.traceback = traceback;
        self
    }
}

/// Shell reply for operations this kernel does not implement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub status: ReplyStatus,
    #[serde(flatten)]
    pub error: ErrorContent,
}

impl ErrorReply {
    pub fn new(error: ErrorContent) -> Self {
        Self { status: ReplyStatus::Error, error }
    }
}

/// `complete_request` content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub code: String,
    pub cursor_pos: usize,
}

/// `complete_reply` content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompleteReply {
    pub matches: Vec<String>,
    pub cursor_start: usize,
    pub cursor_end: usize,
    #[serde(default)]
    pub metadata: Metadata,
    pub status: ReplyStatus,
}

/// `inspect_request` content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectRequest {
    pub code: String,
    pub cursor_pos: usize,
    #[serde(default)]
    pub detail_level: u8,
}

/// `inspect_reply` content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectReply {
    pub status: ReplyStatus,
    pub found: bool,
    #[serde(default)]
    pub data: MimeBundle,
    #[serde(default)]
    pub metadata: Metadata,
}

/// `is_complete_request` content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsCompleteRequest {
    pub code: String,
}

/// `is_complete_reply` content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsCompleteReply {
    /// One of `complete`, `incomplete`, `invalid`, `unknown`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent: Option<String>,
}

/// `comm_info_request` content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommInfoRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

/// `comm_info_reply` content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommInfoReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub comms: serde_json::Map<String, serde_json::Value>,
}

/// `input_request` content (kernel → front-end).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRequest {
    pub prompt: String,
    #[serde(default)]
    pub password: bool,
}

// ============================================================================
// IOPub content
// ============================================================================

/// Name of an output stream.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamName {
    Stdout,
    Stderr,
}

/// `stream` content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamContent {
    pub name: StreamName,
    pub text: String,
}

/// `display_data` content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayData {
    pub data: MimeBundle,
    #[serde(default)]
    pub metadata: Metadata,
}

/// `execute_input` content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteInput {
    pub code: String,
    pub execution_count: u32,
}

/// Kernel execution state reported by `status` messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Starting,
    Busy,
    Idle,
}

/// `status` content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusContent {
    pub execution_state: ExecutionState,
}
