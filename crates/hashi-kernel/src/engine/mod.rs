//! The execution engine collaborator.
//!
//! The engine runs code somewhere isolated and talks back only through
//! asynchronous events. The kernel never looks inside it; it needs exactly:
//!
//! - a two-step load: [`EngineLoader::load`] (the runtime becomes available),
//!   then [`Engine::init`] (the runtime initializes itself);
//! - an event stream ([`Engine::subscribe`]) carrying [`EngineEvent`]s;
//! - a way to dispatch requests ([`Engine::dispatch`]);
//! - a synchronous completion query ([`Engine::complete`]).
//!
//! Engines must emit the events of one evaluation serially, ending with
//! exactly one terminal event (`eval.finished` or `eval.error`).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hashi_types::{CorrelationId, ErrorContent, MimeBundle, StreamName};
use tokio::sync::mpsc;

pub mod scripted;

pub use scripted::{
    EngineScript, ScriptEntry, ScriptError, ScriptedDisplay, ScriptedEngine, ScriptedEvent,
    ScriptedLoader, StaticNode,
};

// ============================================================================
// Error Type
// ============================================================================

/// Errors raised by the engine collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("engine failed to load: {0}")]
    Load(String),
    #[error("engine failed to initialize: {0}")]
    Init(String),
    #[error("engine event stream already taken")]
    AlreadySubscribed,
    #[error("engine rejected request: {0}")]
    Dispatch(String),
}

// ============================================================================
// Live render nodes
// ============================================================================

/// A live, UI-attached object produced by the engine (a drawing root, a
/// figure canvas). Cannot be serialized; can be mutated and rendered.
pub trait RenderNode: fmt::Debug + Send + Sync {
    /// Set an attribute on the node's root element.
    fn set_attribute(&mut self, name: &str, value: &str);

    /// Serialize the node to markup, for variants that inline it.
    fn outer_html(&self) -> String;
}

/// An owned live node, as parked on the value bus.
pub type LiveNode = Box<dyn RenderNode>;

/// Payload of an `eval.display` event.
#[derive(Debug)]
pub enum DisplayContent {
    /// Markup or text (HTML, LaTeX, pre-rendered rich text).
    Text(String),
    /// A composite display the engine already split by MIME type.
    Bundle(MimeBundle),
    /// A live object that only the renderer can use.
    Node(LiveNode),
}

impl DisplayContent {
    /// Short name of the content shape, for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bundle(_) => "bundle",
            Self::Node(_) => "node",
        }
    }
}

// ============================================================================
// Events and requests
// ============================================================================

/// Events raised by the engine.
#[derive(Debug)]
pub enum EngineEvent {
    /// Terminal: the evaluation finished, optionally with a value.
    Finished {
        result: Option<MimeBundle>,
        correlation: Option<CorrelationId>,
    },
    /// Terminal: the evaluation raised.
    Error {
        error: ErrorContent,
        correlation: Option<CorrelationId>,
    },
    /// Interim: text written to an output stream.
    Output { stream: StreamName, content: String },
    /// Interim: something to display, tagged with the engine's display kind.
    Display {
        display_type: String,
        content: DisplayContent,
    },
}

impl EngineEvent {
    /// The engine-side event name.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Finished { .. } => "eval.finished",
            Self::Error { .. } => "eval.error",
            Self::Output { .. } => "eval.output",
            Self::Display { .. } => "eval.display",
        }
    }

    /// Whether this event concludes an evaluation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Error { .. })
    }
}

/// Requests dispatched to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineRequest {
    /// `eval.request`: evaluate `code`.
    Eval {
        code: String,
        correlation: CorrelationId,
    },
}

impl EngineRequest {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Eval { .. } => "eval.request",
        }
    }
}

/// Result of the engine's completion query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub matches: Vec<String>,
    /// Offset where the replaced span begins.
    pub cursor_start: usize,
}

/// Receiving end of an engine's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Sending end of an engine's event stream.
pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

// ============================================================================
// Traits
// ============================================================================

/// A loaded execution engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine name, for logs.
    fn name(&self) -> &str;

    /// Engine self-initialization (second load step).
    async fn init(&self) -> Result<(), EngineError>;

    /// Take the engine's event stream. Only the first call succeeds.
    fn subscribe(&self) -> Result<EventReceiver, EngineError>;

    /// Hand a request to the engine. Results arrive as events.
    fn dispatch(&self, request: EngineRequest) -> Result<(), EngineError>;

    /// Completion candidates for `code`, which ends at the cursor.
    fn complete(&self, code: &str) -> Completion;
}

/// Makes an engine available (first load step).
#[async_trait]
pub trait EngineLoader: Send {
    async fn load(self: Box<Self>) -> Result<Arc<dyn Engine>, EngineError>;
}
