//! A deterministic engine driven by a script of canned events.
//!
//! Used by the end-to-end tests and by the `hashi run` host to exercise the
//! full request → event → reply path without a real language runtime. The
//! script maps exact source strings to the event sequence the engine raises
//! for them:
//!
//! ```ron
//! (
//!     vocabulary: ["print", "property", "range"],
//!     entries: [
//!         (code: "x = 2; x", events: [Finished(result: Some({"text/plain": "2"}))]),
//!         (code: "print('hi')", events: [
//!             Output(stream: stdout, content: "hi\n"),
//!             Finished(result: None),
//!         ]),
//!     ],
//! )
//! ```
//!
//! Unknown code finishes with no result.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hashi_types::{ErrorContent, MimeBundle, StreamName};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::{
    Completion, DisplayContent, Engine, EngineError, EngineEvent, EngineLoader, EngineRequest,
    EventReceiver, EventSender, RenderNode,
};

// ============================================================================
// Script format
// ============================================================================

/// A complete engine script.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineScript {
    /// Words offered by completion.
    #[serde(default)]
    pub vocabulary: Vec<String>,
    /// Canned responses, matched on exact code.
    #[serde(default)]
    pub entries: Vec<ScriptEntry>,
}

/// Events raised for one piece of code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub code: String,
    pub events: Vec<ScriptedEvent>,
}

/// Serializable description of an engine event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScriptedEvent {
    Finished {
        #[serde(default)]
        result: Option<MimeBundle>,
    },
    Error {
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
    Output {
        stream: StreamName,
        content: String,
    },
    Display {
        display_type: String,
        content: ScriptedDisplay,
    },
}

/// Serializable description of display content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScriptedDisplay {
    Text(String),
    Bundle(MimeBundle),
    /// Realized as a [`StaticNode`] at dispatch time.
    Node {
        tag: String,
        #[serde(default)]
        attributes: Vec<(String, String)>,
        #[serde(default)]
        inner: String,
    },
}

/// Errors reading a script file.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl EngineScript {
    /// Parse a script from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ScriptError> {
        Ok(ron::from_str(text)?)
    }

    /// Read a script from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Builder: add a canned response.
    pub fn entry(mut self, code: impl Into<String>, events: Vec<ScriptedEvent>) -> Self {
        self.entries.push(ScriptEntry { code: code.into(), events });
        self
    }

    /// Builder: set the completion vocabulary.
    pub fn vocabulary<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabulary = words.into_iter().map(Into::into).collect();
        self
    }

    fn events_for(&self, code: &str) -> Option<&[ScriptedEvent]> {
        self.entries
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.events.as_slice())
    }
}

// ============================================================================
// StaticNode
// ============================================================================

/// A render node with a tag, ordered attributes, and fixed inner markup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticNode {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub inner: String,
}

impl StaticNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            inner: String::new(),
        }
    }

    pub fn with_inner(mut self, inner: impl Into<String>) -> Self {
        self.inner = inner.into();
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl RenderNode for StaticNode {
    fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    fn outer_html(&self) -> String {
        let mut html = format!("<{}", self.tag);
        for (name, value) in &self.attributes {
            html.push_str(&format!(" {}=\"{}\"", name, value.replace('"', "&quot;")));
        }
        html.push('>');
        html.push_str(&self.inner);
        html.push_str(&format!("</{}>", self.tag));
        html
    }
}

// ============================================================================
// ScriptedEngine
// ============================================================================

/// Engine that replays an [`EngineScript`].
pub struct ScriptedEngine {
    script: EngineScript,
    tx: EventSender,
    rx: Mutex<Option<EventReceiver>>,
    init_gate: Mutex<Option<oneshot::Receiver<()>>>,
    initialized: Mutex<bool>,
}

impl std::fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("entries", &self.script.entries.len())
            .field("vocabulary", &self.script.vocabulary.len())
            .field("initialized", &*self.initialized.lock())
            .finish()
    }
}

impl ScriptedEngine {
    pub fn new(script: EngineScript) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            script,
            tx,
            rx: Mutex::new(Some(rx)),
            init_gate: Mutex::new(None),
            initialized: Mutex::new(false),
        }
    }

    /// Make `init()` wait until `gate` fires (or its sender drops).
    pub fn with_init_gate(self, gate: oneshot::Receiver<()>) -> Self {
        *self.init_gate.lock() = Some(gate);
        self
    }

    fn emit(&self, event: EngineEvent) {
        // Receiver gone means the kernel shut down; nothing left to notify.
        let _ = self.tx.send(event);
    }

    fn realize(
        event: &ScriptedEvent,
        correlation: hashi_types::CorrelationId,
    ) -> EngineEvent {
        match event {
            ScriptedEvent::Finished { result } => EngineEvent::Finished {
                result: result.clone(),
                correlation: Some(correlation),
            },
            ScriptedEvent::Error { ename, evalue, traceback } => EngineEvent::Error {
                error: ErrorContent::new(ename.clone(), evalue.clone())
                    .with_traceback(traceback.clone()),
                correlation: Some(correlation),
            },
            ScriptedEvent::Output { stream, content } => EngineEvent::Output {
                stream: stream.clone(),
                content: content.clone(),
            },
            ScriptedEvent::Display { display_type, content } => EngineEvent::Display {
                display_type: display_type.clone(),
                content: match content {
                    ScriptedDisplay::Text(text) => DisplayContent::Text(text.clone()),
                    ScriptedDisplay::Bundle(bundle) => DisplayContent::Bundle(bundle.clone()),
                    ScriptedDisplay::Node { tag, attributes, inner } => {
                        DisplayContent::Node(Box::new(StaticNode {
                            tag: tag.clone(),
                            attributes: attributes.clone(),
                            inner: inner.clone(),
                        }))
                    }
                },
            },
        }
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn init(&self) -> Result<(), EngineError> {
        let gate = self.init_gate.lock().take();
        if let Some(gate) = gate {
            gate.await
                .map_err(|_| EngineError::Init("init gate dropped".to_string()))?;
        }
        *self.initialized.lock() = true;
        Ok(())
    }

    fn subscribe(&self) -> Result<EventReceiver, EngineError> {
        self.rx.lock().take().ok_or(EngineError::AlreadySubscribed)
    }

    fn dispatch(&self, request: EngineRequest) -> Result<(), EngineError> {
        if !*self.initialized.lock() {
            return Err(EngineError::Dispatch("engine not initialized".to_string()));
        }
        match request {
            EngineRequest::Eval { code, correlation } => {
                match self.script.events_for(&code) {
                    Some(events) => {
                        for event in events {
                            self.emit(Self::realize(event, correlation));
                        }
                    }
                    None => self.emit(EngineEvent::Finished {
                        result: None,
                        correlation: Some(correlation),
                    }),
                }
            }
        }
        Ok(())
    }

    fn complete(&self, code: &str) -> Completion {
        let prefix_chars = code
            .chars()
            .rev()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .count();
        let total_chars = code.chars().count();
        let prefix: String = code.chars().skip(total_chars - prefix_chars).collect();

        let matches = self
            .script
            .vocabulary
            .iter()
            .filter(|word| word.starts_with(&prefix))
            .cloned()
            .collect();

        Completion {
            matches,
            cursor_start: total_chars - prefix_chars,
        }
    }
}

// ============================================================================
// ScriptedLoader
// ============================================================================

/// Loader producing a [`ScriptedEngine`].
pub struct ScriptedLoader {
    script: EngineScript,
    load_gate: Option<oneshot::Receiver<()>>,
    init_gate: Option<oneshot::Receiver<()>>,
    failure: Option<String>,
}

impl ScriptedLoader {
    pub fn new(script: EngineScript) -> Self {
        Self {
            script,
            load_gate: None,
            init_gate: None,
            failure: None,
        }
    }

    /// A loader whose load step fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(EngineScript::default())
        }
    }

    /// Hold the load step until `gate` fires.
    pub fn with_load_gate(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.load_gate = Some(gate);
        self
    }

    /// Hold the engine's init step until `gate` fires.
    pub fn with_init_gate(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.init_gate = Some(gate);
        self
    }
}

#[async_trait]
impl EngineLoader for ScriptedLoader {
    async fn load(self: Box<Self>) -> Result<Arc<dyn Engine>, EngineError> {
        let this = *self;
        if let Some(gate) = this.load_gate {
            gate.await
                .map_err(|_| EngineError::Load("load gate dropped".to_string()))?;
        }
        if let Some(message) = this.failure {
            return Err(EngineError::Load(message));
        }
        let mut engine = ScriptedEngine::new(this.script);
        if let Some(gate) = this.init_gate {
            engine = engine.with_init_gate(gate);
        }
        Ok(Arc::new(engine))
    }
}
