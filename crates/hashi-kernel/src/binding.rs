//! Engine event binding.
//!
//! Turns each [`EngineEvent`] into exactly one of:
//!
//! - resolution of a pending execution (`eval.finished`, `eval.error`);
//! - a side-channel notification, parented to the execution in flight
//!   (`eval.output` → `stream`, `eval.display` → `display_data`);
//! - nothing, with a log line (unrecognized display kinds, terminal events
//!   no one is waiting for).

use hashi_types::{Bundle, DisplayData, Message, MsgType, SessionId, StreamContent};

use crate::bridge::{EvalOutcome, ExecutionError, PendingQueue};
use crate::display::DisplayConverter;
use crate::engine::EngineEvent;

/// What became of a routed event.
#[derive(Debug)]
pub enum Routed {
    /// Publish this on IOPub.
    Notify(Message),
    /// A pending execution was resolved.
    Resolved,
    /// Dropped; already logged.
    Dropped,
}

/// Routes engine events for one kernel.
#[derive(Debug, Clone)]
pub struct EventBinding {
    converter: DisplayConverter,
    /// Session used for notifications that arrive with nothing in flight.
    session: SessionId,
}

impl EventBinding {
    pub fn new(converter: DisplayConverter, session: SessionId) -> Self {
        Self { converter, session }
    }

    pub fn converter(&self) -> &DisplayConverter {
        &self.converter
    }

    /// Route one event against the open executions.
    pub fn route(&self, event: EngineEvent, pending: &mut PendingQueue) -> Routed {
        let subject = event.subject();
        match event {
            EngineEvent::Finished { result, correlation } => {
                let bundle = Bundle::with_data(result.unwrap_or_default());
                match pending.resolve(correlation, EvalOutcome::Finished(bundle)) {
                    Ok(()) => Routed::Resolved,
                    Err(e) => {
                        tracing::warn!(subject, "dropping terminal event: {e}");
                        Routed::Dropped
                    }
                }
            }

            EngineEvent::Error { error, correlation } => {
                let parent = correlation
                    .and_then(|c| pending.parent_of(c))
                    .or_else(|| pending.current_parent())
                    .cloned();
                let Some(parent) = parent else {
                    tracing::warn!(subject, ename = %error.ename, "dropping terminal event: no pending execution");
                    return Routed::Dropped;
                };
                let outcome = EvalOutcome::Error(ExecutionError { error, parent });
                match pending.resolve(correlation, outcome) {
                    Ok(()) => Routed::Resolved,
                    Err(e) => {
                        tracing::warn!(subject, "dropping terminal event: {e}");
                        Routed::Dropped
                    }
                }
            }

            EngineEvent::Output { stream, content } => {
                let content = StreamContent { name: stream, text: content };
                self.notify(MsgType::Stream, &content, pending)
            }

            EngineEvent::Display { display_type, content } => {
                match self.converter.convert(&display_type, content) {
                    Ok(data) => {
                        let content = DisplayData { data, metadata: Default::default() };
                        self.notify(MsgType::DisplayData, &content, pending)
                    }
                    Err(e) => {
                        tracing::warn!(subject, %display_type, "dropping display: {e}");
                        Routed::Dropped
                    }
                }
            }
        }
    }

    fn notify<T: serde::Serialize>(
        &self,
        msg_type: MsgType,
        content: &T,
        pending: &PendingQueue,
    ) -> Routed {
        match Message::from_content(msg_type, self.session.clone(), pending.current_parent(), content) {
            Ok(msg) => Routed::Notify(msg),
            Err(e) => {
                tracing::error!(%msg_type, "failed to encode notification: {e}");
                Routed::Dropped
            }
        }
    }
}
