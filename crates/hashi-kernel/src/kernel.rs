//! The protocol adapter: an actor that owns the engine, and a handle to it.
//!
//! The engine speaks events; front-ends speak request/reply. The actor sits
//! between them, owning the engine, the pending-execution FIFO, and the event
//! binding. Callers hold a cheap, cloneable [`KernelHandle`].
//!
//! ```text
//!   KernelHandle (Clone)        mpsc        KernelActor (tokio task)
//!   ┌────────────────────┐  ──────────▶  ┌──────────────────────────────┐
//!   │ .execute()         │               │ Engine + PendingQueue        │
//!   │ .complete()        │  ◀──────────  │ select! { command, event }   │
//!   │ .ready()           │    oneshot    │                              │
//!   └────────────────────┘               └──────────────┬───────────────┘
//!            ▲                                          │ stream / display_data
//!            └──────────── broadcast (IOPub) ◀──────────┘
//! ```
//!
//! Startup is two steps, load then init; [`KernelHandle::ready`] resolves once
//! both are done. Commands sent earlier wait in the channel and run after.
//! There is no timeout: an engine that never emits a terminal event leaves
//! its caller waiting.

use std::sync::Arc;

use hashi_types::{
    CommInfoReply, CommInfoRequest, CompleteReply, CompleteRequest, ExecuteRequest,
    ExecuteResult, Header, InputRequest, InspectReply, InspectRequest, IsCompleteReply,
    IsCompleteRequest, KernelInfo, Message, MsgType, ReplyStatus, SessionId,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::Instrument;

use crate::binding::{EventBinding, Routed};
use crate::bridge::{EvalOutcome, EvalReply, PendingQueue};
use crate::config::HashiConfig;
use crate::display::DisplayConverter;
use crate::engine::{
    Completion, Engine, EngineError, EngineEvent, EngineLoader, EngineRequest, EventReceiver,
    LiveNode,
};
use crate::error::KernelError;
use crate::value_bus::ValueBus;

// ============================================================================
// Readiness
// ============================================================================

/// Startup state, observed through [`KernelHandle::ready`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Ready,
    Failed(String),
}

// ============================================================================
// Commands (internal)
// ============================================================================

/// Internal command sent from KernelHandle → KernelActor via mpsc.
enum KernelCommand {
    Execute {
        code: String,
        parent: Header,
        reply: EvalReply,
    },
    Complete {
        code: String,
        reply: oneshot::Sender<Result<Completion, KernelError>>,
    },
    Shutdown,
}

impl KernelCommand {
    /// Answer the command with `error` instead of running it.
    fn refuse(self, error: KernelError) {
        match self {
            Self::Execute { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Self::Complete { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Self::Shutdown => {}
        }
    }
}

// ============================================================================
// KernelHandle (public API)
// ============================================================================

/// Cloneable handle to a running kernel.
#[derive(Clone)]
pub struct KernelHandle {
    tx: mpsc::UnboundedSender<KernelCommand>,
    info: Arc<KernelInfo>,
    ready: watch::Receiver<ReadyState>,
    iopub: broadcast::Sender<Message>,
    bus: Arc<ValueBus<LiveNode>>,
    session: SessionId,
}

impl std::fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHandle")
            .field("session", &self.session)
            .field("ready", &*self.ready.borrow())
            .field("iopub_subscribers", &self.iopub.receiver_count())
            .finish()
    }
}

impl KernelHandle {
    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Wait until the engine has loaded and initialized.
    pub async fn ready(&self) -> Result<(), KernelError> {
        let mut rx = self.ready.clone();
        let state = rx
            .wait_for(|s| *s != ReadyState::Loading)
            .await
            .map_err(|_| KernelError::Shutdown)?
            .clone();
        match state {
            ReadyState::Failed(msg) => Err(KernelError::LoadFailed(msg)),
            _ => Ok(()),
        }
    }

    /// Whether startup has completed successfully.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow() == ReadyState::Ready
    }

    /// Stop the actor. Open executions fail with [`KernelError::Shutdown`].
    pub fn shutdown(&self) {
        let _ = self.tx.send(KernelCommand::Shutdown);
    }

    // ── Requests ─────────────────────────────────────────────────────────

    /// Static language/runtime metadata.
    pub fn kernel_info(&self) -> KernelInfo {
        (*self.info).clone()
    }

    /// Evaluate code and wait for the engine's terminal event.
    pub async fn evaluate(&self, code: &str, parent: Header) -> Result<EvalOutcome, KernelError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(KernelCommand::Execute {
                code: code.to_string(),
                parent,
                reply,
            })
            .map_err(|_| KernelError::Shutdown)?;
        rx.await.map_err(|_| KernelError::Shutdown)?
    }

    /// Handle an `execute_request`.
    ///
    /// `parent` is the request's header; side-channel output is parented to
    /// it. `execution_count` is owned by the protocol layer.
    pub async fn execute(
        &self,
        request: &ExecuteRequest,
        parent: Header,
        execution_count: u32,
    ) -> Result<ExecuteResult, KernelError> {
        match self.evaluate(&request.code, parent).await? {
            EvalOutcome::Finished(bundle) => Ok(ExecuteResult {
                execution_count,
                data: bundle.data,
                metadata: bundle.metadata,
            }),
            EvalOutcome::Error(e) => Err(KernelError::Execution(e)),
        }
    }

    /// Handle a `complete_request`. The engine sees only the code before the cursor.
    pub async fn complete(&self, request: &CompleteRequest) -> Result<CompleteReply, KernelError> {
        let code: String = request.code.chars().take(request.cursor_pos).collect();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(KernelCommand::Complete { code, reply })
            .map_err(|_| KernelError::Shutdown)?;
        let completion = rx.await.map_err(|_| KernelError::Shutdown)??;

        Ok(CompleteReply {
            matches: completion.matches,
            cursor_start: completion.cursor_start,
            cursor_end: request.cursor_pos,
            metadata: Default::default(),
            status: ReplyStatus::Ok,
        })
    }

    /// `inspect_request` is not supported.
    pub async fn inspect(&self, _request: &InspectRequest) -> Result<InspectReply, KernelError> {
        Err(KernelError::NotImplemented(MsgType::InspectRequest))
    }

    /// `is_complete_request` is not supported.
    pub async fn is_complete(
        &self,
        _request: &IsCompleteRequest,
    ) -> Result<IsCompleteReply, KernelError> {
        Err(KernelError::NotImplemented(MsgType::IsCompleteRequest))
    }

    /// `comm_info_request` is not supported.
    pub async fn comm_info(&self, _request: &CommInfoRequest) -> Result<CommInfoReply, KernelError> {
        Err(KernelError::NotImplemented(MsgType::CommInfoRequest))
    }

    /// Reading stdin from the front-end is not supported.
    pub async fn input(&self, _request: &InputRequest) -> Result<(), KernelError> {
        Err(KernelError::NotImplemented(MsgType::InputRequest))
    }

    // ── Side channel ─────────────────────────────────────────────────────

    /// Subscribe to IOPub notifications (stream, display_data, and anything
    /// published by the protocol layer).
    pub fn subscribe_iopub(&self) -> broadcast::Receiver<Message> {
        self.iopub.subscribe()
    }

    /// Publish a message on IOPub. Returns the number of subscribers reached.
    pub fn publish(&self, msg: Message) -> usize {
        self.iopub.send(msg).unwrap_or(0)
    }

    /// The bus live display objects are parked on; the renderer pops from it.
    pub fn value_bus(&self) -> Arc<ValueBus<LiveNode>> {
        self.bus.clone()
    }

    /// This kernel's session id.
    pub fn session(&self) -> &SessionId {
        &self.session
    }
}

// ============================================================================
// KernelActor (internal, runs in a tokio task)
// ============================================================================

struct KernelActor {
    binding: EventBinding,
    pending: PendingQueue,
    iopub: broadcast::Sender<Message>,
    ready: watch::Sender<ReadyState>,
}

impl KernelActor {
    /// Load, initialize, subscribe.
    async fn start(
        loader: Box<dyn EngineLoader>,
    ) -> Result<(Arc<dyn Engine>, EventReceiver), EngineError> {
        let engine = loader.load().await?;
        tracing::debug!(engine = engine.name(), "engine loaded");
        engine.init().await?;
        let events = engine.subscribe()?;
        Ok((engine, events))
    }

    async fn run(
        mut self,
        loader: Box<dyn EngineLoader>,
        mut rx: mpsc::UnboundedReceiver<KernelCommand>,
    ) {
        let (engine, mut events) = match Self::start(loader).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!("kernel failed to start: {e}");
                let message = e.to_string();
                self.ready.send_replace(ReadyState::Failed(message.clone()));
                while let Some(cmd) = rx.recv().await {
                    if matches!(cmd, KernelCommand::Shutdown) {
                        break;
                    }
                    cmd.refuse(KernelError::LoadFailed(message.clone()));
                }
                return;
            }
        };

        self.ready.send_replace(ReadyState::Ready);
        tracing::info!(engine = engine.name(), "kernel ready");

        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        tracing::warn!("engine event stream closed");
                        break;
                    }
                },

                cmd = rx.recv() => match cmd {
                    Some(KernelCommand::Shutdown) | None => break,
                    Some(cmd) => self.on_command(engine.as_ref(), cmd),
                },
            }
        }

        if !self.pending.is_empty() {
            tracing::warn!(open = self.pending.len(), "kernel stopping with executions in flight");
        }
        self.pending.fail_all(KernelError::Shutdown);
        tracing::debug!("kernel actor stopped");
    }

    fn on_command(&mut self, engine: &dyn Engine, cmd: KernelCommand) {
        match cmd {
            KernelCommand::Execute { code, parent, reply } => {
                let msg_id = parent.msg_id.clone();
                let correlation = self.pending.open(parent, reply);
                tracing::debug!(%correlation, %msg_id, "dispatching eval.request");
                if let Err(e) = engine.dispatch(EngineRequest::Eval { code, correlation }) {
                    tracing::warn!(%correlation, "dispatch failed: {e}");
                    let _ = self.pending.fail(correlation, e.into());
                }
            }
            KernelCommand::Complete { code, reply } => {
                let _ = reply.send(Ok(engine.complete(&code)));
            }
            KernelCommand::Shutdown => {}
        }
    }

    fn on_event(&mut self, event: EngineEvent) {
        tracing::trace!(subject = event.subject(), "engine event");
        if let Routed::Notify(msg) = self.binding.route(event, &mut self.pending) {
            // No subscribers is fine: nobody is watching output.
            let _ = self.iopub.send(msg);
        }
    }
}

// ============================================================================
// Public spawn function
// ============================================================================

/// Spawn a kernel actor on the current tokio runtime.
///
/// Returns immediately; use [`KernelHandle::ready`] to wait for the engine.
pub fn spawn_kernel(loader: impl EngineLoader + 'static, config: &HashiConfig) -> KernelHandle {
    spawn_kernel_boxed(Box::new(loader), config)
}

/// [`spawn_kernel`] for an already-boxed loader.
pub fn spawn_kernel_boxed(loader: Box<dyn EngineLoader>, config: &HashiConfig) -> KernelHandle {
    let session = SessionId::new();
    let bus = Arc::new(ValueBus::new());
    let (iopub, _) = broadcast::channel(config.iopub_capacity);
    let (ready_tx, ready_rx) = watch::channel(ReadyState::Loading);
    let (tx, rx) = mpsc::unbounded_channel();

    let converter = DisplayConverter::new(config.display.clone(), bus.clone());
    let actor = KernelActor {
        binding: EventBinding::new(converter, session.clone()),
        pending: PendingQueue::new(),
        iopub: iopub.clone(),
        ready: ready_tx,
    };

    let span = tracing::info_span!("kernel", session = %session.short());
    tokio::spawn(actor.run(loader, rx).instrument(span));

    KernelHandle {
        tx,
        info: Arc::new(config.kernel_info.clone()),
        ready: ready_rx,
        iopub,
        bus,
        session,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineScript, ScriptedLoader};

    fn header() -> Header {
        Header::new(MsgType::ExecuteRequest, SessionId::new())
    }

    #[tokio::test]
    async fn test_ready_then_execute() {
        let kernel = spawn_kernel(ScriptedLoader::new(EngineScript::default()), &HashiConfig::default());
        kernel.ready().await.unwrap();
        assert!(kernel.is_ready());

        let result = kernel.execute(&ExecuteRequest::new("pass"), header(), 1).await.unwrap();
        assert_eq!(result.execution_count, 1);
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_fails_commands() {
        let kernel = spawn_kernel(ScriptedLoader::failing("missing runtime"), &HashiConfig::default());
        let err = kernel.ready().await.unwrap_err();
        assert!(matches!(err, KernelError::LoadFailed(ref m) if m.contains("missing runtime")));
        assert!(!kernel.is_ready());

        let err = kernel.execute(&ExecuteRequest::new("1"), header(), 1).await.unwrap_err();
        assert!(matches!(err, KernelError::LoadFailed(_)));
    }

    #[tokio::test]
    async fn test_shutdown() {
        let kernel = spawn_kernel(ScriptedLoader::new(EngineScript::default()), &HashiConfig::default());
        kernel.ready().await.unwrap();
        kernel.shutdown();

        let err = kernel.execute(&ExecuteRequest::new("1"), header(), 1).await.unwrap_err();
        assert!(matches!(err, KernelError::Shutdown));
    }

    #[tokio::test]
    async fn test_unimplemented_requests() {
        let kernel = spawn_kernel(ScriptedLoader::new(EngineScript::default()), &HashiConfig::default());
        let inspect = InspectRequest { code: "x".into(), cursor_pos: 1, detail_level: 0 };
        assert!(matches!(
            kernel.inspect(&inspect).await,
            Err(KernelError::NotImplemented(MsgType::InspectRequest))
        ));
        assert!(matches!(
            kernel.is_complete(&IsCompleteRequest { code: "x".into() }).await,
            Err(KernelError::NotImplemented(MsgType::IsCompleteRequest))
        ));
        assert!(matches!(
            kernel.comm_info(&CommInfoRequest::default()).await,
            Err(KernelError::NotImplemented(MsgType::CommInfoRequest))
        ));
        let input = InputRequest { prompt: "name? ".into(), password: false };
        assert!(matches!(
            kernel.input(&input).await,
            Err(KernelError::NotImplemented(MsgType::InputRequest))
        ));
    }
}
