//! Protocol session: one request message in, one reply message out.
//!
//! [`KernelSession`] is what a transport talks to. It wraps the
//! [`KernelHandle`] with the bookkeeping every kernel does around a request:
//! busy/idle status, the execution counter, `execute_input` and
//! `execute_result` on IOPub, and the error replies front-ends expect.

use hashi_types::{
    CommInfoRequest, CompleteRequest, ErrorContent, ErrorReply, ExecuteInput, ExecuteReply,
    ExecuteRequest, ExecutionState, Header, InspectRequest, IsCompleteRequest, Message, MsgType,
    StatusContent,
};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::KernelError;
use crate::kernel::KernelHandle;

/// Errors processing a request message.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unsupported message type: {0}")]
    Unsupported(MsgType),
    #[error("invalid message content: {0}")]
    Content(#[from] serde_json::Error),
}

struct SessionState {
    execution_count: u32,
}

/// Request/reply processing for one kernel. Requests are handled one at a
/// time, in arrival order.
pub struct KernelSession {
    kernel: KernelHandle,
    state: Mutex<SessionState>,
}

impl KernelSession {
    pub fn new(kernel: KernelHandle) -> Self {
        Self {
            kernel,
            state: Mutex::new(SessionState { execution_count: 0 }),
        }
    }

    pub fn kernel(&self) -> &KernelHandle {
        &self.kernel
    }

    /// Executions counted so far.
    pub async fn execution_count(&self) -> u32 {
        self.state.lock().await.execution_count
    }

    /// Shell reply for a request that [`handle`](Self::handle) rejected.
    ///
    /// Requests whose content fails to decode get a `status: error` reply
    /// parented to them. Unsupported message types get no reply.
    pub fn error_reply_for(
        request: &Message,
        err: &SessionError,
    ) -> Result<Option<Message>, SessionError> {
        let SessionError::Content(e) = err else {
            return Ok(None);
        };
        let Some(reply_type) = request.msg_type().reply_type() else {
            return Ok(None);
        };
        let content = ErrorReply::new(ErrorContent::new("ValueError", e.to_string()));
        Ok(Some(Message::child_of(&request.header, reply_type, &content)?))
    }

    /// Process one shell request and return its reply.
    pub async fn handle(&self, request: &Message) -> Result<Message, SessionError> {
        let msg_type = request.msg_type();
        let Some(reply_type) = msg_type.reply_type() else {
            return Err(SessionError::Unsupported(msg_type));
        };
        if msg_type == MsgType::InputRequest {
            // Kernel → front-end only; never arrives on shell.
            return Err(SessionError::Unsupported(msg_type));
        }

        let mut state = self.state.lock().await;
        let parent = &request.header;
        tracing::debug!(msg_id = %parent.msg_id, %msg_type, "handling request");

        self.publish_status(parent, ExecutionState::Busy)?;
        let reply = self.dispatch(&mut state, request, reply_type).await;
        self.publish_status(parent, ExecutionState::Idle)?;
        reply
    }

    async fn dispatch(
        &self,
        state: &mut SessionState,
        request: &Message,
        reply_type: MsgType,
    ) -> Result<Message, SessionError> {
        let parent = &request.header;
        match request.msg_type() {
            MsgType::KernelInfoRequest => {
                Ok(Message::child_of(parent, reply_type, &self.kernel.kernel_info())?)
            }

            MsgType::ExecuteRequest => {
                let content: ExecuteRequest = request.content_as()?;
                self.execute(state, parent, content).await
            }

            MsgType::CompleteRequest => {
                let content: CompleteRequest = request.content_as()?;
                match self.kernel.complete(&content).await {
                    Ok(reply) => Ok(Message::child_of(parent, reply_type, &reply)?),
                    Err(e) => error_reply(parent, reply_type, &e),
                }
            }

            MsgType::InspectRequest => {
                let content: InspectRequest = request.content_as()?;
                match self.kernel.inspect(&content).await {
                    Ok(reply) => Ok(Message::child_of(parent, reply_type, &reply)?),
                    Err(e) => error_reply(parent, reply_type, &e),
                }
            }

            MsgType::IsCompleteRequest => {
                let content: IsCompleteRequest = request.content_as()?;
                match self.kernel.is_complete(&content).await {
                    Ok(reply) => Ok(Message::child_of(parent, reply_type, &reply)?),
                    Err(e) => error_reply(parent, reply_type, &e),
                }
            }

            MsgType::CommInfoRequest => {
                let content: CommInfoRequest = request.content_as()?;
                match self.kernel.comm_info(&content).await {
                    Ok(reply) => Ok(Message::child_of(parent, reply_type, &reply)?),
                    Err(e) => error_reply(parent, reply_type, &e),
                }
            }

            other => Err(SessionError::Unsupported(other)),
        }
    }

    async fn execute(
        &self,
        state: &mut SessionState,
        parent: &Header,
        request: ExecuteRequest,
    ) -> Result<Message, SessionError> {
        let counted = request.store_history && !request.silent;
        if counted {
            state.execution_count += 1;
        }
        let execution_count = state.execution_count;

        if !request.silent {
            let input = ExecuteInput {
                code: request.code.clone(),
                execution_count,
            };
            self.publish(parent, MsgType::ExecuteInput, &input)?;
        }

        match self.kernel.execute(&request, parent.clone(), execution_count).await {
            Ok(result) => {
                if !request.silent && !result.data.is_empty() {
                    self.publish(parent, MsgType::ExecuteResult, &result)?;
                }
                Ok(Message::child_of(
                    parent,
                    MsgType::ExecuteReply,
                    &ExecuteReply::ok(execution_count),
                )?)
            }
            Err(e) => {
                let error = error_content(&e);
                tracing::debug!(msg_id = %parent.msg_id, ename = %error.ename, "execution failed");
                self.publish(parent, MsgType::Error, &error)?;
                Ok(Message::child_of(
                    parent,
                    MsgType::ExecuteReply,
                    &ExecuteReply::error(execution_count, error),
                )?)
            }
        }
    }

    fn publish_status(&self, parent: &Header, state: ExecutionState) -> Result<(), SessionError> {
        self.publish(parent, MsgType::Status, &StatusContent { execution_state: state })
    }

    fn publish<T: Serialize>(
        &self,
        parent: &Header,
        msg_type: MsgType,
        content: &T,
    ) -> Result<(), SessionError> {
        self.kernel.publish(Message::child_of(parent, msg_type, content)?);
        Ok(())
    }
}

/// Error content front-ends see for a failed request.
fn error_content(err: &KernelError) -> ErrorContent {
    match err {
        KernelError::Execution(e) => e.error.clone(),
        other => ErrorContent::new(other.ename(), other.to_string()),
    }
}

fn error_reply(
    parent: &Header,
    reply_type: MsgType,
    err: &KernelError,
) -> Result<Message, SessionError> {
    Ok(Message::child_of(parent, reply_type, &ErrorReply::new(error_content(err)))?)
}
