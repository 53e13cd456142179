//! Request/reply bridging: pending executions keyed by correlation id.
//!
//! Every evaluation dispatched to the engine opens a [`PendingExecution`] in a
//! FIFO. The engine answers each evaluation with exactly one terminal event;
//! that event resolves the record it names (engines that echo the
//! correlation id) or the oldest open record (engines that don't). Interim
//! events are attributed to the oldest open record, since the engine runs
//! evaluations serially.
//!
//! ```text
//!   open(A) open(B)          terminal(A)          terminal(B)
//!   ┌───┬───┐                ┌───┐
//!   │ A │ B │ ─────────────▶ │ B │ ───────────▶ (empty)
//!   └───┴───┘                └───┘
//!    oldest ▲ interim events attributed here
//! ```
//!
//! An echoed id that is not the oldest is logged as out-of-order and still
//! resolves the right record; an id nobody is waiting for is an error the
//! caller logs and drops.

use std::collections::VecDeque;
use std::time::Instant;

use hashi_types::{Bundle, CorrelationId, ErrorContent, Header};
use tokio::sync::oneshot;

use crate::error::KernelError;

/// An engine-reported execution error, with the request it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionError {
    pub error: ErrorContent,
    /// Header of the request that raised.
    pub parent: Header,
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error.ename, self.error.evalue)
    }
}

/// How one evaluation concluded.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalOutcome {
    Finished(Bundle),
    Error(ExecutionError),
}

/// Reply slot for one evaluation.
pub type EvalReply = oneshot::Sender<Result<EvalOutcome, KernelError>>;

/// One in-flight evaluation.
#[derive(Debug)]
pub struct PendingExecution {
    pub correlation: CorrelationId,
    /// Correlation header: the request message's header.
    pub parent: Header,
    pub opened_at: Instant,
    reply: EvalReply,
}

impl PendingExecution {
    fn resolve(self, outcome: Result<EvalOutcome, KernelError>) {
        tracing::debug!(
            correlation = %self.correlation,
            msg_id = %self.parent.msg_id,
            elapsed_ms = self.opened_at.elapsed().as_millis() as u64,
            "execution resolved"
        );
        // Caller gone (dropped its future); the outcome has nowhere to go.
        let _ = self.reply.send(outcome);
    }
}

/// Bookkeeping failures when matching terminal events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("terminal event with no pending execution")]
    NoPending,
    #[error("terminal event for unknown correlation {0}")]
    Unmatched(CorrelationId),
}

/// FIFO of open executions.
#[derive(Debug, Default)]
pub struct PendingQueue {
    queue: VecDeque<PendingExecution>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a record for a new evaluation.
    pub fn open(&mut self, parent: Header, reply: EvalReply) -> CorrelationId {
        let correlation = CorrelationId::new();
        self.queue.push_back(PendingExecution {
            correlation,
            parent,
            opened_at: Instant::now(),
            reply,
        });
        correlation
    }

    /// The oldest open record: the one interim events belong to.
    pub fn current(&self) -> Option<&PendingExecution> {
        self.queue.front()
    }

    /// Header interim events are tagged with.
    pub fn current_parent(&self) -> Option<&Header> {
        self.current().map(|p| &p.parent)
    }

    /// Look up a record's parent header by correlation.
    pub fn parent_of(&self, correlation: CorrelationId) -> Option<&Header> {
        self.queue
            .iter()
            .find(|p| p.correlation == correlation)
            .map(|p| &p.parent)
    }

    /// Remove the record a terminal event concludes.
    pub fn take(
        &mut self,
        correlation: Option<CorrelationId>,
    ) -> Result<PendingExecution, BridgeError> {
        let Some(correlation) = correlation else {
            return self.queue.pop_front().ok_or(BridgeError::NoPending);
        };

        let position = self
            .queue
            .iter()
            .position(|p| p.correlation == correlation)
            .ok_or(if self.queue.is_empty() {
                BridgeError::NoPending
            } else {
                BridgeError::Unmatched(correlation)
            })?;

        if position > 0 {
            tracing::warn!(
                %correlation,
                skipped = position,
                "out-of-order terminal event; resolving matching execution"
            );
        }
        // position is in range: it came from iterating the queue.
        self.queue.remove(position).ok_or(BridgeError::Unmatched(correlation))
    }

    /// Resolve the record a terminal event concludes.
    pub fn resolve(
        &mut self,
        correlation: Option<CorrelationId>,
        outcome: EvalOutcome,
    ) -> Result<(), BridgeError> {
        let pending = self.take(correlation)?;
        pending.resolve(Ok(outcome));
        Ok(())
    }

    /// Fail a specific record (e.g. the engine rejected its dispatch).
    pub fn fail(&mut self, correlation: CorrelationId, error: KernelError) -> Result<(), BridgeError> {
        let pending = self.take(Some(correlation))?;
        pending.resolve(Err(error));
        Ok(())
    }

    /// Fail every open record, oldest first.
    pub fn fail_all(&mut self, error: KernelError) {
        while let Some(pending) = self.queue.pop_front() {
            pending.resolve(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
