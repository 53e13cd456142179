//! Errors surfaced by the kernel adapter.

use hashi_types::MsgType;

use crate::bridge::ExecutionError;
use crate::engine::EngineError;

/// Errors from [`KernelHandle`](crate::KernelHandle) operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KernelError {
    /// The operation is deliberately not supported by this kernel.
    #[error("{0} is not implemented")]
    NotImplemented(MsgType),
    /// The engine ran the code and the code raised.
    #[error("execution failed: {0}")]
    Execution(ExecutionError),
    /// The engine never became ready.
    #[error("kernel failed to start: {0}")]
    LoadFailed(String),
    /// The engine refused a request.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("kernel shut down")]
    Shutdown,
}

impl KernelError {
    /// Exception name reported to front-ends for this error.
    pub fn ename(&self) -> &str {
        match self {
            Self::NotImplemented(_) => "NotImplementedError",
            Self::Execution(e) => &e.error.ename,
            Self::LoadFailed(_) | Self::Engine(_) | Self::Shutdown => "KernelError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_message() {
        let err = KernelError::NotImplemented(MsgType::InspectRequest);
        assert_eq!(err.to_string(), "inspect_request is not implemented");
        assert_eq!(err.ename(), "NotImplementedError");
    }

    #[test]
    fn test_engine_error_converts() {
        let err: KernelError = EngineError::Dispatch("busy".into()).into();
        assert_eq!(err.to_string(), "engine error: engine rejected request: busy");
    }
}
