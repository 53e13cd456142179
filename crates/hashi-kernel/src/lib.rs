//! # hashi-kernel
//!
//! Bridges a request/reply notebook protocol onto an event-driven execution
//! engine.
//!
//! The engine knows nothing about requests. It takes `eval.request` events and
//! answers with `eval.output`, `eval.display`, and exactly one of
//! `eval.finished` / `eval.error` per evaluation. This crate:
//! - Waits for the engine to load and initialize before serving requests
//! - Turns each evaluation into an awaitable reply (pending FIFO, correlation ids)
//! - Forwards output and displays to IOPub, tagged with the request they belong to
//! - Parks live display objects on a value bus and hands out integer handles
//! - Wraps it all in a protocol session (status, execution counter, error replies)

pub mod binding;
pub mod bridge;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod kernelspec;
pub mod session;
pub mod value_bus;

pub use binding::{EventBinding, Routed};
pub use bridge::{BridgeError, EvalOutcome, ExecutionError, PendingExecution, PendingQueue};
pub use config::{ConfigError, DisplayConfig, HashiConfig};
pub use display::{DisplayConverter, DisplayError, DisplayKind};
pub use engine::{
    Completion, DisplayContent, Engine, EngineError, EngineEvent, EngineLoader, EngineRequest,
    EngineScript, EventReceiver, LiveNode, RenderNode, ScriptError, ScriptedDisplay, ScriptedEngine,
    ScriptedEvent, ScriptedLoader, StaticNode,
};
pub use error::KernelError;
pub use kernel::{KernelHandle, ReadyState, spawn_kernel, spawn_kernel_boxed};
pub use kernelspec::{HashiKernelFactory, KernelFactory, KernelSpecs, SpecError};
pub use session::{KernelSession, SessionError};
pub use value_bus::{Handle, ValueBus};
