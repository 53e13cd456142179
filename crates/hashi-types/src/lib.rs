//! Shared protocol and metadata types for hashi.
//!
//! The wire vocabulary the kernel and host share: typed ids, the message
//! envelope, content shapes for each message type, and kernel metadata.
//! Leaf crate; nothing else from hashi is depended on here.
//!
//! # Key Types
//!
//! |--------------------|-----------------------------------------------|
//! | Type               | Purpose                                       |
//! |--------------------|-----------------------------------------------|
//! | [`Message`]        | Envelope: header, parent header, content      |
//! | [`Header`]         | Message identity (msg_id, session, msg_type)  |
//! | [`MsgType`]        | Request / reply / IOPub tag                   |
//! | [`MimeBundle`]     | MIME-keyed display data                       |
//! | [`Bundle`]         | Data + metadata produced by one execution     |
//! | [`KernelInfo`]     | Static language/runtime metadata              |
//! | [`KernelSpec`]     | What the host registers for front-ends        |
//! | [`CorrelationId`]  | Key of one in-flight execution                |
//! |--------------------|-----------------------------------------------|

pub mod content;
pub mod ids;
pub mod kernel;
pub mod message;

// Re-export primary types at crate root for convenience.
pub use content::{
    Bundle, CommInfoReply, CommInfoRequest, CompleteReply, CompleteRequest, DisplayData,
    ErrorContent, ErrorReply, ExecuteInput, ExecuteReply, ExecuteRequest, ExecuteResult,
    ExecutionState, InputRequest, InspectReply, InspectRequest, IsCompleteReply,
    IsCompleteRequest, Metadata, MimeBundle, ReplyStatus, StatusContent, StreamContent,
    StreamName,
};
pub use ids::{CorrelationId, MsgId, SessionId};
pub use kernel::{CodemirrorMode, HelpLink, InterruptMode, KernelInfo, KernelSpec, LanguageInfo};
pub use message::{Header, KERNEL_USERNAME, Message, MsgType, PROTOCOL_VERSION};
