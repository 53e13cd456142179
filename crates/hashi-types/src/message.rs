//! The protocol message envelope.
//!
//! Every request, reply, and side-channel notification travels as a
//! [`Message`]: a header naming the message, an optional parent header naming
//! the request it answers (the correlation header), free-form metadata, and a
//! JSON content body whose shape depends on [`MsgType`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::{MsgId, SessionId};

/// Protocol version spoken by this kernel.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Username stamped on kernel-originated headers.
pub const KERNEL_USERNAME: &str = "kernel";

/// Message type tag (`header.msg_type`).
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MsgType {
    // Shell requests and replies
    KernelInfoRequest,
    KernelInfoReply,
    ExecuteRequest,
    ExecuteReply,
    CompleteRequest,
    CompleteReply,
    InspectRequest,
    InspectReply,
    IsCompleteRequest,
    IsCompleteReply,
    CommInfoRequest,
    CommInfoReply,

    // Stdin
    InputRequest,
    InputReply,

    // IOPub
    Status,
    ExecuteInput,
    ExecuteResult,
    DisplayData,
    Stream,
    Error,
}

impl MsgType {
    /// The reply type for a shell request, if this is one.
    pub fn reply_type(self) -> Option<MsgType> {
        match self {
            Self::KernelInfoRequest => Some(Self::KernelInfoReply),
            Self::ExecuteRequest => Some(Self::ExecuteReply),
            Self::CompleteRequest => Some(Self::CompleteReply),
            Self::InspectRequest => Some(Self::InspectReply),
            Self::IsCompleteRequest => Some(Self::IsCompleteReply),
            Self::CommInfoRequest => Some(Self::CommInfoReply),
            Self::InputRequest => Some(Self::InputReply),
            _ => None,
        }
    }
}

/// Message header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub msg_id: MsgId,
    pub session: SessionId,
    pub username: String,
    pub msg_type: MsgType,
    pub version: String,
}

impl Header {
    /// A fresh kernel-originated header.
    pub fn new(msg_type: MsgType, session: SessionId) -> Self {
        Self {
            msg_id: MsgId::new(),
            session,
            username: KERNEL_USERNAME.to_string(),
            msg_type,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// A complete protocol message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: Header,
    /// Header of the request this message belongs to. Serialized as `{}`
    /// when absent, as front-ends expect.
    #[serde(
        default,
        serialize_with = "serialize_parent",
        deserialize_with = "deserialize_parent"
    )]
    pub parent_header: Option<Header>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl Message {
    /// Build a message with the given content, optionally parented.
    ///
    /// Parented messages inherit the parent's session so front-ends route
    /// them to the right client.
    pub fn from_content<T: Serialize>(
        msg_type: MsgType,
        session: SessionId,
        parent: Option<&Header>,
        content: &T,
    ) -> Result<Self, serde_json::Error> {
        let session = parent.map(|p| p.session.clone()).unwrap_or(session);
        Ok(Self {
            header: Header::new(msg_type, session),
            parent_header: parent.cloned(),
            metadata: serde_json::Map::new(),
            content: serde_json::to_value(content)?,
        })
    }

    /// Build a message parented to `parent`, in the parent's session.
    pub fn child_of<T: Serialize>(
        parent: &Header,
        msg_type: MsgType,
        content: &T,
    ) -> Result<Self, serde_json::Error> {
        Self::from_content(msg_type, parent.session.clone(), Some(parent), content)
    }

    /// The message type.
    pub fn msg_type(&self) -> MsgType {
        self.header.msg_type
    }

    /// Decode the content body into a typed shape.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.content)
    }
}

fn serialize_parent<S: Serializer>(parent: &Option<Header>, s: S) -> Result<S::Ok, S::Error> {
    match parent {
        Some(header) => header.serialize(s),
        None => serde_json::Map::new().serialize(s),
    }
}

fn deserialize_parent<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Header>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    match &value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) if map.is_empty() => Ok(None),
        _ => Header::deserialize(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
