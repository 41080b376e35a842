pub mod contact;
pub mod error;
pub mod message;
pub mod sse;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use std::borrow::Cow;
use tokio_util::sync::CancellationToken;

pub use contact::{GroupMember, Member};
pub use error::TransportError;
pub use message::Message;

/// Marks an inline payload so the backend can tell it apart from a URL
pub const INLINE_MARKER: &str = "BASE64:";

/// Anything that consumes inbound messages: the dispatcher, a router, a plugin chain.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Returns true when the message was claimed.
    async fn handle(&self, message: &Message) -> bool;
}

/// Outbound message kind, as numbered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgKind {
    Text = 1,
    Image = 2,
    Video = 3,
    File = 4,
}

impl MsgKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// What goes into the `body` field of a send request
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Text(&'a str),
    Url(&'a str),
    Bytes(&'a [u8]),
}

impl Payload<'_> {
    pub fn encode(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(body) | Payload::Url(body) => Cow::Borrowed(*body),
            Payload::Bytes(data) => {
                Cow::Owned(format!("{}{}", INLINE_MARKER, STANDARD_NO_PAD.encode(data)))
            }
        }
    }
}

/// The capability set the rest of the bridge programs against.
///
/// Roster lookups are best-effort: `None` means "not found" or "failed",
/// the cause is logged by the implementation. Sends report every failure.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Whether the event stream is currently connected.
    fn alive(&self) -> bool;

    /// The bot's own identity, resolved once at construction.
    fn self_identity(&self) -> &Member;

    async fn group_members(&self, gid: &str) -> Option<Vec<GroupMember>>;

    async fn group_member(&self, gid: &str, uid: &str) -> Option<GroupMember>;

    /// Feed every inbound message to `handler` until `cancel` fires,
    /// reconnecting as needed.
    async fn listen(&self, cancel: CancellationToken, handler: &dyn MessageHandler);

    /// Send one message to a group, returning the backend's send id.
    async fn send(
        &self,
        kind: MsgKind,
        gid: &str,
        payload: Payload<'_>,
        filename: &str,
    ) -> Result<i64, TransportError>;

    async fn send_text(&self, gid: &str, text: &str) -> Result<i64, TransportError> {
        self.send(MsgKind::Text, gid, Payload::Text(text), "").await
    }

    async fn send_image_by_url(
        &self,
        gid: &str,
        url: &str,
        filename: &str,
    ) -> Result<i64, TransportError> {
        self.send(MsgKind::Image, gid, Payload::Url(url), filename).await
    }

    async fn send_image_by_bytes(
        &self,
        gid: &str,
        data: &[u8],
        filename: &str,
    ) -> Result<i64, TransportError> {
        self.send(MsgKind::Image, gid, Payload::Bytes(data), filename)
            .await
    }

    async fn send_video_by_url(
        &self,
        gid: &str,
        url: &str,
        filename: &str,
    ) -> Result<i64, TransportError> {
        self.send(MsgKind::Video, gid, Payload::Url(url), filename).await
    }

    async fn send_video_by_bytes(
        &self,
        gid: &str,
        data: &[u8],
        filename: &str,
    ) -> Result<i64, TransportError> {
        self.send(MsgKind::Video, gid, Payload::Bytes(data), filename)
            .await
    }

    async fn send_file_by_url(
        &self,
        gid: &str,
        url: &str,
        filename: &str,
    ) -> Result<i64, TransportError> {
        self.send(MsgKind::File, gid, Payload::Url(url), filename).await
    }

    async fn send_file_by_bytes(
        &self,
        gid: &str,
        data: &[u8],
        filename: &str,
    ) -> Result<i64, TransportError> {
        self.send(MsgKind::File, gid, Payload::Bytes(data), filename)
            .await
    }
}
