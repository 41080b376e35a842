//! HTTP + server-sent-events connector for the assistant backend.
//!
//! Outbound calls go through [`transport::Transport`]; inbound messages come
//! from a single long-lived `GET /sse` connection kept up by
//! [`stream::supervise`].

pub mod stream;
pub mod transport;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AssistantConfig;
use crate::hub::{
    Connector, GroupMember, Member, MessageHandler, MsgKind, Payload, TransportError,
};
use stream::FrameReader;
use transport::Transport;

pub struct SseConnector {
    transport: Transport,
    reader: FrameReader,
    me: Member,
    alive: AtomicBool,
    retry_delay: Duration,
}

impl SseConnector {
    /// Build the transport and resolve the bot's own identity.
    pub async fn connect(config: &AssistantConfig) -> Result<Self> {
        let transport = Transport::new(
            config.base_url(),
            config.credentials(),
            config.request_timeout(),
        )?;

        let me = transport.fetch_self().await.with_context(|| {
            format!(
                "Failed to resolve bot identity from {}",
                transport.base_url()
            )
        })?;

        info!(
            "Assistant at {} identifies the bot as {} ({})",
            transport.base_url(),
            me.nick_name,
            me.id
        );

        Ok(Self::with_identity(transport, me, config.retry_delay()))
    }

    pub fn with_identity(transport: Transport, me: Member, retry_delay: Duration) -> Self {
        Self {
            reader: FrameReader::new(transport.clone()),
            transport,
            me,
            alive: AtomicBool::new(false),
            retry_delay,
        }
    }
}

#[async_trait]
impl Connector for SseConnector {
    fn alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    fn self_identity(&self) -> &Member {
        &self.me
    }

    async fn group_members(&self, gid: &str) -> Option<Vec<GroupMember>> {
        self.transport.group_members(gid).await
    }

    async fn group_member(&self, gid: &str, uid: &str) -> Option<GroupMember> {
        self.transport.group_member(gid, uid).await
    }

    async fn listen(&self, cancel: CancellationToken, handler: &dyn MessageHandler) {
        stream::supervise(
            &self.reader,
            &self.alive,
            self.retry_delay,
            &cancel,
            handler,
        )
        .await
    }

    async fn send(
        &self,
        kind: MsgKind,
        gid: &str,
        payload: Payload<'_>,
        filename: &str,
    ) -> Result<i64, TransportError> {
        self.transport.send(kind, gid, payload, filename).await
    }
}
