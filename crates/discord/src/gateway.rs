use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use rolecall_core::{ChannelId, PlatformError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    embeds::OutgoingMessage,
    events::{default_dispatcher, EventContext, EventDispatcher, GatewayEnvelope, HandlerResult},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway failed to connect: {0}")]
    Connect(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let delay_ms = self.base_delay_ms.saturating_mul(1_u64 << exponent).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` once the stream has closed cleanly.
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
    fn is_noop(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Delivers handler replies back to the channel they came from.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn post(&self, channel_id: ChannelId, message: &OutgoingMessage)
        -> Result<(), PlatformError>;
}

#[derive(Default)]
pub struct NoopReplySink;

#[async_trait]
impl ReplySink for NoopReplySink {
    async fn post(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        debug!(
            event_name = "egress.discord.reply_dropped",
            channel_id = %channel_id,
            text = %message.plain_text(),
            "no reply sink configured"
        );
        Ok(())
    }
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: EventDispatcher,
    replies: Arc<dyn ReplySink>,
    reconnect_policy: ReconnectPolicy,
}

impl Default for GatewayRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopGatewayTransport),
            dispatcher: default_dispatcher(),
            replies: Arc::new(NoopReplySink),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        replies: Arc<dyn ReplySink>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, replies, reconnect_policy }
    }

    pub fn is_noop_transport(&self) -> bool {
        self.transport.is_noop()
    }

    /// Pumps the gateway until the stream closes or retries run out. Neither
    /// transport nor handler failures end the process.
    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        event_name = "ingress.discord.transport_failed",
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening gateway connection");
        self.transport.connect().await?;
        info!(attempt, "gateway connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "gateway stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let context = EventContext { correlation_id: envelope.correlation_id() };

            debug!(
                event_name = "ingress.discord.envelope_received",
                correlation_id = %context.correlation_id,
                event_type = ?envelope.event.event_type(),
                "received gateway envelope"
            );

            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(reply)) => {
                    if let Err(error) = self.replies.post(reply.channel_id, &reply.message).await {
                        warn!(
                            event_name = "egress.discord.reply_failed",
                            correlation_id = %context.correlation_id,
                            channel_id = %reply.channel_id,
                            error = %error,
                            "failed to post command reply"
                        );
                    }
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => warn!(
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "event dispatch failed; continuing gateway loop"
                ),
            }
        }
    }
}
