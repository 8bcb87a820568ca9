use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use rolecall_core::{
    ChannelId, EmojiId, GuildId, MessageId, ReactionDirection, ReactionEvent, ReactionSymbol,
    RoleId, RouterError, RouterPool, UserId,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    commands::{
        parse_menu_command, AdminGate, CommandInvocation, CommandParseError, CommandRouteError,
        CommandRouter, MenuCommand, MenuCommandService, NoopMenuCommandService,
    },
    embeds::{self, OutgoingMessage},
};

const DISPATCH_OPCODE: u8 = 0;

/// One dispatch frame from the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub sequence: Option<u64>,
    pub event: GatewayEvent,
}

#[derive(Debug, Error)]
pub enum EnvelopeDecodeError {
    #[error("gateway frame is not valid JSON: {0}")]
    Frame(#[source] serde_json::Error),
    #[error("malformed `{event_type}` payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    t: Option<String>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    d: Value,
}

impl GatewayEnvelope {
    /// Decodes a raw gateway frame. Heartbeat acks, hellos and other control
    /// opcodes yield `None`; only dispatch frames carry events.
    pub fn decode(raw: &str) -> Result<Option<Self>, EnvelopeDecodeError> {
        let frame: RawFrame = serde_json::from_str(raw).map_err(EnvelopeDecodeError::Frame)?;
        if frame.op != DISPATCH_OPCODE {
            return Ok(None);
        }

        let event_type = frame.t.unwrap_or_default();
        let payload = |source: serde_json::Error| EnvelopeDecodeError::Payload {
            event_type: event_type.clone(),
            source,
        };
        let event = match event_type.as_str() {
            "READY" => GatewayEvent::Ready(serde_json::from_value(frame.d).map_err(payload)?),
            "MESSAGE_REACTION_ADD" => {
                GatewayEvent::ReactionAdd(serde_json::from_value(frame.d).map_err(payload)?)
            }
            "MESSAGE_REACTION_REMOVE" => {
                GatewayEvent::ReactionRemove(serde_json::from_value(frame.d).map_err(payload)?)
            }
            "MESSAGE_CREATE" => {
                GatewayEvent::MessageCreate(serde_json::from_value(frame.d).map_err(payload)?)
            }
            _ => GatewayEvent::Unsupported { event_type: event_type.clone() },
        };

        Ok(Some(Self { sequence: frame.s, event }))
    }

    /// Sequence-based id used to correlate log lines for one frame.
    pub fn correlation_id(&self) -> String {
        match self.sequence {
            Some(sequence) => format!("seq-{sequence}"),
            None => format!("local-{}", uuid::Uuid::new_v4().simple()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready(ReadyEvent),
    ReactionAdd(ReactionPayload),
    ReactionRemove(ReactionPayload),
    MessageCreate(MessageCreateEvent),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> GatewayEventType {
        match self {
            Self::Ready(_) => GatewayEventType::Ready,
            Self::ReactionAdd(_) => GatewayEventType::ReactionAdd,
            Self::ReactionRemove(_) => GatewayEventType::ReactionRemove,
            Self::MessageCreate(_) => GatewayEventType::MessageCreate,
            Self::Unsupported { .. } => GatewayEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    Ready,
    ReactionAdd,
    ReactionRemove,
    MessageCreate,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserPayload {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MemberPayload {
    #[serde(default)]
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub user: Option<UserPayload>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EmojiPayload {
    #[serde(default)]
    pub id: Option<EmojiId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ReadyEvent {
    pub user: UserPayload,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ReactionPayload {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub member: Option<MemberPayload>,
    pub emoji: EmojiPayload,
}

impl ReactionPayload {
    /// `None` when the emoji carries nothing usable as a symbol.
    pub fn to_event(
        &self,
        direction: ReactionDirection,
        own_user_id: Option<UserId>,
    ) -> Option<ReactionEvent> {
        let name = self.emoji.name.as_deref().unwrap_or_default();
        let symbol = ReactionSymbol::from_emoji(name, self.emoji.id)?;
        let member_is_bot = self
            .member
            .as_ref()
            .and_then(|member| member.user.as_ref())
            .is_some_and(|user| user.bot);

        Some(ReactionEvent {
            direction,
            channel_id: self.channel_id,
            message_id: self.message_id,
            actor_id: self.user_id,
            symbol,
            is_bot: member_is_bot || own_user_id == Some(self.user_id),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageCreateEvent {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub author: UserPayload,
    #[serde(default)]
    pub member: Option<MemberPayload>,
    #[serde(default)]
    pub content: String,
}

/// The bot's own user id, learned from `READY`.
///
/// Also remembers every bot account seen so far: reaction removals carry no
/// member, so the actor id is all there is to go on.
#[derive(Debug, Default)]
pub struct BotIdentity {
    user_id: RwLock<Option<UserId>>,
    known_bots: RwLock<HashSet<UserId>>,
}

impl BotIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, user_id: UserId) {
        *self.user_id.write().await = Some(user_id);
    }

    pub async fn get(&self) -> Option<UserId> {
        *self.user_id.read().await
    }

    pub async fn remember_bot(&self, user_id: UserId) {
        if !self.known_bots.read().await.contains(&user_id) {
            self.known_bots.write().await.insert(user_id);
        }
    }

    pub async fn is_known_bot(&self, user_id: UserId) -> bool {
        self.known_bots.read().await.contains(&user_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// A reply to post into a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub channel_id: ChannelId,
    pub message: OutgoingMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Reply),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error("reaction could not be queued: {0}")]
    Queue(#[from] RouterError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GatewayEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<GatewayEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Commands answered by the offline service; reactions and identity are
/// tracked but nothing is routed.
pub fn default_dispatcher() -> EventDispatcher {
    let identity = Arc::new(BotIdentity::new());
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ReadyHandler::new(Arc::clone(&identity)));
    dispatcher.register(CommandHandler::new(
        NoopMenuCommandService,
        "!",
        AdminGate::default(),
        identity,
    ));
    dispatcher
}

/// Wires the live engine: reactions go to the router pool and commands to
/// the given administration service.
pub fn engine_dispatcher<K, S>(
    sink: Arc<K>,
    commands: S,
    prefix: &str,
    gate: AdminGate,
) -> EventDispatcher
where
    K: ReactionSink + 'static,
    S: MenuCommandService + 'static,
{
    let identity = Arc::new(BotIdentity::new());
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ReadyHandler::new(Arc::clone(&identity)));
    dispatcher.register(ReactionHandler::added(Arc::clone(&sink), Arc::clone(&identity)));
    dispatcher.register(ReactionHandler::removed(sink, Arc::clone(&identity)));
    dispatcher.register(CommandHandler::new(commands, prefix, gate, identity));
    dispatcher
}

pub struct ReadyHandler {
    identity: Arc<BotIdentity>,
}

impl ReadyHandler {
    pub fn new(identity: Arc<BotIdentity>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl EventHandler for ReadyHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::Ready
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::Ready(ready) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.identity.set(ready.user.id).await;
        info!(
            event_name = "ingress.discord.ready",
            correlation_id = %ctx.correlation_id,
            bot_user_id = %ready.user.id,
            "gateway session ready"
        );
        Ok(HandlerResult::Processed)
    }
}

/// Where decoded reactions go.
#[async_trait]
pub trait ReactionSink: Send + Sync {
    async fn submit(&self, event: ReactionEvent) -> Result<(), RouterError>;
}

#[async_trait]
impl ReactionSink for RouterPool {
    async fn submit(&self, event: ReactionEvent) -> Result<(), RouterError> {
        RouterPool::submit(self, event).await
    }
}

/// One instance per direction; the gateway reports adds and removes as
/// separate event types.
pub struct ReactionHandler<K> {
    sink: Arc<K>,
    identity: Arc<BotIdentity>,
    direction: ReactionDirection,
}

impl<K> ReactionHandler<K>
where
    K: ReactionSink,
{
    pub fn added(sink: Arc<K>, identity: Arc<BotIdentity>) -> Self {
        Self { sink, identity, direction: ReactionDirection::Added }
    }

    pub fn removed(sink: Arc<K>, identity: Arc<BotIdentity>) -> Self {
        Self { sink, identity, direction: ReactionDirection::Removed }
    }
}

#[async_trait]
impl<K> EventHandler for ReactionHandler<K>
where
    K: ReactionSink + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        match self.direction {
            ReactionDirection::Added => GatewayEventType::ReactionAdd,
            ReactionDirection::Removed => GatewayEventType::ReactionRemove,
        }
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let payload = match (&envelope.event, self.direction) {
            (GatewayEvent::ReactionAdd(payload), ReactionDirection::Added)
            | (GatewayEvent::ReactionRemove(payload), ReactionDirection::Removed) => payload,
            _ => return Ok(HandlerResult::Ignored),
        };

        let own_user_id = self.identity.get().await;
        let Some(event) = payload.to_event(self.direction, own_user_id) else {
            debug!(
                event_name = "ingress.discord.reaction_unusable",
                correlation_id = %ctx.correlation_id,
                message_id = %payload.message_id,
                "reaction emoji has no usable symbol"
            );
            return Ok(HandlerResult::Ignored);
        };
        if event.is_bot {
            self.identity.remember_bot(event.actor_id).await;
            return Ok(HandlerResult::Ignored);
        }
        if self.identity.is_known_bot(event.actor_id).await {
            return Ok(HandlerResult::Ignored);
        }

        self.sink.submit(event).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct CommandHandler<S> {
    router: CommandRouter<S>,
    gate: AdminGate,
    identity: Arc<BotIdentity>,
}

impl<S> CommandHandler<S>
where
    S: MenuCommandService,
{
    pub fn new(service: S, prefix: &str, gate: AdminGate, identity: Arc<BotIdentity>) -> Self {
        Self { router: CommandRouter::new(service, prefix), gate, identity }
    }

    /// The configured prefix, or a mention of the bot followed by a space.
    async fn parse(&self, content: &str) -> Option<Result<MenuCommand, CommandParseError>> {
        if let Some(parsed) = parse_menu_command(self.router.prefix(), content) {
            return Some(parsed);
        }
        let own_user_id = self.identity.get().await?;
        [format!("<@{own_user_id}>"), format!("<@!{own_user_id}>")]
            .iter()
            .find_map(|mention| parse_menu_command(mention, content))
    }
}

#[async_trait]
impl<S> EventHandler for CommandHandler<S>
where
    S: MenuCommandService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::MessageCreate
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::MessageCreate(message) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if message.author.bot {
            self.identity.remember_bot(message.author.id).await;
            return Ok(HandlerResult::Ignored);
        }
        let Some(parsed) = self.parse(&message.content).await else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = |message_body| Reply { channel_id: message.channel_id, message: message_body };
        if message.guild_id.is_none() {
            return Ok(HandlerResult::Responded(reply(embeds::error_message(
                "Role menus can only be managed inside a server.",
            ))));
        }

        let author_roles =
            message.member.as_ref().map(|member| member.roles.clone()).unwrap_or_default();
        if !self.gate.allows(&author_roles) {
            info!(
                event_name = "ingress.discord.command_denied",
                correlation_id = %ctx.correlation_id,
                author_id = %message.author.id,
                "role menu command refused for missing admin role"
            );
            return Ok(HandlerResult::Responded(reply(embeds::error_message(
                "You need an administrator role to manage role menus.",
            ))));
        }

        let command = match parsed {
            Ok(command) => command,
            Err(error) => {
                let prefix = self.router.prefix();
                return Ok(HandlerResult::Responded(reply(embeds::error_message(&format!(
                    "{error}. See `{prefix}rr help`."
                )))));
            }
        };

        let invocation = CommandInvocation {
            channel_id: message.channel_id,
            guild_id: message.guild_id,
            author_id: message.author.id,
            author_roles,
            correlation_id: ctx.correlation_id.clone(),
        };
        let body = self.router.route(command, &invocation).await?;
        Ok(HandlerResult::Responded(reply(body)))
    }
}
