use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
use crate::domain::symbol::ReactionSymbol;
use crate::errors::PlatformError;
use crate::index::LiveIndex;
use crate::platform::RolePlatform;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReactionDirection {
    Added,
    Removed,
}

impl ReactionDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub direction: ReactionDirection,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub actor_id: UserId,
    pub symbol: ReactionSymbol,
    pub is_bot: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    IgnoredBot,
    NotAMenu,
    UnboundSymbol,
    Granted { guild_id: GuildId, user_id: UserId, role_id: RoleId },
    Revoked { guild_id: GuildId, user_id: UserId, role_id: RoleId },
    RemoteFailed { role_id: RoleId, error: PlatformError },
}

impl RouteOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::IgnoredBot => "ignored_bot",
            Self::NotAMenu => "not_a_menu",
            Self::UnboundSymbol => "unbound_symbol",
            Self::Granted { .. } => "granted",
            Self::Revoked { .. } => "revoked",
            Self::RemoteFailed { .. } => "remote_failed",
        }
    }
}

/// Turns one reaction event into at most one grant or revoke call.
pub struct EventRouter {
    index: Arc<LiveIndex>,
    platform: Arc<dyn RolePlatform>,
}

impl EventRouter {
    pub fn new(index: Arc<LiveIndex>, platform: Arc<dyn RolePlatform>) -> Self {
        Self { index, platform }
    }

    pub async fn route(&self, event: &ReactionEvent) -> RouteOutcome {
        if event.is_bot {
            return RouteOutcome::IgnoredBot;
        }

        let Some(menu) = self.index.get(event.channel_id, event.message_id).await else {
            return RouteOutcome::NotAMenu;
        };
        let Some(role) = menu.role_for(&event.symbol) else {
            debug!(
                event_name = "engine.router.unbound_symbol",
                menu_key = %menu.key(),
                symbol = %event.symbol,
                "reaction is not bound to a role"
            );
            return RouteOutcome::UnboundSymbol;
        };

        let guild_id = role.guild_id;
        let role_id = role.role_id;
        let user_id = event.actor_id;
        let result = match event.direction {
            ReactionDirection::Added => self.platform.grant_role(guild_id, user_id, role_id).await,
            ReactionDirection::Removed => self.platform.revoke_role(guild_id, user_id, role_id).await,
        };

        match result {
            Ok(()) => {
                info!(
                    event_name = "engine.router.role_applied",
                    direction = event.direction.as_str(),
                    menu_key = %menu.key(),
                    user_id = %user_id,
                    role_id = %role_id,
                    "role membership updated"
                );
                match event.direction {
                    ReactionDirection::Added => RouteOutcome::Granted { guild_id, user_id, role_id },
                    ReactionDirection::Removed => RouteOutcome::Revoked { guild_id, user_id, role_id },
                }
            }
            Err(error) => {
                warn!(
                    event_name = "engine.router.grant_failed",
                    direction = event.direction.as_str(),
                    menu_key = %menu.key(),
                    user_id = %user_id,
                    role_id = %role_id,
                    error = %error,
                    "role update rejected by platform"
                );
                RouteOutcome::RemoteFailed { role_id, error }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouterOptions {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self { workers: 4, queue_capacity: 256 }
    }
}

impl From<&RouterConfig> for RouterOptions {
    fn from(config: &RouterConfig) -> Self {
        Self { workers: config.workers as usize, queue_capacity: config.queue_capacity as usize }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("event router is shut down")]
    Closed,
}

/// Fixed set of workers, one queue each. Events for the same message always
/// land on the same worker and are routed in submission order.
pub struct RouterPool {
    senders: Vec<mpsc::Sender<ReactionEvent>>,
    workers: Vec<JoinHandle<()>>,
}

impl RouterPool {
    pub fn spawn(router: Arc<EventRouter>, options: RouterOptions) -> Self {
        let worker_count = options.workers.max(1);
        let capacity = options.queue_capacity.max(1);
        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let (sender, receiver) = mpsc::channel(capacity);
            senders.push(sender);
            workers.push(tokio::spawn(run_worker(worker_id, Arc::clone(&router), receiver)));
        }

        info!(
            event_name = "engine.router.started",
            workers = worker_count,
            queue_capacity = capacity,
            "reaction router started"
        );
        Self { senders, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    pub fn partition_for(&self, message_id: MessageId) -> usize {
        (message_id.get() % self.senders.len() as u64) as usize
    }

    /// Queues an event, waiting while its worker's queue is full.
    pub async fn submit(&self, event: ReactionEvent) -> Result<(), RouterError> {
        let partition = self.partition_for(event.message_id);
        self.senders[partition].send(event).await.map_err(|_| RouterError::Closed)
    }

    /// Closes every queue and waits until queued events are drained.
    pub async fn shutdown(self) {
        let Self { senders, workers } = self;
        drop(senders);

        for worker in workers {
            if let Err(error) = worker.await {
                warn!(event_name = "engine.router.worker_failed", error = %error, "router worker aborted");
            }
        }
        info!(event_name = "engine.router.stopped", "reaction router drained");
    }
}

async fn run_worker(
    worker_id: usize,
    router: Arc<EventRouter>,
    mut receiver: mpsc::Receiver<ReactionEvent>,
) {
    while let Some(event) = receiver.recv().await {
        let outcome = router.route(&event).await;
        debug!(
            event_name = "engine.router.routed",
            worker_id,
            message_id = %event.message_id,
            outcome = outcome.label(),
            "reaction routed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{
        EventRouter, ReactionDirection, ReactionEvent, RouteOutcome, RouterError, RouterOptions,
        RouterPool,
    };
    use crate::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
    use crate::domain::symbol::ReactionSymbol;
    use crate::errors::PlatformError;
    use crate::index::{LiveIndex, ResolvedMenu};
    use crate::platform::{ChannelHandle, MenuRender, MessageHandle, RoleHandle, RolePlatform};

    #[derive(Default)]
    struct RecordingPlatform {
        held: Mutex<HashSet<(u64, u64)>>,
        calls: Mutex<Vec<(&'static str, u64, u64)>>,
        forbidden_roles: HashSet<u64>,
    }

    #[async_trait]
    impl RolePlatform for RecordingPlatform {
        async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelHandle, PlatformError> {
            Err(PlatformError::not_found("channel", channel_id))
        }

        async fn fetch_message(
            &self,
            _channel: &ChannelHandle,
            message_id: MessageId,
        ) -> Result<MessageHandle, PlatformError> {
            Err(PlatformError::not_found("message", message_id))
        }

        async fn fetch_role(&self, _guild_id: GuildId, role_id: RoleId) -> Result<RoleHandle, PlatformError> {
            Err(PlatformError::not_found("role", role_id))
        }

        async fn send_menu(
            &self,
            _channel: &ChannelHandle,
            _render: &MenuRender,
        ) -> Result<MessageHandle, PlatformError> {
            Err(PlatformError::Forbidden("not supported".to_owned()))
        }

        async fn delete_message(&self, _channel_id: ChannelId, _message_id: MessageId) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn grant_role(&self, _guild_id: GuildId, user_id: UserId, role_id: RoleId) -> Result<(), PlatformError> {
            if self.forbidden_roles.contains(&role_id.get()) {
                return Err(PlatformError::Forbidden("role is above the bot".to_owned()));
            }
            self.calls.lock().await.push(("grant", user_id.get(), role_id.get()));
            self.held.lock().await.insert((user_id.get(), role_id.get()));
            Ok(())
        }

        async fn revoke_role(&self, _guild_id: GuildId, user_id: UserId, role_id: RoleId) -> Result<(), PlatformError> {
            self.calls.lock().await.push(("revoke", user_id.get(), role_id.get()));
            self.held.lock().await.remove(&(user_id.get(), role_id.get()));
            Ok(())
        }
    }

    async fn index_with_menu() -> Arc<LiveIndex> {
        let mut bindings = BTreeMap::new();
        for (symbol, role) in [("🔥", 1_u64), ("🚫", 13)] {
            bindings.insert(
                ReactionSymbol::parse(symbol).expect("symbol"),
                RoleHandle { guild_id: GuildId(7), role_id: RoleId(role), name: None },
            );
        }
        let menu = ResolvedMenu {
            message: MessageHandle { channel_id: ChannelId(1), message_id: MessageId(2), guild_id: GuildId(7) },
            bindings,
        };
        let index = Arc::new(LiveIndex::new());
        index.put(menu.key(), menu).await;
        index
    }

    fn event(direction: ReactionDirection, message: u64, symbol: &str) -> ReactionEvent {
        ReactionEvent {
            direction,
            channel_id: ChannelId(1),
            message_id: MessageId(message),
            actor_id: UserId(99),
            symbol: ReactionSymbol::parse(symbol).expect("symbol"),
            is_bot: false,
        }
    }

    #[tokio::test]
    async fn every_terminal_state_is_reachable() {
        let platform = Arc::new(RecordingPlatform {
            forbidden_roles: HashSet::from([13]),
            ..RecordingPlatform::default()
        });
        let router = EventRouter::new(index_with_menu().await, platform.clone());

        let mut bot = event(ReactionDirection::Added, 2, "🔥");
        bot.is_bot = true;
        assert_eq!(router.route(&bot).await, RouteOutcome::IgnoredBot);
        assert_eq!(router.route(&event(ReactionDirection::Added, 3, "🔥")).await, RouteOutcome::NotAMenu);
        assert_eq!(
            router.route(&event(ReactionDirection::Added, 2, "💧")).await,
            RouteOutcome::UnboundSymbol
        );
        assert_eq!(
            router.route(&event(ReactionDirection::Added, 2, "🔥")).await,
            RouteOutcome::Granted { guild_id: GuildId(7), user_id: UserId(99), role_id: RoleId(1) }
        );
        assert_eq!(
            router.route(&event(ReactionDirection::Removed, 2, "🔥")).await,
            RouteOutcome::Revoked { guild_id: GuildId(7), user_id: UserId(99), role_id: RoleId(1) }
        );
        assert!(matches!(
            router.route(&event(ReactionDirection::Added, 2, "🚫")).await,
            RouteOutcome::RemoteFailed { role_id: RoleId(13), .. }
        ));

        assert_eq!(platform.calls.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn pool_applies_events_for_one_message_in_order() {
        let platform = Arc::new(RecordingPlatform::default());
        let router = Arc::new(EventRouter::new(index_with_menu().await, platform.clone()));
        let pool = RouterPool::spawn(router, RouterOptions { workers: 3, queue_capacity: 2 });

        for _ in 0..5 {
            pool.submit(event(ReactionDirection::Added, 2, "🔥")).await.expect("submit");
            pool.submit(event(ReactionDirection::Removed, 2, "🔥")).await.expect("submit");
        }
        pool.shutdown().await;

        let calls = platform.calls.lock().await;
        let kinds: Vec<&str> = calls.iter().map(|(kind, _, _)| *kind).collect();
        assert_eq!(kinds, ["grant", "revoke"].repeat(5));
        assert!(platform.held.lock().await.is_empty());
    }

    #[tokio::test]
    async fn partitions_by_message_id() {
        let platform = Arc::new(RecordingPlatform::default());
        let router = Arc::new(EventRouter::new(Arc::new(LiveIndex::new()), platform));
        let pool = RouterPool::spawn(router, RouterOptions { workers: 4, queue_capacity: 8 });

        assert_eq!(pool.worker_count(), 4);
        assert_eq!(pool.partition_for(MessageId(8)), pool.partition_for(MessageId(12)));
        assert_ne!(pool.partition_for(MessageId(8)), pool.partition_for(MessageId(9)));
        pool.shutdown().await;
    }

    #[test]
    fn closed_error_is_readable() {
        assert_eq!(RouterError::Closed.to_string(), "event router is shut down");
    }
}
