use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::config::ReconcileConfig;
use crate::domain::ids::RoleId;
use crate::domain::menu::{MenuCollection, MenuKey, PersistedMenu};
use crate::domain::symbol::ReactionSymbol;
use crate::errors::PlatformError;
use crate::index::{LiveIndex, ResolvedMenu};
use crate::platform::{MessageHandle, RolePlatform};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub max_concurrency: usize,
    pub menu_timeout: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { max_concurrency: 4, menu_timeout: Duration::from_secs(10) }
    }
}

impl From<&ReconcileConfig> for ReconcileOptions {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency as usize,
            menu_timeout: Duration::from_secs(config.menu_timeout_secs),
        }
    }
}

/// A persisted reference that did not resolve during a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionFailure {
    /// Channel or message is gone, unreadable, or timed out. The whole menu is
    /// left out of the live index; its persisted entry is kept.
    MessageNotFound { menu_key: MenuKey, detail: String },
    /// One role is gone. Only that binding is left out.
    RoleNotFound { menu_key: MenuKey, symbol: ReactionSymbol, role_id: RoleId, detail: String },
}

impl ResolutionFailure {
    pub fn menu_key(&self) -> MenuKey {
        match self {
            Self::MessageNotFound { menu_key, .. } | Self::RoleNotFound { menu_key, .. } => {
                *menu_key
            }
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::MessageNotFound { .. } => "message-not-found",
            Self::RoleNotFound { .. } => "role-not-found",
        }
    }

    pub fn symbol(&self) -> Option<&ReactionSymbol> {
        match self {
            Self::MessageNotFound { .. } => None,
            Self::RoleNotFound { symbol, .. } => Some(symbol),
        }
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageNotFound { menu_key, detail } => {
                write!(f, "{menu_key}: {} ({detail})", self.reason())
            }
            Self::RoleNotFound { menu_key, symbol, role_id, detail } => {
                write!(f, "{menu_key} {symbol} -> {role_id}: {} ({detail})", self.reason())
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub persisted: usize,
    pub loaded: usize,
    pub failures: Vec<ResolutionFailure>,
}

impl ReconcileReport {
    pub fn dropped_menus(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| matches!(failure, ResolutionFailure::MessageNotFound { .. }))
            .count()
    }

    pub fn degraded_bindings(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| matches!(failure, ResolutionFailure::RoleNotFound { .. }))
            .count()
    }

    pub fn mentions(&self, key: &MenuKey) -> bool {
        self.failures.iter().any(|failure| failure.menu_key() == *key)
    }
}

struct MenuResolution {
    key: MenuKey,
    resolved: Option<ResolvedMenu>,
    failures: Vec<ResolutionFailure>,
}

/// Rebuilds the live index from persisted menus by resolving every reference
/// against the platform, with bounded fan-out and a per-menu deadline.
#[derive(Clone)]
pub struct Reconciler {
    platform: Arc<dyn RolePlatform>,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(platform: Arc<dyn RolePlatform>, options: ReconcileOptions) -> Self {
        Self { platform, options }
    }

    pub async fn reconcile(
        &self,
        persisted: &MenuCollection,
    ) -> (HashMap<MenuKey, ResolvedMenu>, ReconcileReport) {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for menu in persisted.menus() {
            let platform = Arc::clone(&self.platform);
            let semaphore = Arc::clone(&semaphore);
            let menu_timeout = self.options.menu_timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                resolve_menu(platform.as_ref(), menu, menu_timeout).await
            });
        }

        let mut resolved = HashMap::new();
        let mut report = ReconcileReport { persisted: persisted.len(), ..ReconcileReport::default() };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(resolution) => {
                    report.failures.extend(resolution.failures);
                    if let Some(menu) = resolution.resolved {
                        resolved.insert(resolution.key, menu);
                    }
                }
                Err(error) => {
                    warn!(
                        event_name = "engine.reconcile.task_failed",
                        error = %error,
                        "menu resolution task aborted"
                    );
                }
            }
        }

        report.loaded = resolved.len();
        report.failures.sort_by(|left, right| {
            (left.menu_key(), left.symbol()).cmp(&(right.menu_key(), right.symbol()))
        });

        info!(
            event_name = "engine.reconcile.completed",
            persisted = report.persisted,
            loaded = report.loaded,
            dropped_menus = report.dropped_menus(),
            degraded_bindings = report.degraded_bindings(),
            "role menus reconciled"
        );

        (resolved, report)
    }

    /// Reconciles and swaps the result into `index` in one step.
    pub async fn reload_into(&self, persisted: &MenuCollection, index: &LiveIndex) -> ReconcileReport {
        let (resolved, report) = self.reconcile(persisted).await;
        index.replace_all(resolved).await;
        report
    }
}

async fn resolve_menu(
    platform: &dyn RolePlatform,
    menu: PersistedMenu,
    menu_timeout: Duration,
) -> MenuResolution {
    let deadline = Instant::now() + menu_timeout;
    let key = menu.key;

    let message = match timeout_at(deadline, resolve_message(platform, key)).await {
        Ok(Ok(message)) => message,
        Ok(Err(error)) => return dropped(key, error.to_string()),
        Err(_) => return dropped(key, PlatformError::Timeout(menu_timeout).to_string()),
    };

    let mut bindings = BTreeMap::new();
    let mut failures = Vec::new();

    for (symbol, role_id) in menu.bindings {
        let outcome = timeout_at(deadline, platform.fetch_role(message.guild_id, role_id))
            .await
            .unwrap_or(Err(PlatformError::Timeout(menu_timeout)));

        match outcome {
            Ok(role) => {
                bindings.insert(symbol, role);
            }
            Err(error) => {
                warn!(
                    event_name = "engine.reconcile.binding_degraded",
                    menu_key = %key,
                    symbol = %symbol,
                    role_id = %role_id,
                    error = %error,
                    "role no longer resolves; binding skipped"
                );
                failures.push(ResolutionFailure::RoleNotFound {
                    menu_key: key,
                    symbol,
                    role_id,
                    detail: error.to_string(),
                });
            }
        }
    }

    MenuResolution { key, resolved: Some(ResolvedMenu { message, bindings }), failures }
}

async fn resolve_message(
    platform: &dyn RolePlatform,
    key: MenuKey,
) -> Result<MessageHandle, PlatformError> {
    let channel = platform.fetch_channel(key.channel_id).await?;
    platform.fetch_message(&channel, key.message_id).await
}

fn dropped(key: MenuKey, detail: String) -> MenuResolution {
    warn!(
        event_name = "engine.reconcile.menu_dropped",
        menu_key = %key,
        detail = %detail,
        "failed to load role menu; persisted entry kept"
    );
    MenuResolution {
        key,
        resolved: None,
        failures: vec![ResolutionFailure::MessageNotFound { menu_key: key, detail }],
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{ReconcileOptions, Reconciler, ResolutionFailure};
    use crate::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
    use crate::domain::menu::{Bindings, MenuCollection, MenuKey};
    use crate::domain::symbol::ReactionSymbol;
    use crate::errors::PlatformError;
    use crate::index::LiveIndex;
    use crate::platform::{ChannelHandle, MenuRender, MessageHandle, RoleHandle, RolePlatform};

    /// Resolves everything except the listed messages and roles; messages in
    /// `stalled` never answer. Tracks peak concurrent fetches.
    #[derive(Default)]
    struct StubPlatform {
        missing_messages: HashSet<u64>,
        missing_roles: HashSet<u64>,
        stalled_messages: HashSet<u64>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl RolePlatform for StubPlatform {
        async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelHandle, PlatformError> {
            Ok(ChannelHandle { channel_id, guild_id: GuildId(1) })
        }

        async fn fetch_message(
            &self,
            channel: &ChannelHandle,
            message_id: MessageId,
        ) -> Result<MessageHandle, PlatformError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.stalled_messages.contains(&message_id.get()) {
                std::future::pending::<()>().await;
            }
            if self.missing_messages.contains(&message_id.get()) {
                return Err(PlatformError::not_found("message", message_id));
            }
            Ok(MessageHandle { channel_id: channel.channel_id, message_id, guild_id: channel.guild_id })
        }

        async fn fetch_role(&self, guild_id: GuildId, role_id: RoleId) -> Result<RoleHandle, PlatformError> {
            if self.missing_roles.contains(&role_id.get()) {
                return Err(PlatformError::not_found("role", role_id));
            }
            Ok(RoleHandle { guild_id, role_id, name: Some(format!("role-{role_id}")) })
        }

        async fn send_menu(
            &self,
            _channel: &ChannelHandle,
            _render: &MenuRender,
        ) -> Result<MessageHandle, PlatformError> {
            Err(PlatformError::Forbidden("read-only stub".to_owned()))
        }

        async fn delete_message(&self, _channel_id: ChannelId, _message_id: MessageId) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn grant_role(&self, _guild_id: GuildId, _user_id: UserId, _role_id: RoleId) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn revoke_role(&self, _guild_id: GuildId, _user_id: UserId, _role_id: RoleId) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    fn menu(entries: &[(&str, u64)]) -> Bindings {
        entries
            .iter()
            .map(|(symbol, role)| (ReactionSymbol::parse(symbol).expect("symbol"), RoleId(*role)))
            .collect()
    }

    fn key(channel: u64, message: u64) -> MenuKey {
        MenuKey::new(ChannelId(channel), MessageId(message))
    }

    #[tokio::test]
    async fn one_broken_menu_and_one_deleted_role_are_isolated() {
        let platform = StubPlatform {
            missing_messages: HashSet::from([200]),
            missing_roles: HashSet::from([32]),
            ..StubPlatform::default()
        };

        let mut persisted = MenuCollection::new();
        persisted.insert(key(1, 100), menu(&[("🔴", 11), ("🔵", 12)]));
        persisted.insert(key(2, 200), menu(&[("🔥", 21)]));
        persisted.insert(key(3, 300), menu(&[("🍎", 31), ("🍐", 32), ("🍋", 33)]));

        let reconciler = Reconciler::new(Arc::new(platform), ReconcileOptions::default());
        let (resolved, report) = reconciler.reconcile(&persisted).await;

        assert_eq!(resolved.len(), 2);
        assert!(!resolved.contains_key(&key(2, 200)));

        let fruit = resolved.get(&key(3, 300)).expect("degraded menu still loads");
        assert_eq!(fruit.bindings.len(), 2);
        assert!(fruit.role_for(&ReactionSymbol::parse("🍐").expect("symbol")).is_none());

        assert_eq!(report.persisted, 3);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            &report.failures[0],
            ResolutionFailure::MessageNotFound { menu_key, .. } if *menu_key == key(2, 200)
        ));
        assert_eq!(report.failures[0].reason(), "message-not-found");
        assert_eq!(report.failures[1].reason(), "role-not-found");
        assert_eq!(report.failures[1].symbol().map(ReactionSymbol::as_str), Some("🍐"));
    }

    #[tokio::test]
    async fn stalled_menu_times_out_without_blocking_the_pass() {
        let platform = StubPlatform { stalled_messages: HashSet::from([900]), ..StubPlatform::default() };

        let mut persisted = MenuCollection::new();
        persisted.insert(key(9, 900), menu(&[("⏳", 1)]));
        persisted.insert(key(8, 800), menu(&[("✅", 2)]));

        let reconciler = Reconciler::new(
            Arc::new(platform),
            ReconcileOptions { max_concurrency: 1, menu_timeout: Duration::from_millis(50) },
        );
        let (resolved, report) = reconciler.reconcile(&persisted).await;

        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key(&key(8, 800)));
        assert_eq!(report.dropped_menus(), 1);
        assert!(report.mentions(&key(9, 900)));
    }

    #[tokio::test]
    async fn fan_out_respects_concurrency_limit() {
        let platform = Arc::new(StubPlatform::default());
        let mut persisted = MenuCollection::new();
        for message in 0..12 {
            persisted.insert(key(1, message), menu(&[("🔥", 5)]));
        }

        let reconciler = Reconciler::new(
            platform.clone(),
            ReconcileOptions { max_concurrency: 3, menu_timeout: Duration::from_secs(5) },
        );
        let (resolved, report) = reconciler.reconcile(&persisted).await;

        assert_eq!(resolved.len(), 12);
        assert!(report.failures.is_empty());
        assert!(platform.peak_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn reload_replaces_index_contents() {
        let index = LiveIndex::new();
        let reconciler = Reconciler::new(Arc::new(StubPlatform::default()), ReconcileOptions::default());

        let mut first = MenuCollection::new();
        first.insert(key(1, 1), menu(&[("🔥", 5)]));
        reconciler.reload_into(&first, &index).await;
        assert!(index.contains(&key(1, 1)).await);

        let mut second = MenuCollection::new();
        second.insert(key(2, 2), menu(&[("💧", 6)]));
        let report = reconciler.reload_into(&second, &index).await;

        assert_eq!(report.loaded, 1);
        assert_eq!(index.keys().await, vec![key(2, 2)]);
    }
}
