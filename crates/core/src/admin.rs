//! Creating and removing role menus.
//!
//! Every store mutation runs under one write guard so that two concurrent
//! administrators cannot lose each other's menus in the load/modify/save
//! cycle. Remote calls never run while the live index is locked.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::ids::{ChannelId, MessageId, RoleId};
use crate::domain::menu::{Bindings, MenuKey};
use crate::domain::symbol::ReactionSymbol;
use crate::errors::{AdminError, PlatformError};
use crate::index::{LiveIndex, ResolvedMenu};
use crate::platform::{MenuRender, MessageHandle, RoleHandle, RolePlatform};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::store::BindingStore;
use crate::validator::validate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedMenu {
    pub key: MenuKey,
    pub title: String,
    pub bindings: Bindings,
    /// Symbols given more than once; each kept only its last role.
    pub collapsed_symbols: Vec<ReactionSymbol>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovalReport {
    pub key: MenuKey,
    pub remote_deleted: bool,
    pub remote_error: Option<PlatformError>,
}

impl RemovalReport {
    pub fn summary(&self) -> String {
        match &self.remote_error {
            None => format!("Removed role menu `{}`.", self.key),
            Some(error) => format!(
                "Removed role menu `{}` from storage; its message could not be deleted ({error}).",
                self.key
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MenuSummary {
    pub key: MenuKey,
    pub bindings: Bindings,
    pub live: bool,
}

impl MenuSummary {
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

pub struct MenuAdministration {
    store: Arc<dyn BindingStore>,
    index: Arc<LiveIndex>,
    platform: Arc<dyn RolePlatform>,
    reconciler: Reconciler,
    write_guard: Mutex<()>,
}

impl MenuAdministration {
    pub fn new(
        store: Arc<dyn BindingStore>,
        index: Arc<LiveIndex>,
        platform: Arc<dyn RolePlatform>,
        reconciler: Reconciler,
    ) -> Self {
        Self { store, index, platform, reconciler, write_guard: Mutex::new(()) }
    }

    pub fn index(&self) -> &Arc<LiveIndex> {
        &self.index
    }

    pub async fn create<S>(
        &self,
        channel_id: ChannelId,
        title: &str,
        roles: &[RoleId],
        symbols: &[S],
    ) -> Result<CreatedMenu, AdminError>
    where
        S: AsRef<str>,
    {
        let list = validate(roles, symbols)?;
        let collapsed_symbols = list.duplicate_symbols();
        if !collapsed_symbols.is_empty() {
            warn!(
                event_name = "engine.admin.duplicate_symbols",
                channel_id = %channel_id,
                collapsed = collapsed_symbols.len(),
                "repeated emojis keep only their last role"
            );
        }
        let reactions = list.distinct_symbols();
        let bindings = list.into_map();

        let channel = self.platform.fetch_channel(channel_id).await?;
        let render = MenuRender::new(title, &bindings, reactions);
        let message = self.platform.send_menu(&channel, &render).await?;
        let key = MenuKey::new(message.channel_id, message.message_id);

        // Held until the menu is live so a reload or remove cannot interleave.
        let guard = self.write_guard.lock().await;
        if let Err(error) = self.persist_insert(key, bindings.clone()).await {
            drop(guard);
            warn!(
                event_name = "engine.admin.persist_failed",
                menu_key = %key,
                error = %error,
                "role menu could not be saved; withdrawing its message"
            );
            if let Err(cleanup) =
                self.platform.delete_message(message.channel_id, message.message_id).await
            {
                warn!(
                    event_name = "engine.admin.cleanup_failed",
                    menu_key = %key,
                    error = %cleanup,
                    "orphaned role menu message left behind"
                );
            }
            return Err(error);
        }
        self.index.put(key, resolved_from(message, &bindings)).await;
        drop(guard);

        info!(
            event_name = "engine.admin.menu_created",
            menu_key = %key,
            bindings = bindings.len(),
            "role menu created"
        );

        Ok(CreatedMenu { key, title: render.title, bindings, collapsed_symbols })
    }

    pub async fn remove(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<RemovalReport, AdminError> {
        let key = MenuKey::new(channel_id, message_id);
        let _guard = self.write_guard.lock().await;

        let mut persisted = self.store.load().await?;
        if !persisted.contains(&key) {
            return Err(AdminError::NotFound { key, known_keys: persisted.keys() });
        }

        let remote_error = match self.platform.delete_message(channel_id, message_id).await {
            Ok(()) => None,
            Err(error) => {
                warn!(
                    event_name = "engine.admin.remote_delete_failed",
                    menu_key = %key,
                    error = %error,
                    "role menu message could not be deleted; removing it locally"
                );
                Some(error)
            }
        };

        persisted.remove(&key);
        self.store.save(&persisted).await?;
        self.index.remove(&key).await;

        info!(
            event_name = "engine.admin.menu_removed",
            menu_key = %key,
            remote_deleted = remote_error.is_none(),
            "role menu removed"
        );
        Ok(RemovalReport { key, remote_deleted: remote_error.is_none(), remote_error })
    }

    /// Accepts the `<channelId>-<messageId>` form shown by `list`.
    pub async fn remove_by_full_id(&self, full_id: &str) -> Result<RemovalReport, AdminError> {
        let key = full_id
            .parse::<MenuKey>()
            .map_err(|_| AdminError::InvalidMenuId(full_id.trim().to_owned()))?;
        self.remove(key.channel_id, key.message_id).await
    }

    pub async fn list(&self) -> Result<Vec<MenuSummary>, AdminError> {
        let persisted = self.store.load().await?;
        let mut summaries = Vec::with_capacity(persisted.len());
        for (key, bindings) in persisted.iter() {
            summaries.push(MenuSummary {
                key: *key,
                bindings: bindings.clone(),
                live: self.index.contains(key).await,
            });
        }
        Ok(summaries)
    }

    /// Re-reads the store and rebuilds the live index from scratch. Creates
    /// and removes wait for the pass to finish.
    pub async fn reload(&self) -> Result<ReconcileReport, AdminError> {
        let _guard = self.write_guard.lock().await;
        let persisted = self.store.load().await?;
        Ok(self.reconciler.reload_into(&persisted, &self.index).await)
    }

    /// Caller holds the write guard.
    async fn persist_insert(&self, key: MenuKey, bindings: Bindings) -> Result<(), AdminError> {
        let mut persisted = self.store.load().await?;
        persisted.insert(key, bindings);
        self.store.save(&persisted).await?;
        Ok(())
    }
}

fn resolved_from(message: MessageHandle, bindings: &Bindings) -> ResolvedMenu {
    let bindings = bindings
        .iter()
        .map(|(symbol, role_id)| {
            let role = RoleHandle { guild_id: message.guild_id, role_id: *role_id, name: None };
            (symbol.clone(), role)
        })
        .collect();
    ResolvedMenu { message, bindings }
}
