use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::ids::{ChannelId, MessageId};
use crate::domain::menu::MenuKey;
use crate::domain::symbol::ReactionSymbol;
use crate::platform::{MessageHandle, RoleHandle};

/// A menu whose message, and every role still listed, resolved on the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedMenu {
    pub message: MessageHandle,
    pub bindings: BTreeMap<ReactionSymbol, RoleHandle>,
}

impl ResolvedMenu {
    pub fn key(&self) -> MenuKey {
        MenuKey::new(self.message.channel_id, self.message.message_id)
    }

    pub fn role_for(&self, symbol: &ReactionSymbol) -> Option<&RoleHandle> {
        self.bindings.get(symbol)
    }
}

/// In-memory view of every live menu, read by the event router.
///
/// Writers build a complete [`ResolvedMenu`] (or a complete map) before taking
/// the write lock, so the lock is never held across platform I/O.
#[derive(Debug, Default)]
pub struct LiveIndex {
    menus: RwLock<HashMap<MenuKey, Arc<ResolvedMenu>>>,
}

impl LiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Option<Arc<ResolvedMenu>> {
        let menus = self.menus.read().await;
        menus.get(&MenuKey::new(channel_id, message_id)).cloned()
    }

    pub async fn put(&self, key: MenuKey, menu: ResolvedMenu) {
        let menu = Arc::new(menu);
        let mut menus = self.menus.write().await;
        menus.insert(key, menu);
    }

    pub async fn remove(&self, key: &MenuKey) -> Option<Arc<ResolvedMenu>> {
        let mut menus = self.menus.write().await;
        menus.remove(key)
    }

    /// Swaps in the result of a reconciliation pass; nothing from the previous
    /// contents survives.
    pub async fn replace_all(&self, resolved: HashMap<MenuKey, ResolvedMenu>) {
        let next: HashMap<MenuKey, Arc<ResolvedMenu>> =
            resolved.into_iter().map(|(key, menu)| (key, Arc::new(menu))).collect();
        let mut menus = self.menus.write().await;
        *menus = next;
    }

    pub async fn contains(&self, key: &MenuKey) -> bool {
        self.menus.read().await.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<MenuKey> {
        let mut keys: Vec<MenuKey> = self.menus.read().await.keys().copied().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.menus.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.menus.read().await.is_empty()
    }
}
