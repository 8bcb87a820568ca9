use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::{ChannelId, MessageId, RoleId};
use crate::domain::symbol::ReactionSymbol;

/// Identity of a role menu: the channel and message the menu was rendered as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MenuKey {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("menu id `{0}` must look like `<channelId>-<messageId>`")]
pub struct MenuKeyParseError(pub String);

impl MenuKey {
    pub fn new(channel_id: ChannelId, message_id: MessageId) -> Self {
        Self { channel_id, message_id }
    }

    /// `"<channelId>-<messageId>"`, the durable store key.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MenuKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.channel_id, self.message_id)
    }
}

impl FromStr for MenuKey {
    type Err = MenuKeyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_matches('`');
        let (channel, message) =
            trimmed.split_once('-').ok_or_else(|| MenuKeyParseError(value.to_owned()))?;
        let channel_id =
            channel.parse::<ChannelId>().map_err(|_| MenuKeyParseError(value.to_owned()))?;
        let message_id =
            message.parse::<MessageId>().map_err(|_| MenuKeyParseError(value.to_owned()))?;
        Ok(Self { channel_id, message_id })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEntry {
    pub symbol: ReactionSymbol,
    pub role_id: RoleId,
}

pub type Bindings = BTreeMap<ReactionSymbol, RoleId>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedMenu {
    pub key: MenuKey,
    pub bindings: Bindings,
}

/// Every persisted menu, keyed and ordered by [`MenuKey`].
///
/// Menus without bindings are never held: inserting an empty binding map
/// removes the key instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MenuCollection {
    menus: BTreeMap<MenuKey, Bindings>,
}

impl MenuCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MenuKey) -> Option<&Bindings> {
        self.menus.get(key)
    }

    pub fn contains(&self, key: &MenuKey) -> bool {
        self.menus.contains_key(key)
    }

    /// Replaces the whole menu under `key`; returns the previous bindings.
    pub fn insert(&mut self, key: MenuKey, bindings: Bindings) -> Option<Bindings> {
        if bindings.is_empty() {
            return self.menus.remove(&key);
        }
        self.menus.insert(key, bindings)
    }

    pub fn remove(&mut self, key: &MenuKey) -> Option<Bindings> {
        self.menus.remove(key)
    }

    pub fn keys(&self) -> Vec<MenuKey> {
        self.menus.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.menus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.menus.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MenuKey, &Bindings)> {
        self.menus.iter()
    }

    pub fn menus(&self) -> impl Iterator<Item = PersistedMenu> + '_ {
        self.menus
            .iter()
            .map(|(key, bindings)| PersistedMenu { key: *key, bindings: bindings.clone() })
    }
}

impl FromIterator<PersistedMenu> for MenuCollection {
    fn from_iter<T: IntoIterator<Item = PersistedMenu>>(iter: T) -> Self {
        let mut collection = Self::new();
        for menu in iter {
            collection.insert(menu.key, menu.bindings);
        }
        collection
    }
}
