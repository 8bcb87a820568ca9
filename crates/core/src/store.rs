use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::ids::RoleId;
use crate::domain::menu::{Bindings, MenuCollection, MenuKey};
use crate::domain::symbol::ReactionSymbol;
use crate::errors::StoreError;

/// Durable home of every menu definition. Both operations work on the whole
/// collection; implementations serialize writers and make `save` crash-atomic.
#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn load(&self) -> Result<MenuCollection, StoreError>;
    async fn save(&self, menus: &MenuCollection) -> Result<(), StoreError>;
    fn describe(&self) -> String;

    /// Cheap readiness check that never touches menu contents.
    async fn check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedMenus {
    pub menus: MenuCollection,
    pub skipped: Vec<SkippedEntry>,
}

/// Renders the durable JSON document: `"<channelId>-<messageId>"` mapped to
/// `{symbol: roleId}`, keys sorted, two-space indent, trailing newline.
pub fn encode_menus(menus: &MenuCollection) -> Result<String, StoreError> {
    let document: BTreeMap<String, BTreeMap<&str, String>> = menus
        .iter()
        .map(|(key, bindings)| {
            let entries = bindings
                .iter()
                .map(|(symbol, role_id)| (symbol.as_str(), role_id.to_string()))
                .collect();
            (key.storage_key(), entries)
        })
        .collect();

    let mut encoded = serde_json::to_string_pretty(&document)
        .map_err(|error| StoreError::Encode(error.to_string()))?;
    encoded.push('\n');
    Ok(encoded)
}

/// Parses the durable JSON document.
///
/// Only a document that is not a JSON object at all is an error. Entries with
/// an unexpected shape are skipped and listed in [`DecodedMenus::skipped`];
/// numeric role ids are accepted and rewritten as strings on the next save.
pub fn decode_menus(raw: &str) -> Result<DecodedMenus, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(DecodedMenus::default());
    }

    let document: BTreeMap<String, Value> = serde_json::from_str(raw)?;
    let mut decoded = DecodedMenus::default();

    for (raw_key, value) in document {
        let Ok(key) = raw_key.parse::<MenuKey>() else {
            decoded.skipped.push(SkippedEntry {
                key: raw_key,
                reason: "key is not `<channelId>-<messageId>`".to_owned(),
            });
            continue;
        };
        let Value::Object(entries) = value else {
            decoded.skipped.push(SkippedEntry {
                key: raw_key,
                reason: "menu is not an object of emoji to role id".to_owned(),
            });
            continue;
        };

        let mut bindings = Bindings::new();
        for (raw_symbol, raw_role) in entries {
            let role_id = match &raw_role {
                Value::String(value) => value.parse::<RoleId>().ok(),
                Value::Number(value) => value.as_u64().map(RoleId),
                _ => None,
            };
            match (ReactionSymbol::parse(&raw_symbol), role_id) {
                (Some(symbol), Some(role_id)) => {
                    bindings.insert(symbol, role_id);
                }
                _ => decoded.skipped.push(SkippedEntry {
                    key: format!("{raw_key} {raw_symbol}"),
                    reason: format!("binding `{raw_symbol}` -> `{raw_role}` is not usable"),
                }),
            }
        }

        if bindings.is_empty() {
            decoded
                .skipped
                .push(SkippedEntry { key: raw_key, reason: "menu has no bindings".to_owned() });
            continue;
        }
        decoded.menus.insert(key, bindings);
    }

    Ok(decoded)
}

/// Volatile store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryBindingStore {
    menus: RwLock<MenuCollection>,
    saves: AtomicUsize,
}

impl InMemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_menus(menus: MenuCollection) -> Self {
        Self { menus: RwLock::new(menus), saves: AtomicUsize::new(0) }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BindingStore for InMemoryBindingStore {
    async fn load(&self) -> Result<MenuCollection, StoreError> {
        Ok(self.menus.read().await.clone())
    }

    async fn save(&self, menus: &MenuCollection) -> Result<(), StoreError> {
        let mut stored = self.menus.write().await;
        *stored = menus.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_owned()
    }
}
