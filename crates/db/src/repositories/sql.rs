use rolecall_core::{
    BindingStore, Bindings, ChannelId, MenuCollection, MenuKey, MessageId, ReactionSymbol, RoleId,
    StoreError,
};
use sqlx::{sqlite::SqliteRow, Row};
use tokio::sync::Mutex;
use tracing::warn;

use super::RepositoryError;
use crate::DbPool;

/// One row per binding in `role_menu_binding`; ids are stored as text.
pub struct SqlBindingStore {
    pool: DbPool,
    writer: Mutex<()>,
}

impl SqlBindingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, writer: Mutex::new(()) }
    }

    async fn load_rows(&self) -> Result<MenuCollection, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                channel_id,
                message_id,
                symbol,
                role_id
             FROM role_menu_binding
             ORDER BY channel_id, message_id, symbol",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: std::collections::BTreeMap<MenuKey, Bindings> = Default::default();
        for row in rows {
            match binding_from_row(&row) {
                Ok((key, symbol, role_id)) => {
                    grouped.entry(key).or_default().insert(symbol, role_id);
                }
                Err(error) => warn!(
                    event_name = "system.store.entry_skipped",
                    error = %error,
                    "ignoring unusable role_menu_binding row"
                ),
            }
        }

        let mut menus = MenuCollection::new();
        for (key, bindings) in grouped {
            menus.insert(key, bindings);
        }
        Ok(menus)
    }

    async fn replace_rows(&self, menus: &MenuCollection) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM role_menu_binding").execute(&mut *tx).await?;

        for (key, bindings) in menus.iter() {
            for (symbol, role_id) in bindings {
                sqlx::query(
                    "INSERT INTO role_menu_binding (
                        channel_id,
                        message_id,
                        symbol,
                        role_id
                     ) VALUES (?, ?, ?, ?)",
                )
                .bind(key.channel_id.to_string())
                .bind(key.message_id.to_string())
                .bind(symbol.as_str())
                .bind(role_id.to_string())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BindingStore for SqlBindingStore {
    async fn load(&self) -> Result<MenuCollection, StoreError> {
        Ok(self.load_rows().await?)
    }

    async fn save(&self, menus: &MenuCollection) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        Ok(self.replace_rows(menus).await?)
    }

    fn describe(&self) -> String {
        "sqlite:role_menu_binding".to_string()
    }

    async fn check(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM role_menu_binding")
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }
}

fn binding_from_row(
    row: &SqliteRow,
) -> Result<(MenuKey, ReactionSymbol, RoleId), RepositoryError> {
    let channel_id: String = row.try_get("channel_id")?;
    let message_id: String = row.try_get("message_id")?;
    let symbol: String = row.try_get("symbol")?;
    let role_id: String = row.try_get("role_id")?;

    let channel_id = channel_id
        .parse::<ChannelId>()
        .map_err(|error| RepositoryError::Decode(format!("channel_id `{channel_id}`: {error}")))?;
    let message_id = message_id
        .parse::<MessageId>()
        .map_err(|error| RepositoryError::Decode(format!("message_id `{message_id}`: {error}")))?;
    let symbol = ReactionSymbol::parse(&symbol)
        .ok_or_else(|| RepositoryError::Decode(format!("blank symbol for {channel_id}-{message_id}")))?;
    let role_id = role_id
        .parse::<RoleId>()
        .map_err(|error| RepositoryError::Decode(format!("role_id `{role_id}`: {error}")))?;

    Ok((MenuKey::new(channel_id, message_id), symbol, role_id))
}
