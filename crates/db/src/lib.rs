pub mod connection;
pub mod migrations;
pub mod repositories;

use std::sync::Arc;

use rolecall_core::config::{StoreBackend, StoreConfig};
use rolecall_core::{BindingStore, StoreError};
use tracing::info;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{JsonFileBindingStore, RepositoryError, SqlBindingStore};

/// Opens the configured backend. The SQLite backend is migrated before use.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn BindingStore>, StoreError> {
    let store: Arc<dyn BindingStore> = match config.backend {
        StoreBackend::Json => Arc::new(JsonFileBindingStore::new(&config.path)),
        StoreBackend::Sqlite => {
            let pool = connect_with_settings(
                &config.database_url,
                config.max_connections,
                config.timeout_secs,
            )
            .await
            .map_err(RepositoryError::from)?;
            migrations::run_pending(&pool)
                .await
                .map_err(|error| StoreError::Database(error.to_string()))?;
            Arc::new(SqlBindingStore::new(pool))
        }
    };

    info!(
        event_name = "system.store.opened",
        backend = config.backend.as_str(),
        location = %store.describe(),
        "binding store opened"
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rolecall_core::config::{StoreBackend, StoreConfig};
    use tempfile::TempDir;

    use super::open_store;

    fn config(backend: StoreBackend, path: PathBuf, database_url: &str) -> StoreConfig {
        StoreConfig {
            backend,
            path,
            database_url: database_url.to_string(),
            max_connections: 1,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn opens_each_backend() {
        let dir = TempDir::new().expect("tempdir");
        let json = open_store(&config(
            StoreBackend::Json,
            dir.path().join("menus.json"),
            "sqlite::memory:",
        ))
        .await
        .expect("json store");
        assert!(json.describe().ends_with("menus.json"));
        assert!(json.load().await.expect("load").is_empty());

        let sqlite = open_store(&config(StoreBackend::Sqlite, PathBuf::new(), "sqlite::memory:"))
            .await
            .expect("sqlite store");
        assert!(sqlite.load().await.expect("load").is_empty());
    }
}
