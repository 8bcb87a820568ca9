use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rolecall_core::store::{decode_menus, encode_menus};
use rolecall_core::{BindingStore, MenuCollection, StoreError};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// The canonical store: one pretty-printed JSON document.
///
/// `save` writes a uniquely named sibling file, syncs it and renames it over
/// the target, so a crash leaves either the old or the new document.
pub struct JsonFileBindingStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl JsonFileBindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), writer: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name =
            self.path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        self.path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()))
    }

    fn corrupt_backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let file_name =
            self.path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        self.path.with_file_name(format!("{file_name}.corrupt-{stamp}"))
    }

    async fn preserve_corrupt_copy(&self) {
        let backup = self.corrupt_backup_path();
        match fs::copy(&self.path, &backup).await {
            Ok(_) => warn!(
                event_name = "system.store.corrupt_preserved",
                backup = %backup.display(),
                "unreadable binding store copied aside"
            ),
            Err(error) => warn!(
                event_name = "system.store.corrupt_backup_failed",
                error = %error,
                "could not copy unreadable binding store aside"
            ),
        }
    }

    async fn write_atomically(&self, contents: &[u8]) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let written = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(contents).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, &self.path).await
        }
        .await;

        if written.is_err() {
            let _ = fs::remove_file(&temp).await;
        }
        written
    }
}

#[async_trait::async_trait]
impl BindingStore for JsonFileBindingStore {
    async fn load(&self) -> Result<MenuCollection, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(MenuCollection::new()),
            Err(source) => return Err(StoreError::Read { path: self.path.clone(), source }),
        };

        let decoded = String::from_utf8(bytes)
            .map_err(|error| error.to_string())
            .and_then(|raw| decode_menus(&raw).map_err(|error| error.to_string()));

        match decoded {
            Ok(decoded) => {
                for skipped in &decoded.skipped {
                    warn!(
                        event_name = "system.store.entry_skipped",
                        entry = %skipped.key,
                        reason = %skipped.reason,
                        "ignoring unusable binding store entry"
                    );
                }
                Ok(decoded.menus)
            }
            Err(error) => {
                warn!(
                    event_name = "system.store.corrupt",
                    path = %self.path.display(),
                    error = %error,
                    "binding store is not valid JSON; starting with no menus"
                );
                self.preserve_corrupt_copy().await;
                Ok(MenuCollection::new())
            }
        }
    }

    async fn save(&self, menus: &MenuCollection) -> Result<(), StoreError> {
        let encoded = encode_menus(menus)?;
        let _writer = self.writer.lock().await;
        self.write_atomically(encoded.as_bytes())
            .await
            .map_err(|source| StoreError::Write { path: self.path.clone(), source })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    /// A missing file is fine as long as its directory can be created later.
    async fn check(&self) -> Result<(), StoreError> {
        match fs::metadata(&self.path).await {
            Ok(metadata) if metadata.is_file() => Ok(()),
            Ok(_) => Err(StoreError::Read {
                path: self.path.clone(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
            }),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Read { path: self.path.clone(), source }),
        }
    }
}
