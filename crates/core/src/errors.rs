use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::menu::MenuKey;

/// Malformed administration input. Reported to the operator, never persisted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a role menu needs at least one role and one emoji")]
    EmptyMenu,
    #[error("the number of roles ({roles}) is not the same as the number of emojis ({symbols})")]
    CountMismatch { roles: usize, symbols: usize },
    #[error("emoji #{position} is blank or not an emoji the bot can react with")]
    InvalidSymbol { position: usize },
}

/// Failure reading or writing durable menu state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not read binding store `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not write binding store `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("could not encode binding store: {0}")]
    Encode(String),
    #[error("binding store database failure: {0}")]
    Database(String),
}

/// A call to the remote platform failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("missing permission: {0}")]
    Forbidden(String),
    #[error("platform transport failure: {0}")]
    Transport(String),
    #[error("platform call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected platform response: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("remote platform call failed: {0}")]
    Remote(#[from] PlatformError),
    #[error("there is no registered role menu under `{key}`")]
    NotFound { key: MenuKey, known_keys: Vec<MenuKey> },
    #[error("invalid role menu id `{0}` (expected `<channelId>-<messageId>`)")]
    InvalidMenuId(String),
}

impl AdminError {
    /// Operator-facing text for the command layer.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(error) => format!("{error}, please try again."),
            Self::Store(_) => {
                "The role menu storage is unavailable right now. Please retry shortly.".to_owned()
            }
            Self::Remote(error) => format!("Discord rejected the request: {error}."),
            Self::NotFound { key, known_keys } => {
                let saved = if known_keys.is_empty() {
                    "(none)".to_owned()
                } else {
                    known_keys.iter().map(MenuKey::storage_key).collect::<Vec<_>>().join("\n")
                };
                format!(
                    "There is not a registered role menu under `{key}`.\nThe following is a list of all currently saved menus.\n```\n{saved}\n```"
                )
            }
            Self::InvalidMenuId(raw) => {
                format!("`{raw}` is not a role menu id. Use `<channelId>-<messageId>`.")
            }
        }
    }
}
