pub mod admin;
pub mod config;
pub mod domain;
pub mod errors;
pub mod index;
pub mod platform;
pub mod reconcile;
pub mod router;
pub mod store;
pub mod validator;

pub use admin::{CreatedMenu, MenuAdministration, MenuSummary, RemovalReport};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, StoreBackend};
pub use domain::ids::{ChannelId, EmojiId, GuildId, MessageId, RoleId, UserId};
pub use domain::menu::{BindingEntry, Bindings, MenuCollection, MenuKey, PersistedMenu};
pub use domain::symbol::ReactionSymbol;
pub use errors::{AdminError, PlatformError, StoreError, ValidationError};
pub use index::{LiveIndex, ResolvedMenu};
pub use platform::{ChannelHandle, MenuRender, MessageHandle, RoleHandle, RolePlatform};
pub use reconcile::{ReconcileOptions, ReconcileReport, Reconciler, ResolutionFailure};
pub use router::{
    EventRouter, ReactionDirection, ReactionEvent, RouteOutcome, RouterError, RouterOptions,
    RouterPool,
};
pub use store::{BindingStore, InMemoryBindingStore};
pub use validator::{validate, BindingList};
