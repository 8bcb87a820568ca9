//! Discord integration for rolecall
//!
//! - **Gateway** (`gateway`) - envelope pump with reconnection logic
//! - **Events** (`events`) - dispatch frames decoded into typed events and routed to handlers
//! - **Commands** (`commands`) - the `!rr` command group that administers role menus
//! - **Embeds** (`embeds`) - outgoing message builders
//! - **REST** (`rest`) - `RolePlatform` over the v10 HTTP API
//!
//! ```text
//! Gateway → EventDispatcher → ReactionHandler → RouterPool → grant/revoke
//!                           ↘ CommandHandler → MenuAdministration
//!                                  ↓
//!                           ReplySink ← embeds
//! ```

pub mod commands;
pub mod embeds;
pub mod events;
pub mod gateway;
pub mod rest;

pub use events::{default_dispatcher, BotIdentity, EventDispatcher, GatewayEnvelope, GatewayEvent};
pub use gateway::{GatewayRunner, GatewayTransport, NoopGatewayTransport, ReconnectPolicy, ReplySink};
pub use rest::DiscordRestClient;
