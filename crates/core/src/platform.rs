//! Boundary to the remote chat platform.
//!
//! The engine never talks HTTP itself: reconciliation, routing and
//! administration all go through [`RolePlatform`], which the Discord adapter
//! implements and tests replace with scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
use crate::domain::menu::Bindings;
use crate::domain::symbol::ReactionSymbol;
use crate::errors::PlatformError;

pub const MENU_EMBED_COLOR: u32 = 0x0E151D;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub guild_id: GuildId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleHandle {
    pub guild_id: GuildId,
    pub role_id: RoleId,
    pub name: Option<String>,
}

/// What a freshly created menu looks like on the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuRender {
    pub title: String,
    pub lines: Vec<String>,
    pub color: u32,
    pub reactions: Vec<ReactionSymbol>,
}

impl MenuRender {
    /// Underscores in the title stand for spaces (command arguments are
    /// whitespace separated). One line and one reaction per binding.
    pub fn new(title: &str, bindings: &Bindings, reactions: Vec<ReactionSymbol>) -> Self {
        let lines = bindings
            .iter()
            .map(|(symbol, role_id)| format!("**{symbol} | <@&{role_id}>**"))
            .collect();

        Self { title: title.replace('_', " "), lines, color: MENU_EMBED_COLOR, reactions }
    }

    pub fn description(&self) -> String {
        self.lines.join("\n")
    }
}

#[async_trait]
pub trait RolePlatform: Send + Sync {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelHandle, PlatformError>;

    async fn fetch_message(
        &self,
        channel: &ChannelHandle,
        message_id: MessageId,
    ) -> Result<MessageHandle, PlatformError>;

    async fn fetch_role(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
    ) -> Result<RoleHandle, PlatformError>;

    /// Posts the menu and attaches one reaction per symbol.
    async fn send_menu(
        &self,
        channel: &ChannelHandle,
        render: &MenuRender,
    ) -> Result<MessageHandle, PlatformError>;

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), PlatformError>;

    /// Granting a role the member already holds is a no-op.
    async fn grant_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PlatformError>;

    /// Revoking a role the member does not hold is a no-op.
    async fn revoke_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::{MenuRender, MENU_EMBED_COLOR};
    use crate::domain::ids::RoleId;
    use crate::domain::menu::Bindings;
    use crate::domain::symbol::ReactionSymbol;

    #[test]
    fn render_lists_one_line_per_binding() {
        let red = ReactionSymbol::parse("🔴").expect("symbol");
        let blue = ReactionSymbol::parse("🔵").expect("symbol");
        let mut bindings = Bindings::new();
        bindings.insert(red.clone(), RoleId(111));
        bindings.insert(blue.clone(), RoleId(222));

        let render = MenuRender::new("Pick_a_Color", &bindings, vec![red, blue]);

        assert_eq!(render.title, "Pick a Color");
        assert_eq!(render.color, MENU_EMBED_COLOR);
        assert_eq!(render.lines.len(), 2);
        assert!(render.description().contains("**🔴 | <@&111>**"));
        assert!(render.description().contains("**🔵 | <@&222>**"));
    }
}
