use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rolecall_core::{
    ChannelHandle, ChannelId, GuildId, MenuRender, MessageHandle, MessageId, PlatformError,
    RoleHandle, RoleId, RolePlatform, UserId,
};
use tokio::sync::Mutex;

pub const GUILD: GuildId = GuildId(1);

/// In-memory guild: member roles are a set, so grants and revokes are
/// idempotent the same way the real platform's are.
#[derive(Default)]
pub struct FakeGuild {
    pub missing_channels: HashSet<u64>,
    pub missing_messages: HashSet<u64>,
    pub missing_roles: HashSet<u64>,
    pub grant_delay: Option<Duration>,
    pub member_roles: Mutex<HashSet<(u64, u64)>>,
    pub state_changes: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<MenuRender>>,
    /// `(channel, message)` pairs deleted so far; later fetches of them fail.
    pub deleted: Mutex<Vec<(u64, u64)>>,
    pub next_message: AtomicU64,
}

impl FakeGuild {
    pub fn first_message_id(&self) -> u64 {
        1_000
    }

    pub async fn holds(&self, user: u64, role: u64) -> bool {
        self.member_roles.lock().await.contains(&(user, role))
    }

    pub async fn change_count(&self) -> usize {
        self.state_changes.lock().await.len()
    }
}

#[async_trait]
impl RolePlatform for FakeGuild {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelHandle, PlatformError> {
        if self.missing_channels.contains(&channel_id.get()) {
            return Err(PlatformError::not_found("channel", channel_id));
        }
        Ok(ChannelHandle { channel_id, guild_id: GUILD })
    }

    async fn fetch_message(
        &self,
        channel: &ChannelHandle,
        message_id: MessageId,
    ) -> Result<MessageHandle, PlatformError> {
        let pair = (channel.channel_id.get(), message_id.get());
        let deleted = self.deleted.lock().await.contains(&pair);
        if deleted || self.missing_messages.contains(&message_id.get()) {
            return Err(PlatformError::not_found("message", message_id));
        }
        Ok(MessageHandle { channel_id: channel.channel_id, message_id, guild_id: channel.guild_id })
    }

    async fn fetch_role(&self, guild_id: GuildId, role_id: RoleId) -> Result<RoleHandle, PlatformError> {
        if self.missing_roles.contains(&role_id.get()) {
            return Err(PlatformError::not_found("role", role_id));
        }
        Ok(RoleHandle { guild_id, role_id, name: Some(format!("role {role_id}")) })
    }

    async fn send_menu(
        &self,
        channel: &ChannelHandle,
        render: &MenuRender,
    ) -> Result<MessageHandle, PlatformError> {
        self.sent.lock().await.push(render.clone());
        let message_id = self.first_message_id() + self.next_message.fetch_add(1, Ordering::SeqCst);
        Ok(MessageHandle {
            channel_id: channel.channel_id,
            message_id: MessageId(message_id),
            guild_id: channel.guild_id,
        })
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), PlatformError> {
        self.deleted.lock().await.push((channel_id.get(), message_id.get()));
        Ok(())
    }

    async fn grant_role(&self, _guild_id: GuildId, user_id: UserId, role_id: RoleId) -> Result<(), PlatformError> {
        if let Some(delay) = self.grant_delay {
            tokio::time::sleep(delay).await;
        }
        let inserted = self.member_roles.lock().await.insert((user_id.get(), role_id.get()));
        if inserted {
            self.state_changes.lock().await.push(format!("+{user_id}:{role_id}"));
        }
        Ok(())
    }

    async fn revoke_role(&self, _guild_id: GuildId, user_id: UserId, role_id: RoleId) -> Result<(), PlatformError> {
        let removed = self.member_roles.lock().await.remove(&(user_id.get(), role_id.get()));
        if removed {
            self.state_changes.lock().await.push(format!("-{user_id}:{role_id}"));
        }
        Ok(())
    }
}
