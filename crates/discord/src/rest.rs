//! HTTP client for the v10 REST API.
//!
//! Status mapping: 404 becomes `NotFound`, 401/403 become `Forbidden`, any other
//! non-success status or transport failure becomes `Transport`. Request
//! timeouts surface as `Timeout` so reconciliation can classify them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use rolecall_core::config::DiscordConfig;
use rolecall_core::{
    ChannelHandle, ChannelId, GuildId, MenuRender, MessageHandle, MessageId, PlatformError,
    RoleHandle, RoleId, RolePlatform, UserId,
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::embeds::{self, OutgoingMessage};
use crate::gateway::ReplySink;

const USER_AGENT: &str =
    concat!("DiscordBot (https://github.com/rolecall/rolecall, ", env!("CARGO_PKG_VERSION"), ")");

#[derive(Deserialize)]
struct ChannelResponse {
    id: ChannelId,
    #[serde(default)]
    guild_id: Option<GuildId>,
}

#[derive(Deserialize)]
struct MessageResponse {
    id: MessageId,
    channel_id: ChannelId,
}

#[derive(Deserialize)]
struct RoleResponse {
    id: RoleId,
    #[serde(default)]
    name: Option<String>,
}

pub struct DiscordRestClient {
    http: Client,
    base_url: Url,
    token: SecretString,
    request_timeout: Duration,
}

impl DiscordRestClient {
    pub fn new(config: &DiscordConfig) -> Result<Self, PlatformError> {
        Self::with_base_url(
            &config.api_base_url,
            config.bot_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn with_base_url(
        base_url: &str,
        token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| PlatformError::Transport(format!("invalid api base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PlatformError::Transport(format!("`{base_url}` cannot be a base url")));
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|error| PlatformError::Transport(error.to_string()))?;

        Ok(Self { http, base_url, token, request_timeout })
    }

    /// Appends percent-encoded path segments to the base url.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| PlatformError::Transport("api base url cannot take a path".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.token.expose_secret()))
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        entity: &'static str,
        id: u64,
    ) -> Result<Response, PlatformError> {
        let response = request.send().await.map_err(|error| self.transport_error(error))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, entity, id, &body))
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        entity: &'static str,
        id: u64,
    ) -> Result<T, PlatformError> {
        let url = self.endpoint(segments)?;
        let response = self.execute(self.request(Method::GET, url), entity, id).await?;
        response.json::<T>().await.map_err(|error| PlatformError::Decode(error.to_string()))
    }

    fn transport_error(&self, error: reqwest::Error) -> PlatformError {
        if error.is_timeout() {
            PlatformError::Timeout(self.request_timeout)
        } else {
            PlatformError::Transport(error.to_string())
        }
    }

    async fn post_message(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageResponse, PlatformError> {
        let channel = channel_id.to_string();
        let url = self.endpoint(&["channels", &channel, "messages"])?;
        let response = self
            .execute(self.request(Method::POST, url).json(message), "channel", channel_id.get())
            .await?;
        response.json().await.map_err(|error| PlatformError::Decode(error.to_string()))
    }

    async fn member_role(
        &self,
        method: Method,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PlatformError> {
        let (guild, user, role) = (guild_id.to_string(), user_id.to_string(), role_id.to_string());
        let url = self.endpoint(&["guilds", &guild, "members", &user, "roles", &role])?;
        self.execute(self.request(method, url), "member", user_id.get()).await?;
        Ok(())
    }
}

/// Maps a failed HTTP status onto the platform error taxonomy.
pub fn classify_status(
    status: StatusCode,
    entity: &'static str,
    id: u64,
    body: &str,
) -> PlatformError {
    match status {
        StatusCode::NOT_FOUND => PlatformError::not_found(entity, id),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            PlatformError::Forbidden(format!("{entity} `{id}`: {}", body.trim()))
        }
        other => PlatformError::Transport(format!("{entity} `{id}`: HTTP {other}: {}", body.trim())),
    }
}

#[async_trait]
impl RolePlatform for DiscordRestClient {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelHandle, PlatformError> {
        let channel = channel_id.to_string();
        let response: ChannelResponse =
            self.fetch_json(&["channels", &channel], "channel", channel_id.get()).await?;
        let guild_id = response.guild_id.ok_or_else(|| {
            PlatformError::Decode(format!("channel `{channel_id}` is not part of a guild"))
        })?;

        Ok(ChannelHandle { channel_id: response.id, guild_id })
    }

    async fn fetch_message(
        &self,
        channel: &ChannelHandle,
        message_id: MessageId,
    ) -> Result<MessageHandle, PlatformError> {
        let (channel_segment, message) = (channel.channel_id.to_string(), message_id.to_string());
        let response: MessageResponse = self
            .fetch_json(
                &["channels", &channel_segment, "messages", &message],
                "message",
                message_id.get(),
            )
            .await?;

        Ok(MessageHandle {
            channel_id: response.channel_id,
            message_id: response.id,
            guild_id: channel.guild_id,
        })
    }

    async fn fetch_role(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
    ) -> Result<RoleHandle, PlatformError> {
        let (guild, role) = (guild_id.to_string(), role_id.to_string());
        let response: RoleResponse =
            self.fetch_json(&["guilds", &guild, "roles", &role], "role", role_id.get()).await?;

        Ok(RoleHandle { guild_id, role_id: response.id, name: response.name })
    }

    /// A reaction that cannot be attached is logged and skipped; the menu
    /// still works for every symbol a member adds by hand.
    async fn send_menu(
        &self,
        channel: &ChannelHandle,
        render: &MenuRender,
    ) -> Result<MessageHandle, PlatformError> {
        let posted = self.post_message(channel.channel_id, &embeds::menu_message(render)).await?;
        let handle = MessageHandle {
            channel_id: posted.channel_id,
            message_id: posted.id,
            guild_id: channel.guild_id,
        };

        let channel_segment = handle.channel_id.to_string();
        let message = handle.message_id.to_string();
        for symbol in &render.reactions {
            let emoji = symbol.api_form();
            let url = self.endpoint(&[
                "channels",
                &channel_segment,
                "messages",
                &message,
                "reactions",
                &emoji,
                "@me",
            ])?;
            let request = self.request(Method::PUT, url);
            if let Err(error) = self.execute(request, "message", handle.message_id.get()).await {
                warn!(
                    event_name = "egress.discord.reaction_failed",
                    message_id = %handle.message_id,
                    symbol = %symbol,
                    error = %error,
                    "could not attach menu reaction"
                );
            }
        }

        Ok(handle)
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), PlatformError> {
        let (channel, message) = (channel_id.to_string(), message_id.to_string());
        let url = self.endpoint(&["channels", &channel, "messages", &message])?;
        self.execute(self.request(Method::DELETE, url), "message", message_id.get()).await?;
        Ok(())
    }

    async fn grant_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PlatformError> {
        self.member_role(Method::PUT, guild_id, user_id, role_id).await
    }

    async fn revoke_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PlatformError> {
        self.member_role(Method::DELETE, guild_id, user_id, role_id).await
    }
}

#[async_trait]
impl ReplySink for DiscordRestClient {
    async fn post(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let posted = self.post_message(channel_id, message).await?;
        debug!(
            event_name = "egress.discord.reply_posted",
            channel_id = %channel_id,
            message_id = %posted.id,
            "command reply posted"
        );
        Ok(())
    }
}
