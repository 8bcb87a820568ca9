use std::sync::Arc;

use async_trait::async_trait;
use rolecall_core::{AdminError, ChannelId, GuildId, MenuAdministration, RoleId, UserId};
use thiserror::Error;
use tracing::{info, warn};

use crate::embeds::{self, OutgoingMessage};

/// Names the command group answers to after the prefix.
pub const GROUP_ALIASES: &[&str] = &["reaction_role_menu", "rr", "rrm"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author_id: UserId,
    pub author_roles: Vec<RoleId>,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuCommand {
    Create { title: String, roles: Vec<RoleId>, symbols: Vec<String> },
    Remove { full_id: String },
    List,
    Reload,
    Help,
    Unknown { verb: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("a role menu needs a title, its roles and then one emoji per role")]
    MissingMenuArguments,
    #[error("give the id of the role menu to remove, as `<channelId>-<messageId>`")]
    MissingMenuId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

/// `None` when the message is not addressed to the role menu command group.
pub fn parse_menu_command(
    prefix: &str,
    content: &str,
) -> Option<Result<MenuCommand, CommandParseError>> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let mut tokens = rest.split_whitespace();
    let group = tokens.next()?;
    if !GROUP_ALIASES.iter().any(|alias| alias.eq_ignore_ascii_case(group)) {
        return None;
    }

    let verb = tokens.next().unwrap_or("help").to_ascii_lowercase();
    let args = tokens.collect::<Vec<_>>();
    Some(classify_menu_command(&verb, &args))
}

fn classify_menu_command(verb: &str, args: &[&str]) -> Result<MenuCommand, CommandParseError> {
    match verb {
        "add" | "create" => {
            let Some((title, rest)) = args.split_first() else {
                return Err(CommandParseError::MissingMenuArguments);
            };
            let role_count = rest.iter().take_while(|token| parse_role_token(token).is_some()).count();
            let roles = rest[..role_count].iter().filter_map(|token| parse_role_token(token)).collect();
            let symbols = rest[role_count..].iter().map(|token| (*token).to_owned()).collect();
            Ok(MenuCommand::Create { title: (*title).to_owned(), roles, symbols })
        }
        "remove" | "rmv" | "delete" => match args {
            [] => Err(CommandParseError::MissingMenuId),
            [channel, message, ..] if !channel.contains('-') => {
                Ok(MenuCommand::Remove { full_id: format!("{channel}-{message}") })
            }
            [full_id, ..] => Ok(MenuCommand::Remove { full_id: (*full_id).to_owned() }),
        },
        "list" | "ls" => Ok(MenuCommand::List),
        "reload" | "refresh" => Ok(MenuCommand::Reload),
        "help" => Ok(MenuCommand::Help),
        other => Ok(MenuCommand::Unknown { verb: other.to_owned() }),
    }
}

/// Role mentions (`<@&id>`) or bare ids.
pub fn parse_role_token(token: &str) -> Option<RoleId> {
    let raw = token
        .strip_prefix("<@&")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(token);
    if raw.is_empty() || !raw.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    raw.parse::<RoleId>().ok()
}

/// Who may run the command group. No configured roles lets everyone through.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdminGate {
    admin_role_ids: Vec<RoleId>,
}

impl AdminGate {
    pub fn new(admin_role_ids: Vec<RoleId>) -> Self {
        Self { admin_role_ids }
    }

    pub fn allows(&self, member_roles: &[RoleId]) -> bool {
        self.admin_role_ids.is_empty()
            || member_roles.iter().any(|role| self.admin_role_ids.contains(role))
    }
}

pub struct CommandRouter<S> {
    service: S,
    prefix: String,
}

impl<S> CommandRouter<S>
where
    S: MenuCommandService,
{
    pub fn new(service: S, prefix: impl Into<String>) -> Self {
        Self { service, prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn route(
        &self,
        command: MenuCommand,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        info!(
            event_name = "ingress.discord.command_routed",
            correlation_id = %invocation.correlation_id,
            channel_id = %invocation.channel_id,
            author_id = %invocation.author_id,
            command = command_label(&command),
            "routing role menu command"
        );

        match command {
            MenuCommand::Create { title, roles, symbols } => {
                self.service.create_menu(&title, &roles, &symbols, invocation).await
            }
            MenuCommand::Remove { full_id } => self.service.remove_menu(&full_id, invocation).await,
            MenuCommand::List => self.service.list_menus(invocation).await,
            MenuCommand::Reload => self.service.reload_menus(invocation).await,
            MenuCommand::Help => Ok(embeds::help_message(&self.prefix)),
            MenuCommand::Unknown { verb } => Ok(embeds::error_message(&format!(
                "Unsupported command `{prefix}rr {verb}`. Try `{prefix}rr help`.",
                prefix = self.prefix
            ))),
        }
    }
}

fn command_label(command: &MenuCommand) -> &'static str {
    match command {
        MenuCommand::Create { .. } => "create",
        MenuCommand::Remove { .. } => "remove",
        MenuCommand::List => "list",
        MenuCommand::Reload => "reload",
        MenuCommand::Help => "help",
        MenuCommand::Unknown { .. } => "unknown",
    }
}

#[async_trait]
pub trait MenuCommandService: Send + Sync {
    async fn create_menu(
        &self,
        title: &str,
        roles: &[RoleId],
        symbols: &[String],
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError>;

    async fn remove_menu(
        &self,
        full_id: &str,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError>;

    async fn list_menus(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError>;

    /// Re-reads the store and re-resolves every menu against the platform.
    async fn reload_menus(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError>;
}

#[async_trait]
impl<S> MenuCommandService for Arc<S>
where
    S: MenuCommandService + ?Sized,
{
    async fn create_menu(
        &self,
        title: &str,
        roles: &[RoleId],
        symbols: &[String],
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        (**self).create_menu(title, roles, symbols, invocation).await
    }

    async fn remove_menu(
        &self,
        full_id: &str,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        (**self).remove_menu(full_id, invocation).await
    }

    async fn list_menus(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        (**self).list_menus(invocation).await
    }

    async fn reload_menus(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        (**self).reload_menus(invocation).await
    }
}

/// Administration failures become replies; only the operator needs to see them.
#[async_trait]
impl MenuCommandService for MenuAdministration {
    async fn create_menu(
        &self,
        title: &str,
        roles: &[RoleId],
        symbols: &[String],
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        match self.create(invocation.channel_id, title, roles, symbols).await {
            Ok(created) => Ok(embeds::created_message(&created)),
            Err(AdminError::Validation(error)) => Ok(embeds::validation_message(&error)),
            Err(error) => Ok(admin_failure(&error, invocation)),
        }
    }

    async fn remove_menu(
        &self,
        full_id: &str,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        match self.remove_by_full_id(full_id).await {
            Ok(report) => Ok(embeds::removal_message(&report)),
            Err(error) => Ok(admin_failure(&error, invocation)),
        }
    }

    async fn list_menus(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        match self.list().await {
            Ok(menus) => Ok(embeds::list_message(&menus)),
            Err(error) => Ok(admin_failure(&error, invocation)),
        }
    }

    async fn reload_menus(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        match self.reload().await {
            Ok(report) => Ok(embeds::reload_message(&report)),
            Err(error) => Ok(admin_failure(&error, invocation)),
        }
    }
}

fn admin_failure(error: &AdminError, invocation: &CommandInvocation) -> OutgoingMessage {
    warn!(
        event_name = "ingress.discord.command_failed",
        correlation_id = %invocation.correlation_id,
        channel_id = %invocation.channel_id,
        error = %error,
        "role menu command failed"
    );
    embeds::error_message(&error.user_message())
}

/// Answers every command without touching any state.
#[derive(Default)]
pub struct NoopMenuCommandService;

#[async_trait]
impl MenuCommandService for NoopMenuCommandService {
    async fn create_menu(
        &self,
        title: &str,
        roles: &[RoleId],
        _symbols: &[String],
        _invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        Ok(embeds::error_message(&format!(
            "Role menu administration is offline; `{title}` ({} role(s)) was not created.",
            roles.len()
        )))
    }

    async fn remove_menu(
        &self,
        full_id: &str,
        _invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        Ok(embeds::error_message(&format!(
            "Role menu administration is offline; `{full_id}` was not removed."
        )))
    }

    async fn list_menus(
        &self,
        _invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        Ok(embeds::list_message(&[]))
    }

    async fn reload_menus(
        &self,
        _invocation: &CommandInvocation,
    ) -> Result<OutgoingMessage, CommandRouteError> {
        Ok(embeds::error_message("Role menu administration is offline; nothing was reloaded."))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rolecall_core::{
        BindingStore, Bindings, ChannelHandle, ChannelId, GuildId, InMemoryBindingStore,
        LiveIndex, MenuAdministration, MenuCollection, MenuKey, MenuRender, MessageHandle,
        MessageId, PlatformError, ReactionSymbol, ReconcileOptions, Reconciler, RoleHandle, RoleId,
        RolePlatform, UserId,
    };

    use super::{
        parse_menu_command, parse_role_token, AdminGate, CommandInvocation, CommandParseError,
        CommandRouter, MenuCommand, NoopMenuCommandService,
    };

    /// Message 404 is gone; everything else resolves.
    struct OneDeletedMessage;

    #[async_trait]
    impl RolePlatform for OneDeletedMessage {
        async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelHandle, PlatformError> {
            Ok(ChannelHandle { channel_id, guild_id: GuildId(1) })
        }

        async fn fetch_message(
            &self,
            channel: &ChannelHandle,
            message_id: MessageId,
        ) -> Result<MessageHandle, PlatformError> {
            if message_id == MessageId(404) {
                return Err(PlatformError::not_found("message", message_id));
            }
            Ok(MessageHandle { channel_id: channel.channel_id, message_id, guild_id: GuildId(1) })
        }

        async fn fetch_role(
            &self,
            guild_id: GuildId,
            role_id: RoleId,
        ) -> Result<RoleHandle, PlatformError> {
            Ok(RoleHandle { guild_id, role_id, name: None })
        }

        async fn send_menu(
            &self,
            channel: &ChannelHandle,
            _render: &MenuRender,
        ) -> Result<MessageHandle, PlatformError> {
            Ok(MessageHandle {
                channel_id: channel.channel_id,
                message_id: MessageId(900),
                guild_id: channel.guild_id,
            })
        }

        async fn delete_message(
            &self,
            _channel_id: ChannelId,
            _message_id: MessageId,
        ) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn grant_role(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
            _role_id: RoleId,
        ) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn revoke_role(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
            _role_id: RoleId,
        ) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    fn invocation() -> CommandInvocation {
        CommandInvocation {
            channel_id: ChannelId(10),
            guild_id: None,
            author_id: UserId(7),
            author_roles: Vec::new(),
            correlation_id: "seq-1".to_owned(),
        }
    }

    #[test]
    fn parses_add_with_role_mentions_then_emojis() {
        let parsed = parse_menu_command("!", "!rr add Pick_a_Color <@&111> 222 🔴 <:tetris:900>")
            .expect("addressed to group")
            .expect("parse");

        assert_eq!(
            parsed,
            MenuCommand::Create {
                title: "Pick_a_Color".to_owned(),
                roles: vec![RoleId(111), RoleId(222)],
                symbols: vec!["🔴".to_owned(), "<:tetris:900>".to_owned()],
            }
        );
    }

    #[test]
    fn group_aliases_and_verbs_are_case_insensitive() {
        for content in ["!RRM LIST", "!reaction_role_menu list", "!rr ls"] {
            let parsed = parse_menu_command("!", content).expect("addressed").expect("parse");
            assert_eq!(parsed, MenuCommand::List, "content `{content}`");
        }
    }

    #[test]
    fn other_messages_are_not_commands() {
        assert!(parse_menu_command("!", "hello there").is_none());
        assert!(parse_menu_command("!", "!ping").is_none());
        assert!(parse_menu_command("!", "rr list").is_none());
    }

    #[test]
    fn remove_accepts_full_id_or_two_ids() {
        let joined = parse_menu_command("!", "!rr rmv 10-55").expect("addressed").expect("parse");
        let split = parse_menu_command("!", "!rr remove 10 55").expect("addressed").expect("parse");

        assert_eq!(joined, MenuCommand::Remove { full_id: "10-55".to_owned() });
        assert_eq!(split, joined);
        assert_eq!(
            parse_menu_command("!", "!rr remove").expect("addressed"),
            Err(CommandParseError::MissingMenuId)
        );
    }

    #[test]
    fn bare_group_shows_help() {
        assert_eq!(parse_menu_command("!", "!rr").expect("addressed"), Ok(MenuCommand::Help));
        assert_eq!(
            parse_menu_command("!", "!rr add").expect("addressed"),
            Err(CommandParseError::MissingMenuArguments)
        );
    }

    #[test]
    fn role_tokens() {
        assert_eq!(parse_role_token("<@&42>"), Some(RoleId(42)));
        assert_eq!(parse_role_token("42"), Some(RoleId(42)));
        assert_eq!(parse_role_token("<@42>"), None);
        assert_eq!(parse_role_token("🔥"), None);
    }

    #[test]
    fn admin_gate_without_roles_allows_everyone() {
        assert!(AdminGate::default().allows(&[]));

        let gate = AdminGate::new(vec![RoleId(5)]);
        assert!(gate.allows(&[RoleId(1), RoleId(5)]));
        assert!(!gate.allows(&[RoleId(1)]));
    }

    #[test]
    fn reload_and_refresh_parse_to_reload() {
        for content in ["!rr reload", "!rrm REFRESH"] {
            let parsed = parse_menu_command("!", content).expect("addressed").expect("parse");
            assert_eq!(parsed, MenuCommand::Reload, "content `{content}`");
        }
    }

    #[tokio::test]
    async fn reload_picks_up_menus_edited_outside_the_bot() {
        let store = Arc::new(InMemoryBindingStore::new());
        let index = Arc::new(LiveIndex::new());
        let platform: Arc<dyn RolePlatform> = Arc::new(OneDeletedMessage);
        let admin = Arc::new(MenuAdministration::new(
            store.clone(),
            Arc::clone(&index),
            Arc::clone(&platform),
            Reconciler::new(platform, ReconcileOptions::default()),
        ));

        let mut edited = MenuCollection::new();
        for message in [55, 404] {
            let mut bindings = Bindings::new();
            bindings.insert(ReactionSymbol::parse("🔴").expect("symbol"), RoleId(111));
            edited.insert(MenuKey::new(ChannelId(10), MessageId(message)), bindings);
        }
        store.save(&edited).await.expect("out-of-band edit");
        assert!(index.is_empty().await);

        let router = CommandRouter::new(admin, "!");
        let reply = router.route(MenuCommand::Reload, &invocation()).await.expect("route");

        assert_eq!(index.len().await, 1);
        assert!(index.contains(&MenuKey::new(ChannelId(10), MessageId(55))).await);
        let text = reply.plain_text();
        assert!(text.contains("1 of 2"), "reply was `{text}`");
        assert!(text.contains("10-404"), "reply was `{text}`");
    }

    #[tokio::test]
    async fn router_answers_unknown_verbs_with_guidance() {
        let router = CommandRouter::new(NoopMenuCommandService, "!");
        let reply = router
            .route(MenuCommand::Unknown { verb: "frobnicate".to_owned() }, &invocation())
            .await
            .expect("route");

        assert!(reply.plain_text().contains("Try `!rr help`"));
    }
}
