use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rolecall_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One rendered setting: its dotted key, display value and the environment
/// variables that can override it, highest precedence first.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(&field, file_doc.as_ref(), file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let admin_roles = if config.discord.admin_role_ids.is_empty() {
        "<none: every member may manage menus>".to_string()
    } else {
        config.discord.admin_role_ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    };

    vec![
        Field::new("store.backend", config.store.backend.as_str(), &["ROLECALL_STORE_BACKEND"]),
        Field::new(
            "store.path",
            config.store.path.display().to_string(),
            &["ROLECALL_STORE_PATH"],
        ),
        Field::new(
            "store.database_url",
            config.store.database_url.clone(),
            &["ROLECALL_STORE_DATABASE_URL", "ROLECALL_DATABASE_URL"],
        ),
        Field::new(
            "store.max_connections",
            config.store.max_connections.to_string(),
            &["ROLECALL_STORE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "store.timeout_secs",
            config.store.timeout_secs.to_string(),
            &["ROLECALL_STORE_TIMEOUT_SECS"],
        ),
        Field::new(
            "discord.bot_token",
            redact_token(config.discord.bot_token.expose_secret()),
            &["ROLECALL_DISCORD_BOT_TOKEN"],
        ),
        Field::new(
            "discord.api_base_url",
            config.discord.api_base_url.clone(),
            &["ROLECALL_DISCORD_API_BASE_URL"],
        ),
        Field::new(
            "discord.command_prefix",
            config.discord.command_prefix.clone(),
            &["ROLECALL_DISCORD_COMMAND_PREFIX"],
        ),
        Field::new("discord.admin_role_ids", admin_roles, &["ROLECALL_DISCORD_ADMIN_ROLE_IDS"]),
        Field::new(
            "discord.request_timeout_secs",
            config.discord.request_timeout_secs.to_string(),
            &["ROLECALL_DISCORD_REQUEST_TIMEOUT_SECS"],
        ),
        Field::new("router.workers", config.router.workers.to_string(), &["ROLECALL_ROUTER_WORKERS"]),
        Field::new(
            "router.queue_capacity",
            config.router.queue_capacity.to_string(),
            &["ROLECALL_ROUTER_QUEUE_CAPACITY"],
        ),
        Field::new(
            "reconcile.max_concurrency",
            config.reconcile.max_concurrency.to_string(),
            &["ROLECALL_RECONCILE_MAX_CONCURRENCY"],
        ),
        Field::new(
            "reconcile.menu_timeout_secs",
            config.reconcile.menu_timeout_secs.to_string(),
            &["ROLECALL_RECONCILE_MENU_TIMEOUT_SECS"],
        ),
        Field::new(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["ROLECALL_SERVER_BIND_ADDRESS"],
        ),
        Field::new(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["ROLECALL_SERVER_HEALTH_CHECK_PORT"],
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["ROLECALL_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "logging.level",
            config.logging.level.clone(),
            &["ROLECALL_LOGGING_LEVEL", "ROLECALL_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["ROLECALL_LOGGING_FORMAT", "ROLECALL_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("rolecall.toml"), PathBuf::from("config/rolecall.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if file_doc.is_some_and(|doc| contains_path(doc, field.key)) {
        let file_path = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the first four characters so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.char_indices().nth(4) {
        Some((cut, _)) if trimmed.len() > 8 => format!("{}***", &trimmed[..cut]),
        _ => "<redacted>".to_string(),
    }
}
