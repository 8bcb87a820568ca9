use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::RoleId;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub discord: DiscordConfig,
    pub router: RouterConfig,
    pub reconcile: ReconcileConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
    pub database_url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub command_prefix: String,
    pub admin_role_ids: Vec<RoleId>,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub workers: u32,
    pub queue_capacity: u32,
}

#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    pub max_concurrency: u32,
    pub menu_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub store_backend: Option<StoreBackend>,
    pub store_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub bot_token: Option<String>,
    pub log_level: Option<String>,
    pub router_workers: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                backend: StoreBackend::Json,
                path: PathBuf::from("resources/role_menus.json"),
                database_url: "sqlite://rolecall.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            discord: DiscordConfig {
                bot_token: String::new().into(),
                api_base_url: "https://discord.com/api/v10".to_string(),
                command_prefix: "!".to_string(),
                admin_role_ids: Vec::new(),
                request_timeout_secs: 15,
            },
            router: RouterConfig { workers: 4, queue_capacity: 256 },
            reconcile: ReconcileConfig { max_concurrency: 4, menu_timeout_secs: 10 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported store backend `{other}` (expected json|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

impl DiscordConfig {
    pub fn has_admin_gate(&self) -> bool {
        !self.admin_role_ids.is_empty()
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("rolecall.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(store) = patch.store {
            if let Some(backend) = store.backend {
                self.store.backend = backend;
            }
            if let Some(path) = store.path {
                self.store.path = path;
            }
            if let Some(database_url) = store.database_url {
                self.store.database_url = database_url;
            }
            if let Some(max_connections) = store.max_connections {
                self.store.max_connections = max_connections;
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(discord) = patch.discord {
            if let Some(token) = discord.bot_token {
                self.discord.bot_token = token.into();
            }
            if let Some(api_base_url) = discord.api_base_url {
                self.discord.api_base_url = api_base_url;
            }
            if let Some(command_prefix) = discord.command_prefix {
                self.discord.command_prefix = command_prefix;
            }
            if let Some(admin_role_ids) = discord.admin_role_ids {
                self.discord.admin_role_ids = admin_role_ids
                    .iter()
                    .map(|raw| parse_role_id("discord.admin_role_ids", raw))
                    .collect::<Result<_, _>>()?;
            }
            if let Some(request_timeout_secs) = discord.request_timeout_secs {
                self.discord.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(router) = patch.router {
            if let Some(workers) = router.workers {
                self.router.workers = workers;
            }
            if let Some(queue_capacity) = router.queue_capacity {
                self.router.queue_capacity = queue_capacity;
            }
        }

        if let Some(reconcile) = patch.reconcile {
            if let Some(max_concurrency) = reconcile.max_concurrency {
                self.reconcile.max_concurrency = max_concurrency;
            }
            if let Some(menu_timeout_secs) = reconcile.menu_timeout_secs {
                self.reconcile.menu_timeout_secs = menu_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ROLECALL_STORE_BACKEND") {
            self.store.backend = value.parse()?;
        }
        if let Some(value) = read_env("ROLECALL_STORE_PATH") {
            self.store.path = PathBuf::from(value);
        }
        let database_url =
            read_env("ROLECALL_STORE_DATABASE_URL").or_else(|| read_env("ROLECALL_DATABASE_URL"));
        if let Some(value) = database_url {
            self.store.database_url = value;
        }
        if let Some(value) = read_env("ROLECALL_STORE_MAX_CONNECTIONS") {
            self.store.max_connections = parse_u32("ROLECALL_STORE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ROLECALL_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("ROLECALL_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROLECALL_DISCORD_BOT_TOKEN") {
            self.discord.bot_token = value.into();
        }
        if let Some(value) = read_env("ROLECALL_DISCORD_API_BASE_URL") {
            self.discord.api_base_url = value;
        }
        if let Some(value) = read_env("ROLECALL_DISCORD_COMMAND_PREFIX") {
            self.discord.command_prefix = value;
        }
        if let Some(value) = read_env("ROLECALL_DISCORD_ADMIN_ROLE_IDS") {
            self.discord.admin_role_ids = value
                .split(',')
                .map(str::trim)
                .filter(|raw| !raw.is_empty())
                .map(|raw| parse_role_id("ROLECALL_DISCORD_ADMIN_ROLE_IDS", raw))
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = read_env("ROLECALL_DISCORD_REQUEST_TIMEOUT_SECS") {
            self.discord.request_timeout_secs =
                parse_u64("ROLECALL_DISCORD_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROLECALL_ROUTER_WORKERS") {
            self.router.workers = parse_u32("ROLECALL_ROUTER_WORKERS", &value)?;
        }
        if let Some(value) = read_env("ROLECALL_ROUTER_QUEUE_CAPACITY") {
            self.router.queue_capacity = parse_u32("ROLECALL_ROUTER_QUEUE_CAPACITY", &value)?;
        }

        if let Some(value) = read_env("ROLECALL_RECONCILE_MAX_CONCURRENCY") {
            self.reconcile.max_concurrency =
                parse_u32("ROLECALL_RECONCILE_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = read_env("ROLECALL_RECONCILE_MENU_TIMEOUT_SECS") {
            self.reconcile.menu_timeout_secs =
                parse_u64("ROLECALL_RECONCILE_MENU_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROLECALL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ROLECALL_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("ROLECALL_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("ROLECALL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ROLECALL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("ROLECALL_LOGGING_LEVEL").or_else(|| read_env("ROLECALL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ROLECALL_LOGGING_FORMAT").or_else(|| read_env("ROLECALL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend) = overrides.store_backend {
            self.store.backend = backend;
        }
        if let Some(path) = overrides.store_path {
            self.store.path = path;
        }
        if let Some(database_url) = overrides.database_url {
            self.store.database_url = database_url;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.discord.bot_token = bot_token.into();
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(workers) = overrides.router_workers {
            self.router.workers = workers;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_discord(&self.discord)?;
        validate_router(&self.router)?;
        validate_reconcile(&self.reconcile)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rolecall.toml"), PathBuf::from("config/rolecall.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || !matches!(chars.peek(), Some('{')) {
            output.push(ch);
            continue;
        }
        chars.next();

        let mut key = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(next) => key.push(next),
                None => return Err(ConfigError::UnterminatedInterpolation),
            }
        }

        let value =
            env::var(&key).map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
        output.push_str(&value);
    }

    Ok(output)
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    match store.backend {
        StoreBackend::Json => {
            if store.path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "store.path must not be empty for the json backend".to_string(),
                ));
            }
        }
        StoreBackend::Sqlite => {
            let url = store.database_url.trim();
            let sqlite_url =
                url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
            if !sqlite_url {
                return Err(ConfigError::Validation(
                    "store.database_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                        .to_string(),
                ));
            }
        }
    }

    if store.max_connections == 0 {
        return Err(ConfigError::Validation(
            "store.max_connections must be greater than zero".to_string(),
        ));
    }
    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation("store.timeout_secs must be in range 1..=300".to_string()));
    }

    Ok(())
}

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    let token = discord.bot_token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.bot_token is required. Get it from https://discord.com/developers/applications > Your App > Bot > Token".to_string(),
        ));
    }
    if token.starts_with("Bot ") {
        return Err(ConfigError::Validation(
            "discord.bot_token must be the raw token without the `Bot ` prefix".to_string(),
        ));
    }

    let base_url = discord.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "discord.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    let prefix = &discord.command_prefix;
    if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "discord.command_prefix must be non-empty and contain no whitespace".to_string(),
        ));
    }

    if discord.request_timeout_secs == 0 || discord.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "discord.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_router(router: &RouterConfig) -> Result<(), ConfigError> {
    if router.workers == 0 || router.workers > 64 {
        return Err(ConfigError::Validation("router.workers must be in range 1..=64".to_string()));
    }
    if router.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "router.queue_capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_reconcile(reconcile: &ReconcileConfig) -> Result<(), ConfigError> {
    if reconcile.max_concurrency == 0 {
        return Err(ConfigError::Validation(
            "reconcile.max_concurrency must be greater than zero".to_string(),
        ));
    }
    if reconcile.menu_timeout_secs == 0 || reconcile.menu_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "reconcile.menu_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_role_id(key: &str, value: &str) -> Result<RoleId, ConfigError> {
    value.trim().parse::<RoleId>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    discord: Option<DiscordPatch>,
    router: Option<RouterPatch>,
    reconcile: Option<ReconcilePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    backend: Option<StoreBackend>,
    path: Option<PathBuf>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    command_prefix: Option<String>,
    admin_role_ids: Option<Vec<String>>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterPatch {
    workers: Option<u32>,
    queue_capacity: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconcilePatch {
    max_concurrency: Option<u32>,
    menu_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
