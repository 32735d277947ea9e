use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::message_database::DEFAULT_MAX_MESSAGES;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Glob handed to Tera.
    pub templates: String,
    pub static_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestbookSettings {
    pub max_messages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub guestbook: GuestbookSettings,
    pub rate_limit: RateLimitSettings,
}

impl Settings {
    /// Defaults, then `config/default.toml`, then the file named by
    /// `GUESTBOOK_CONFIG`, then `GUESTBOOK__SECTION__KEY` variables, then `PORT`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false));

        if let Ok(path) = std::env::var("GUESTBOOK_CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }

        builder
            .add_source(
                Environment::with_prefix("GUESTBOOK")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .build()?
            .try_deserialize()
    }

    pub(crate) fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.templates", "templates/*.html")?
            .set_default("server.static_dir", "static")?
            .set_default("database.url", "sqlite://guestbook.db")?
            .set_default("database.max_connections", 5)?
            .set_default("guestbook.max_messages", i64::from(DEFAULT_MAX_MESSAGES))?
            .set_default("rate_limit.max_requests", 5)?
            .set_default("rate_limit.window_secs", 15 * 60)?
            .set_default("rate_limit.trust_proxy_headers", false)
    }
}
