use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::gateway::PollPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// API key for the assistant service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Postgres connection string for the session store
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Session store provider (`postgres` or `memory`)
    #[arg(long, env = "PERSISTENCE_PROVIDER")]
    pub persistence_provider: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// `slug → assistant id` rows seeded into the in-memory store.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
    /// Empty means any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub poll_interval_ms: u64,
    pub run_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.run_timeout_secs),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct PersistenceConfig {
    pub provider: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl std::fmt::Debug for PersistenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceConfig")
            .field("provider", &self.provider)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<redacted>"),
            )
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Contact-solicitation behaviour of a chat turn.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// Attach `contact_instruction` to runs until the session is flagged.
    pub contact_prompt_enabled: bool,
    pub contact_instruction: String,
    /// Case-insensitive phrases that mark a reply as asking for contact details.
    pub contact_phrases: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            contact_prompt_enabled: true,
            contact_instruction: "If it fits naturally in the conversation, politely ask the \
                user for their name and an email address or phone number so the team can \
                follow up."
                .to_string(),
            contact_phrases: [
                "email address",
                "phone number",
                "contact information",
                "contact details",
                "best way to reach you",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_secs", 180)?
            .set_default("server.body_limit_bytes", 1024 * 1024)?
            .set_default("gateway.base_url", "https://api.openai.com")?
            .set_default("gateway.api_key", "")?
            .set_default("gateway.poll_interval_ms", 1000)?
            .set_default("gateway.run_timeout_secs", 120)?
            .set_default("gateway.request_timeout_secs", 30)?
            .set_default("persistence.provider", "postgres")?
            .set_default("persistence.max_connections", 5)?;

        // 2. Config file: explicit path, else an optional ./config.{yaml,toml,...}
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables (prefixed with PROXY_), e.g. PROXY_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("PROXY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.cors_allowed_origins")
                .with_list_parse_key("chat.contact_phrases"),
        );

        // 4. CLI flags and their conventional env vars win over everything else
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(key) = cli.openai_api_key {
            builder = builder.set_override("gateway.api_key", key)?;
        }
        if let Some(url) = cli.database_url {
            builder = builder.set_override("persistence.database_url", url)?;
        }
        if let Some(provider) = cli.persistence_provider {
            builder = builder.set_override("persistence.provider", provider)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.gateway.api_key.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "missing assistant API key: set OPENAI_API_KEY or gateway.api_key".to_string(),
            ));
        }
        if self.gateway.poll_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "gateway.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if Duration::from_secs(self.gateway.run_timeout_secs)
            < Duration::from_millis(self.gateway.poll_interval_ms)
        {
            return Err(config::ConfigError::Message(
                "gateway.run_timeout_secs must cover at least one poll interval".to_string(),
            ));
        }
        Ok(())
    }
}
