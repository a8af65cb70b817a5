use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::service::relay::BotHandle;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub mastodon: MastodonConfig,
    pub glacier: GlacierConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

/// Connection settings for the bot account on its home instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MastodonConfig {
    /// Host name of the instance, e.g. `mastodon.social`
    pub instance: String,
    pub access_token: String,
    /// Bot handle, e.g. `@glacier@mastodon.social`. Mentioning it opts a status in.
    pub handle: String,
    pub read_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    /// Events buffered per subscription before the upstream reader is back-pressured
    pub stream_buffer: usize,
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            instance: String::new(),
            access_token: String::new(),
            handle: String::new(),
            read_timeout_seconds: 240,
            connect_timeout_seconds: 10,
            stream_buffer: 256,
        }
    }
}

impl MastodonConfig {
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlacierConfig {
    /// Domain the walls are served from; embeddability is evaluated against it.
    pub domain: String,
    pub disconnect_grace_seconds: u64,
    /// Upper bound for the HEAD request that checks whether a status may be framed
    pub embed_check_timeout_seconds: u64,
    /// Trust all upstream TLS certificates (local development only)
    pub dev_mode: bool,
    pub operator: OperatorConfig,
}

impl Default for GlacierConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            disconnect_grace_seconds: 300, // survives a page reload
            embed_check_timeout_seconds: 5,
            dev_mode: false,
            operator: OperatorConfig::default(),
        }
    }
}

impl GlacierConfig {
    #[must_use]
    pub const fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_seconds)
    }

    #[must_use]
    pub const fn embed_check_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_check_timeout_seconds)
    }
}

/// Imprint information shown on the legal page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub name: String,
    pub street_and_number: String,
    pub zipcode: String,
    pub city: String,
    pub country: String,
    pub phone: String,
    pub mail: String,
    pub website: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // GLACIER_MASTODON__INSTANCE, GLACIER_GLACIER__DOMAIN, ...
        builder = builder.add_source(
            Environment::with_prefix("GLACIER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Collect every misconfiguration instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.glacier.domain.trim().is_empty() {
            errors.push("glacier.domain must be set".to_string());
        }
        if self.glacier.disconnect_grace_seconds == 0 {
            errors.push("glacier.disconnect_grace_seconds must be greater than 0".to_string());
        }
        if self.glacier.embed_check_timeout_seconds == 0 {
            errors.push("glacier.embed_check_timeout_seconds must be greater than 0".to_string());
        }
        if self.mastodon.instance.trim().is_empty() {
            errors.push("mastodon.instance must be set".to_string());
        }
        if let Err(e) = BotHandle::parse(&self.mastodon.handle) {
            errors.push(format!("mastodon.handle: {e}"));
        }
        if self.mastodon.stream_buffer == 0 {
            errors.push("mastodon.stream_buffer must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}
