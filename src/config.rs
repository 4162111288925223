//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf, time::Duration};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub profile: ProfileConfig,
    pub instance: InstanceConfig,
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "social.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://social.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }

    /// IRI of the single local actor.
    pub fn actor_iri(&self) -> String {
        format!("{}/profile", self.base_url())
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Seed values for the single stored profile
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Preferred handle (the `user` in `user@domain`)
    #[serde(default = "default_profile_handle")]
    pub handle: String,
    /// Display name
    #[serde(default = "default_profile_display_name")]
    pub display_name: String,
    /// Bio shown as the actor summary
    #[serde(default)]
    pub bio: String,
    /// Avatar image URL
    pub avatar_url: Option<String>,
}

fn default_profile_handle() -> String {
    "admin".to_string()
}

fn default_profile_display_name() -> String {
    "Admin".to_string()
}

/// Instance metadata
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Node name advertised by NodeInfo
    pub title: String,
    /// Node description fallback when the profile bio is empty
    #[serde(default)]
    pub description: String,
}

/// Federation engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Disable the SSRF guard on actor fetches (local development only)
    #[serde(default)]
    pub dev_mode: bool,
    /// Deliveries released per minute by the pacing loop
    pub delivery_rate_per_minute: u32,
    /// Pending delivery jobs before `enqueue` applies back-pressure
    pub queue_capacity: usize,
    /// Concurrent deliveries allowed past the pacing gate
    pub max_in_flight: usize,
    /// Deadline for a single delivery attempt
    pub delivery_timeout_seconds: u64,
    /// Deadline for a remote actor fetch
    pub fetch_timeout_seconds: u64,
}

impl FederationConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            delivery_rate_per_minute: 100,
            queue_capacity: 100,
            max_in_flight: 16,
            delivery_timeout_seconds: 30,
            fetch_timeout_seconds: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (SOLOFED__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let defaults = FederationConfig::default();
        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/solofed.db")?
            .set_default("profile.handle", default_profile_handle())?
            .set_default("profile.display_name", default_profile_display_name())?
            .set_default("instance.title", "solofed")?
            .set_default("federation.dev_mode", false)?
            .set_default(
                "federation.delivery_rate_per_minute",
                defaults.delivery_rate_per_minute,
            )?
            .set_default("federation.queue_capacity", defaults.queue_capacity as u64)?
            .set_default("federation.max_in_flight", defaults.max_in_flight as u64)?
            .set_default(
                "federation.delivery_timeout_seconds",
                defaults.delivery_timeout_seconds,
            )?
            .set_default(
                "federation.fetch_timeout_seconds",
                defaults.fetch_timeout_seconds,
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SOLOFED")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        let protocol = self.server.protocol.as_str();
        if protocol != "http" && protocol != "https" {
            return Err(AppError::Config(format!(
                "server.protocol must be http or https, got {}",
                protocol
            )));
        }

        if protocol == "http" && !is_local_server_domain(&self.server.domain) {
            return Err(AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        if self.profile.handle.trim().is_empty() {
            return Err(AppError::Config(
                "profile.handle must not be empty".to_string(),
            ));
        }

        let federation = &self.federation;
        if federation.delivery_rate_per_minute == 0 {
            return Err(AppError::Config(
                "federation.delivery_rate_per_minute must be greater than 0".to_string(),
            ));
        }
        if federation.queue_capacity == 0 || federation.max_in_flight == 0 {
            return Err(AppError::Config(
                "federation.queue_capacity and federation.max_in_flight must be greater than 0"
                    .to_string(),
            ));
        }
        if federation.delivery_timeout_seconds == 0 || federation.fetch_timeout_seconds == 0 {
            return Err(AppError::Config(
                "federation timeouts must be greater than 0".to_string(),
            ));
        }

        if federation.dev_mode {
            tracing::warn!("federation.dev_mode is enabled; actor fetches skip the SSRF guard");
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/solofed-test.db"),
            },
            profile: ProfileConfig {
                handle: "alice".to_string(),
                display_name: "Alice".to_string(),
                bio: "Test bio".to_string(),
                avatar_url: None,
            },
            instance: InstanceConfig {
                title: "solofed".to_string(),
                description: "Test instance".to_string(),
            },
            federation: FederationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_accepts_http_on_localhost_with_port() {
        let mut config = valid_config();
        config.server.domain = "localhost:8080".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "social.example.com".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_unknown_protocol() {
        let mut config = valid_config();
        config.server.protocol = "gopher".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_delivery_rate() {
        let mut config = valid_config();
        config.federation.delivery_rate_per_minute = 0;

        let error = config.validate().expect_err("zero rate must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("delivery_rate_per_minute")
        ));
    }

    #[test]
    fn base_url_and_actor_iri_use_protocol_and_domain() {
        let mut config = valid_config();
        config.server.domain = "social.example.com".to_string();
        config.server.protocol = "https".to_string();
        assert_eq!(config.server.base_url(), "https://social.example.com");
        assert_eq!(
            config.server.actor_iri(),
            "https://social.example.com/profile"
        );
    }
}
