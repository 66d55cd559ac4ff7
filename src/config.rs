//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of the bot and the groups it joins
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotConfig {
    /// GroupMe user whose stream is subscribed
    #[serde(default)]
    pub user_id: String,

    /// Access token used for the push channel and the bots API
    #[serde(default)]
    pub access_token: String,

    /// Display name given to every bot created
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// Groups to subscribe to and create bots in, in order
    #[serde(default)]
    pub groups: Vec<String>,
}

fn default_bot_name() -> String {
    "groupmebot".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            access_token: String::new(),
            bot_name: default_bot_name(),
            groups: Vec::new(),
        }
    }
}

impl BotConfig {
    /// Create a bot configuration with no groups
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    /// Set the display name for created bots
    pub fn bot_name(mut self, name: impl Into<String>) -> Self {
        self.bot_name = name.into();
        self
    }

    /// Add a group to join
    pub fn group(mut self, group_id: impl Into<String>) -> Self {
        self.groups.push(group_id.into());
        self
    }
}

/// Remote endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_push_url")]
    pub push_url: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_push_url() -> String {
    "wss://push.groupme.com/faye".to_string()
}

fn default_api_url() -> String {
    "https://api.groupme.com/v3".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl EndpointsConfig {
    /// Timeout applied to each bots API request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            push_url: default_push_url(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("groupmebot").join("config.toml")),
            Some(PathBuf::from("./groupmebot.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check that the settings needed to connect are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.user_id.is_empty() {
            return Err(ConfigError::Missing("bot.user_id"));
        }
        self.validate_token()
    }

    /// Check only what the bots API needs
    pub fn validate_token(&self) -> Result<(), ConfigError> {
        if self.bot.access_token.is_empty() {
            return Err(ConfigError::Missing("bot.access_token"));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Bot overrides
        if let Some(user_id) = lookup("GROUPMEBOT_USER_ID") {
            self.bot.user_id = user_id;
        }
        if let Some(token) = lookup("GROUPMEBOT_ACCESS_TOKEN") {
            self.bot.access_token = token;
        }
        if let Some(name) = lookup("GROUPMEBOT_BOT_NAME") {
            self.bot.bot_name = name;
        }
        if let Some(groups) = lookup("GROUPMEBOT_GROUPS") {
            self.bot.groups = groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(String::from)
                .collect();
        }

        // Endpoint overrides
        if let Some(url) = lookup("GROUPMEBOT_PUSH_URL") {
            self.endpoints.push_url = url;
        }
        if let Some(url) = lookup("GROUPMEBOT_API_URL") {
            self.endpoints.api_url = url;
        }

        // Logging overrides
        if let Some(level) = lookup("GROUPMEBOT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("GROUPMEBOT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# groupmebot configuration
#
# Environment variables override these settings:
# - GROUPMEBOT_USER_ID
# - GROUPMEBOT_ACCESS_TOKEN
# - GROUPMEBOT_BOT_NAME
# - GROUPMEBOT_GROUPS (comma separated)
# - GROUPMEBOT_PUSH_URL
# - GROUPMEBOT_API_URL
# - GROUPMEBOT_LOG_LEVEL
# - GROUPMEBOT_LOG_FORMAT

[bot]
# GroupMe user id whose event stream is followed
user_id = ""

# Access token (https://dev.groupme.com)
access_token = ""

# Display name for the bots created in each group
bot_name = "groupmebot"

# Groups to join
groups = []

[endpoints]
# Faye push endpoint
push_url = "wss://push.groupme.com/faye"

# REST API base URL
api_url = "https://api.groupme.com/v3"

# REST request timeout in seconds
request_timeout_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.bot.bot_name, "groupmebot");
        assert!(config.bot.groups.is_empty());
        assert_eq!(config.endpoints.push_url, "wss://push.groupme.com/faye");
        assert_eq!(config.endpoints.api_url, "https://api.groupme.com/v3");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[bot]
user_id = "u1"
access_token = "tok"
groups = ["g1", "g2"]
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.bot.user_id, "u1");
        assert_eq!(config.bot.groups, vec!["g1", "g2"]);
        assert_eq!(config.bot.bot_name, "groupmebot");
        assert_eq!(config.endpoints.request_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[bot").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/groupmebot.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GROUPMEBOT_USER_ID", "u9"),
            ("GROUPMEBOT_GROUPS", "g1, g2,,g3"),
            ("GROUPMEBOT_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.bot.user_id, "u9");
        assert_eq!(config.bot.groups, vec!["g1", "g2", "g3"]);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_missing_token() {
        let mut config = Config::default();
        config.bot.user_id = "u1".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing required setting: bot.access_token");
    }

    #[test]
    fn test_validate_token_ignores_user_id() {
        let mut config = Config::default();
        config.bot.access_token = "tok".to_string();
        assert!(config.validate_token().is_ok());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("bot.user_id"))
        ));
        assert!(matches!(
            Config::default().validate_token(),
            Err(ConfigError::Missing("bot.access_token"))
        ));
    }

    #[test]
    fn test_huge_request_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[endpoints]\nrequest_timeout_secs = {}",
            u64::MAX / 100
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(
            config.endpoints.request_timeout(),
            Duration::from_secs(u64::MAX / 100)
        );
    }

    #[test]
    fn test_bot_config_builder() {
        let bot = BotConfig::new("u1", "tok").bot_name("Bot").group("g1").group("g2");
        assert_eq!(bot.bot_name, "Bot");
        assert_eq!(bot.groups, vec!["g1", "g2"]);
    }
}
