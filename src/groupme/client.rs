//! GroupMe REST API Client
//!
//! HTTP client for the bots endpoints of the GroupMe v3 API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{Actuator, ActuatorError};
use crate::config::Config;

/// Code GroupMe embeds in `meta.code` when a bot was created
const CREATED: u16 = 201;

/// GroupMe REST API client
pub struct GroupMeClient {
    client: Client,
    config: GroupMeConfig,
}

/// Configuration for the GroupMe client
#[derive(Debug, Clone)]
pub struct GroupMeConfig {
    /// Base URL for the API (e.g., "https://api.groupme.com/v3")
    pub base_url: String,
    /// Access token passed as the `token` query parameter
    pub access_token: String,
    /// Timeout applied to each request
    pub request_timeout: Duration,
}

impl GroupMeConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    /// Client settings taken from the loaded config
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.endpoints.api_url.clone(),
            access_token: config.bot.access_token.clone(),
            request_timeout: config.endpoints.request_timeout(),
        }
    }
}

impl Default for GroupMeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groupme.com/v3".to_string(),
            access_token: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl GroupMeClient {
    /// Create a new client with the given configuration
    pub fn new(config: GroupMeConfig) -> Result<Self, ActuatorError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("groupmebot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &GroupMeConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Actuator for GroupMeClient {
    async fn create_bot(&self, name: &str, group_id: &str) -> Result<String, ActuatorError> {
        let response = self
            .client
            .post(self.url("bots"))
            .query(&[("token", self.config.access_token.as_str())])
            .form(&[("bot[name]", name), ("bot[group_id]", group_id)])
            .send()
            .await
            .map_err(ActuatorError::from_send)?;

        let status = response.status();
        let body = response.text().await.map_err(ActuatorError::Request)?;
        let parsed: CreateBotResponse = serde_json::from_str(&body).map_err(|e| {
            ActuatorError::MalformedResponse(format!("status {}: {}", status.as_u16(), e))
        })?;

        if parsed.meta.code != CREATED {
            return Err(ActuatorError::Rejected {
                code: parsed.meta.code,
            });
        }

        parsed
            .response
            .map(|r| r.bot.bot_id)
            .ok_or_else(|| ActuatorError::MalformedResponse("missing response.bot".to_string()))
    }

    async fn post_message(&self, bot_id: &str, text: &str) -> Result<(), ActuatorError> {
        let response = self
            .client
            .post(self.url("bots/post"))
            .query(&[("token", self.config.access_token.as_str())])
            .form(&[("bot_id", bot_id), ("text", text)])
            .send()
            .await
            .map_err(ActuatorError::from_send)?;

        // The API answers 202 with an empty body; the status is not checked
        tracing::trace!(bot_id = %bot_id, status = %response.status(), "Message posted");
        Ok(())
    }
}

// ============================================
// Response DTOs
// ============================================

#[derive(Debug, Deserialize)]
struct CreateBotResponse {
    meta: Meta,
    #[serde(default)]
    response: Option<CreateBotBody>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    code: u16,
}

#[derive(Debug, Deserialize)]
struct CreateBotBody {
    bot: BotInfo,
}

#[derive(Debug, Deserialize)]
struct BotInfo {
    bot_id: String,
}
