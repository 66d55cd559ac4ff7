//! GroupMe Bots
//!
//! Outbound side of the bot: each joined group gets a GroupMe bot, created
//! through the REST API, and text is posted into a group through its bot.
//!
//! - **Actuator**: the REST operations the bot relies on
//! - **Client**: [`Actuator`] implementation over `reqwest`
//! - **Registry**: group id → bot id

mod client;
mod registry;

pub use client::{GroupMeClient, GroupMeConfig};
pub use registry::BotRegistry;

use async_trait::async_trait;
use thiserror::Error;

/// Remote operations on GroupMe bots
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Create a bot named `name` in `group_id`, returning its bot id
    async fn create_bot(&self, name: &str, group_id: &str) -> Result<String, ActuatorError>;

    /// Post `text` through the bot `bot_id`
    async fn post_message(&self, bot_id: &str, text: &str) -> Result<(), ActuatorError>;
}

/// Errors that can occur when calling the bots API
#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("GroupMe API unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Bot creation rejected with code {code}")]
    Rejected { code: u16 },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ActuatorError {
    fn from_send(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ActuatorError::Timeout
        } else if e.is_connect() {
            ActuatorError::Unavailable
        } else {
            ActuatorError::Request(e)
        }
    }
}
