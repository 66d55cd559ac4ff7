//! # groupmebot
//!
//! GroupMe bot client: follows a user's and a set of groups' real-time
//! streams over the Faye push service, and posts back into those groups
//! through per-group bots created with the REST API.
//!
//! ## Modules
//!
//! - [`faye`]: push protocol frames, channel dispatch and the session state machine
//! - [`transport`]: the socket under the session
//! - [`groupme`]: bots API client and the group → bot registry
//! - [`bot`]: the [`Bot`] driving all of the above
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use groupmebot::{Bot, BotEvent, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let bot = Bot::from_config(&config)?;
//!     let mut events = bot.subscribe();
//!
//!     bot.connect().await;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             BotEvent::Message(subject) if subject.text() == "ping" => {
//!                 bot.post_message("pong", subject.group_id()).await;
//!             }
//!             BotEvent::Disconnected { .. } | BotEvent::ConnectFailed { .. } => break,
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod events;
pub mod faye;
pub mod groupme;
pub mod transport;

pub use bot::{Bot, BotError, CLOSED_BY_CLIENT};

pub use config::{BotConfig, Config, ConfigError, EndpointsConfig, LoggingConfig};

pub use events::{BotCreated, BotEvent};

pub use faye::{Action, InboundFrame, OutboundFrame, Session, SessionState, Subject};

pub use groupme::{Actuator, ActuatorError, BotRegistry, GroupMeClient, GroupMeConfig};

pub use transport::{Connection, Transport, TransportError, TransportEvent, WebSocketTransport};
