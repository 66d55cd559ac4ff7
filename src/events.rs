//! Public bot events
//!
//! Everything the bot reports to its owner goes through [`BotEvent`]; no
//! error from the session or the bots API is raised any other way.

use serde::Serialize;

use crate::faye::Subject;

/// Event delivered to observers of a [`crate::Bot`]
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    /// The user stream is live
    Connected,
    /// The push connection closed
    Disconnected { reason: Option<String> },
    /// The push connection could not be opened
    ConnectFailed { error: String },
    /// A message was posted in a subscribed stream
    Message(Subject),
    /// A bot was created for a group
    BotCreated(BotCreated),
}

/// Details of a newly created bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotCreated {
    pub name: String,
    pub group_id: String,
    pub bot_id: String,
}
