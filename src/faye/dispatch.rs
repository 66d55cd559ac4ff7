//! Channel Dispatch
//!
//! Maps channel names to the handler that owns them. Meta channels are
//! registered up front; stream channels are added as the session subscribes
//! to them.

use std::collections::HashMap;

use super::messages::{
    group_channel, user_channel, InboundFrame, CONNECT_CHANNEL, HANDSHAKE_CHANNEL,
    SUBSCRIBE_CHANNEL,
};

/// Handler a channel is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Handshake,
    Connect,
    Subscribe,
    UserStream,
    GroupStream { group_id: String },
}

/// An inbound frame resolved to its handler
#[derive(Debug, Clone)]
pub enum Inbound {
    Handshake(InboundFrame),
    Connect(InboundFrame),
    Subscribe(InboundFrame),
    UserStream(InboundFrame),
    GroupStream {
        group_id: String,
        frame: InboundFrame,
    },
}

/// Channel name → handler table
#[derive(Debug, Clone)]
pub struct SubscriptionTable {
    routes: HashMap<String, Route>,
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionTable {
    /// Create a table holding only the meta channels
    pub fn new() -> Self {
        let mut routes = HashMap::new();
        routes.insert(HANDSHAKE_CHANNEL.to_string(), Route::Handshake);
        routes.insert(CONNECT_CHANNEL.to_string(), Route::Connect);
        routes.insert(SUBSCRIBE_CHANNEL.to_string(), Route::Subscribe);
        Self { routes }
    }

    /// Bind a user's stream channel, replacing any previous binding
    pub fn register_user(&mut self, user_id: &str) -> String {
        let channel = user_channel(user_id);
        self.routes.insert(channel.clone(), Route::UserStream);
        channel
    }

    /// Bind a group's stream channel, replacing any previous binding
    pub fn register_group(&mut self, group_id: &str) -> String {
        let channel = group_channel(group_id);
        self.routes.insert(
            channel.clone(),
            Route::GroupStream {
                group_id: group_id.to_string(),
            },
        );
        channel
    }

    /// Handler bound to a channel, if any
    pub fn route(&self, channel: &str) -> Option<&Route> {
        self.routes.get(channel)
    }

    /// Resolve a frame to its handler
    ///
    /// Frames on unbound channels come back as `None` and are dropped by the
    /// caller.
    pub fn dispatch(&self, frame: InboundFrame) -> Option<Inbound> {
        let inbound = match self.routes.get(&frame.channel)? {
            Route::Handshake => Inbound::Handshake(frame),
            Route::Connect => Inbound::Connect(frame),
            Route::Subscribe => Inbound::Subscribe(frame),
            Route::UserStream => Inbound::UserStream(frame),
            Route::GroupStream { group_id } => Inbound::GroupStream {
                group_id: group_id.clone(),
                frame,
            },
        };
        Some(inbound)
    }

    /// Drop every stream binding, keeping the meta channels
    pub fn reset(&mut self) {
        self.routes.retain(|_, route| {
            matches!(route, Route::Handshake | Route::Connect | Route::Subscribe)
        });
    }

    /// Number of bound channels
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no channel is bound
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
