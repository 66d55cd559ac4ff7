//! Faye Session State Machine
//!
//! Drives the negotiation sequence against the push service:
//!
//! ```text
//! Disconnected → Handshaking → ConnectingTransport → SubscribingUser
//!              → SubscribingGroups → Active
//! ```
//!
//! The session does no I/O. Each input returns the [`Action`]s the caller
//! must carry out: frame batches to write, events to publish, and bots to
//! create. Unexpected or unsuccessful responses are logged and otherwise
//! ignored; there is no retry and no timeout.

use super::dispatch::{Inbound, SubscriptionTable};
use super::messages::{parse_frames, user_channel, InboundFrame, OutboundFrame, LINE_CREATE};
use crate::config::BotConfig;
use crate::events::BotEvent;

/// Negotiation progress of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Handshaking,
    ConnectingTransport,
    SubscribingUser,
    SubscribingGroups,
    Active,
}

/// Work produced by the session for its driver
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Write these frames as one transport message
    Send(Vec<OutboundFrame>),
    /// Publish an event to observers
    Emit(BotEvent),
    /// Create a bot in a group, without waiting on the result
    CreateBot { name: String, group_id: String },
}

/// Protocol state for one push connection
#[derive(Debug)]
pub struct Session {
    config: BotConfig,
    client_id: Option<String>,
    frame_counter: u64,
    state: SessionState,
    table: SubscriptionTable,
}

impl Session {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            client_id: None,
            frame_counter: 0,
            state: SessionState::Disconnected,
            table: SubscriptionTable::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Client id assigned by the last successful handshake
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Number of frames sent on the current connection
    pub fn frames_sent(&self) -> u64 {
        self.frame_counter
    }

    pub fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    /// Transport opened: start over and send the handshake
    pub fn on_connected(&mut self) -> Vec<Action> {
        self.client_id = None;
        self.frame_counter = 0;
        self.table.reset();
        self.state = SessionState::Handshaking;

        tracing::debug!(user_id = %self.config.user_id, "Starting handshake");
        vec![self.send(vec![OutboundFrame::handshake()])]
    }

    /// Transport closed or failed
    pub fn on_disconnected(&mut self) {
        if self.state != SessionState::Disconnected {
            tracing::debug!(state = ?self.state, "Session disconnected");
        }
        self.state = SessionState::Disconnected;
    }

    /// Handle one transport payload, frame by frame in order
    pub fn on_payload(&mut self, payload: &str) -> Vec<Action> {
        let frames = match parse_frames(payload) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable payload");
                return Vec::new();
            }
        };

        let mut actions = Vec::new();
        for frame in frames {
            actions.extend(self.on_frame(frame));
        }
        actions
    }

    /// Route a single frame to its handler
    pub fn on_frame(&mut self, frame: InboundFrame) -> Vec<Action> {
        let channel = frame.channel.clone();
        let Some(inbound) = self.table.dispatch(frame) else {
            tracing::trace!(channel = %channel, "No handler for channel");
            return Vec::new();
        };

        match inbound {
            Inbound::Handshake(frame) => self.handle_handshake(frame),
            Inbound::Connect(frame) => self.handle_connect(frame),
            Inbound::Subscribe(frame) => {
                self.handle_subscribe(frame);
                Vec::new()
            }
            Inbound::UserStream(frame) => {
                if frame.is_successful() {
                    self.handle_user_ack()
                } else {
                    Self::handle_stream_data(&frame)
                }
            }
            Inbound::GroupStream { group_id, frame } => {
                if frame.is_successful() {
                    tracing::debug!(group_id = %group_id, "Group stream active");
                    Vec::new()
                } else {
                    Self::handle_stream_data(&frame)
                }
            }
        }
    }

    fn handle_handshake(&mut self, frame: InboundFrame) -> Vec<Action> {
        if self.state != SessionState::Handshaking {
            tracing::debug!(state = ?self.state, "Ignoring unsolicited handshake response");
            return Vec::new();
        }
        if frame.successful == Some(false) {
            tracing::warn!(error = ?frame.error, "Handshake rejected");
            return Vec::new();
        }
        let Some(client_id) = frame.client_id else {
            tracing::warn!("Handshake response carried no client id");
            return Vec::new();
        };

        tracing::info!(client_id = %client_id, "Handshake complete");
        let connect = OutboundFrame::connect(&client_id, &self.config.user_id);
        let subscribe = OutboundFrame::subscribe(
            &client_id,
            user_channel(&self.config.user_id),
            &self.config.access_token,
        );
        self.client_id = Some(client_id);
        self.state = SessionState::ConnectingTransport;

        vec![self.send(vec![connect]), self.send(vec![subscribe])]
    }

    fn handle_connect(&mut self, frame: InboundFrame) -> Vec<Action> {
        if !frame.is_successful() {
            tracing::warn!(error = ?frame.error, "Connect rejected");
            return Vec::new();
        }
        if self.state != SessionState::ConnectingTransport {
            tracing::trace!(state = ?self.state, "Connect acknowledged");
            return Vec::new();
        }
        let Some(client_id) = self.client_id.clone() else {
            return Vec::new();
        };

        let channel = self.table.register_user(&self.config.user_id);
        tracing::debug!(channel = %channel, "Subscribing to user stream");
        let frame = OutboundFrame::stream_subscribe(channel, &client_id, &self.config.access_token);
        self.state = SessionState::SubscribingUser;

        vec![self.send(vec![frame])]
    }

    fn handle_subscribe(&self, frame: InboundFrame) {
        let subscription = frame.extra.get("subscription").and_then(|s| s.as_str());
        if frame.is_successful() {
            tracing::debug!(subscription = ?subscription, "Subscription confirmed");
        } else {
            tracing::warn!(subscription = ?subscription, error = ?frame.error, "Subscription rejected");
        }
    }

    fn handle_user_ack(&mut self) -> Vec<Action> {
        if self.state != SessionState::SubscribingUser {
            tracing::trace!(state = ?self.state, "User stream acknowledged again");
            return Vec::new();
        }
        let Some(client_id) = self.client_id.clone() else {
            return Vec::new();
        };

        tracing::info!(user_id = %self.config.user_id, "User stream active");
        let mut actions = vec![Action::Emit(BotEvent::Connected)];
        self.state = SessionState::SubscribingGroups;

        let groups = self.config.groups.clone();
        let mut frames = Vec::with_capacity(groups.len());
        for group_id in &groups {
            actions.push(Action::CreateBot {
                name: self.config.bot_name.clone(),
                group_id: group_id.clone(),
            });
            let channel = self.table.register_group(group_id);
            frames.push(OutboundFrame::stream_subscribe(
                channel,
                &client_id,
                &self.config.access_token,
            ));
        }
        if !frames.is_empty() {
            actions.push(self.send(frames));
        }

        self.state = SessionState::Active;
        actions
    }

    fn handle_stream_data(frame: &InboundFrame) -> Vec<Action> {
        let Some(data) = frame.stream_data() else {
            return Vec::new();
        };
        if data.kind != LINE_CREATE {
            tracing::trace!(channel = %frame.channel, kind = %data.kind, "Ignoring stream event");
            return Vec::new();
        }

        match data.subject {
            Some(subject) => {
                tracing::debug!(channel = %frame.channel, "Message received");
                vec![Action::Emit(BotEvent::Message(subject))]
            }
            None => Vec::new(),
        }
    }

    /// Stamp frame ids and package the batch for the transport
    fn send(&mut self, mut frames: Vec<OutboundFrame>) -> Action {
        for frame in &mut frames {
            self.frame_counter += 1;
            frame.id = self.frame_counter;
        }
        Action::Send(frames)
    }
}
