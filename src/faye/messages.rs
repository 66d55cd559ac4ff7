//! Faye Frame Types
//!
//! Defines the JSON frames exchanged with the push service. Outbound frames
//! are built by the session; inbound frames are parsed loosely since the
//! server attaches fields we never look at.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Handshake meta channel
pub const HANDSHAKE_CHANNEL: &str = "/meta/handshake";
/// Connect meta channel
pub const CONNECT_CHANNEL: &str = "/meta/connect";
/// Subscribe meta channel
pub const SUBSCRIBE_CHANNEL: &str = "/meta/subscribe";

/// Stream payload type that carries a newly posted message
pub const LINE_CREATE: &str = "line.create";

const CONNECTION_TYPE: &str = "websocket";
const PROTOCOL_VERSION: &str = "1.0";

/// Channel carrying a user's event stream
pub fn user_channel(user_id: &str) -> String {
    format!("/user/{}", user_id)
}

/// Channel carrying a group's event stream
pub fn group_channel(group_id: &str) -> String {
    format!("/group/{}", group_id)
}

/// Frame sent from the client to the push service
///
/// `id` is left at zero by the constructors; the session stamps it right
/// before the frame goes out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_connection_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,
    pub id: u64,
}

/// Authentication extension attached to subscribe frames
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ext {
    pub access_token: String,
}

/// Connection advice sent with `/meta/connect`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advice {
    pub timeout: u64,
}

impl OutboundFrame {
    fn on(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            client_id: None,
            subscription: None,
            version: None,
            supported_connection_types: None,
            connection_type: None,
            ext: None,
            data: None,
            advice: None,
            id: 0,
        }
    }

    /// `/meta/handshake` request opening a session
    pub fn handshake() -> Self {
        Self {
            version: Some(PROTOCOL_VERSION.to_string()),
            supported_connection_types: Some(vec![CONNECTION_TYPE.to_string()]),
            ..Self::on(HANDSHAKE_CHANNEL)
        }
    }

    /// `/meta/connect` request for the websocket connection type
    pub fn connect(client_id: &str, user_id: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            subscription: Some(user_channel(user_id)),
            connection_type: Some(CONNECTION_TYPE.to_string()),
            advice: Some(Advice { timeout: 0 }),
            ..Self::on(CONNECT_CHANNEL)
        }
    }

    /// `/meta/subscribe` request registering interest in a stream
    pub fn subscribe(client_id: &str, subscription: String, access_token: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            subscription: Some(subscription),
            ext: Some(Ext {
                access_token: access_token.to_string(),
            }),
            ..Self::on(SUBSCRIBE_CHANNEL)
        }
    }

    /// Data frame sent on a stream channel asking the server to start it
    pub fn stream_subscribe(channel: String, client_id: &str, access_token: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            data: Some(serde_json::json!({ "type": "subscribe" })),
            ext: Some(Ext {
                access_token: access_token.to_string(),
            }),
            ..Self::on(channel)
        }
    }
}

/// Frame received from the push service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub channel: String,
    #[serde(default)]
    pub successful: Option<bool>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundFrame {
    /// Whether the server flagged this frame as successful
    ///
    /// A missing flag counts as unsuccessful.
    pub fn is_successful(&self) -> bool {
        self.successful.unwrap_or(false)
    }

    /// Typed view of the stream payload, if the frame carries one
    pub fn stream_data(&self) -> Option<StreamData> {
        let data = self.data.as_ref()?;
        match serde_json::from_value(data.clone()) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!(channel = %self.channel, error = %e, "Undecodable stream payload");
                None
            }
        }
    }
}

/// Payload of a frame on a user or group stream
#[derive(Debug, Clone, Deserialize)]
pub struct StreamData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subject: Option<Subject>,
}

/// A posted message as delivered on a stream
///
/// Kept as the raw JSON object the server sent. Accessors read the common
/// fields and return `None` when a field is absent or of another type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Subject {
    pub fields: Map<String, Value>,
}

impl Subject {
    /// Message text, empty for attachment-only posts
    pub fn text(&self) -> &str {
        self.str_field("text").unwrap_or("")
    }

    pub fn group_id(&self) -> Option<&str> {
        self.str_field("group_id")
    }

    /// Display name of the sender
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn user_id(&self) -> Option<&str> {
        self.str_field("user_id")
    }

    /// Whether the message was posted by a bot rather than a person
    pub fn is_from_bot(&self) -> bool {
        self.str_field("sender_type") == Some("bot")
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Errors raised while decoding a transport payload
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid frame payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one transport payload into its frames
///
/// The server sends a JSON array; a bare object is accepted as a batch of
/// one. Elements that are not frames (no `channel`, wrong shape) are skipped.
pub fn parse_frames(payload: &str) -> Result<Vec<InboundFrame>, FrameError> {
    let value: Value = serde_json::from_str(payload)?;
    let elements = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    let frames = elements
        .into_iter()
        .filter_map(|element| match serde_json::from_value(element) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed frame");
                None
            }
        })
        .collect();

    Ok(frames)
}

/// Encode an outbound batch as a single JSON array
pub fn encode_batch(frames: &[OutboundFrame]) -> Result<String, FrameError> {
    Ok(serde_json::to_string(frames)?)
}
