//! Faye Push Protocol
//!
//! Client side of the Bayeux-style protocol spoken by the GroupMe push
//! service.
//!
//! ## Architecture
//!
//! - **Messages**: outbound and inbound frame types
//! - **Dispatch**: channel name → handler table
//! - **Session**: the handshake/connect/subscribe state machine
//!
//! ## Channels
//!
//! - `/meta/handshake`, `/meta/connect`, `/meta/subscribe` - session negotiation
//! - `/user/{user_id}` - the user's event stream
//! - `/group/{group_id}` - one group's event stream

mod dispatch;
mod messages;
mod session;

pub use dispatch::{Inbound, Route, SubscriptionTable};
pub use messages::{
    encode_batch, group_channel, parse_frames, user_channel, Advice, Ext, FrameError,
    InboundFrame, OutboundFrame, StreamData, Subject, CONNECT_CHANNEL, HANDSHAKE_CHANNEL,
    LINE_CREATE, SUBSCRIBE_CHANNEL,
};
pub use session::{Action, Session, SessionState};
