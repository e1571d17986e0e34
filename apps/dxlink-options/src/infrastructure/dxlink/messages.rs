//! DXLink WebSocket Message Types
//!
//! Wire format types for the DXLink JSON protocol. Every message is an
//! object with a `type` tag and a `channel` number; channel 0 carries
//! session control (setup, auth, keepalive).
//!
//! # Handshake Order
//!
//! ```text
//! client SETUP            -> server SETUP
//!                         <- server AUTH_STATE (UNAUTHORIZED)
//! client AUTH             -> server AUTH_STATE (AUTHORIZED)
//! client CHANNEL_REQUEST  -> server CHANNEL_OPENED      (per channel)
//! client FEED_SETUP       -> server FEED_CONFIG         (per channel)
//! client FEED_SUBSCRIPTION
//!                         <- server FEED_DATA ...
//! client KEEPALIVE        <- server KEEPALIVE           (periodic)
//! ```
//!
//! The server may send `ERROR` at any point; it does not end the session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::auth::ApiToken;
use crate::domain::streaming::EventType;

/// Channel reserved for session control.
pub const CONTROL_CHANNEL: u32 = 0;

/// Data format requested in `FEED_SETUP`.
pub const COMPACT_FORMAT: &str = "COMPACT";

/// Service requested in `CHANNEL_REQUEST`.
pub const FEED_SERVICE: &str = "FEED";

/// Contract requested in `CHANNEL_REQUEST`.
pub const AUTO_CONTRACT: &str = "AUTO";

// =============================================================================
// Client Messages
// =============================================================================

/// One `{type, symbol}` entry of a `FEED_SUBSCRIPTION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSubItem {
    /// Event type to stream.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Feed symbol.
    pub symbol: String,
}

/// `CHANNEL_REQUEST` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelParameters {
    /// Channel contract (`AUTO`).
    pub contract: &'static str,
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Protocol version and keepalive negotiation.
    #[serde(rename_all = "camelCase")]
    Setup {
        /// Always the control channel.
        channel: u32,
        /// Seconds the server may stay silent before we drop it.
        keepalive_timeout: u64,
        /// Seconds we may stay silent before the server drops us.
        accept_keepalive_timeout: u64,
        /// Client version string.
        version: String,
    },
    /// Authorization token.
    Auth {
        /// Always the control channel.
        channel: u32,
        /// Streamer token.
        token: ApiToken,
    },
    /// Open a feed channel.
    ChannelRequest {
        /// Channel to open.
        channel: u32,
        /// Service name (`FEED`).
        service: &'static str,
        /// Channel parameters.
        parameters: ChannelParameters,
    },
    /// Declare wanted event fields and data format for a channel.
    #[serde(rename_all = "camelCase")]
    FeedSetup {
        /// Feed channel.
        channel: u32,
        /// Aggregation period in seconds.
        accept_aggregation_period: u64,
        /// Data format (`COMPACT`).
        accept_data_format: &'static str,
        /// Field list per event type tag.
        accept_event_fields: BTreeMap<&'static str, Vec<&'static str>>,
    },
    /// Add symbols to a channel's subscription.
    FeedSubscription {
        /// Feed channel.
        channel: u32,
        /// Items to add.
        add: Vec<FeedSubItem>,
        /// Drop all existing subscriptions first.
        reset: bool,
    },
    /// Keep the session alive.
    Keepalive {
        /// Always the control channel.
        channel: u32,
    },
}

impl ClientMessage {
    /// Wire type tag, for logging and metrics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "SETUP",
            Self::Auth { .. } => "AUTH",
            Self::ChannelRequest { .. } => "CHANNEL_REQUEST",
            Self::FeedSetup { .. } => "FEED_SETUP",
            Self::FeedSubscription { .. } => "FEED_SUBSCRIPTION",
            Self::Keepalive { .. } => "KEEPALIVE",
        }
    }

    /// Keepalive on the control channel.
    #[must_use]
    pub const fn keepalive() -> Self {
        Self::Keepalive {
            channel: CONTROL_CHANNEL,
        }
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Server `SETUP` acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    /// Control channel.
    pub channel: u32,
    /// Server version.
    #[serde(default)]
    pub version: Option<String>,
    /// Server keepalive timeout in seconds.
    #[serde(default)]
    pub keepalive_timeout: Option<u64>,
    /// Keepalive timeout the server accepts from us.
    #[serde(default)]
    pub accept_keepalive_timeout: Option<u64>,
}

/// Authorization state reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationState {
    /// Token accepted.
    Authorized,
    /// Token required or rejected.
    Unauthorized,
}

/// Server `AUTH_STATE`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStateMessage {
    /// Control channel.
    pub channel: u32,
    /// Current state.
    pub state: AuthorizationState,
    /// Authorized user, when present.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Server `CHANNEL_OPENED` / `CHANNEL_CLOSED`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelMessage {
    /// Affected channel.
    pub channel: u32,
    /// Service, when echoed.
    #[serde(default)]
    pub service: Option<String>,
}

/// Server `FEED_CONFIG`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfigMessage {
    /// Feed channel.
    pub channel: u32,
    /// Effective aggregation period.
    #[serde(default)]
    pub aggregation_period: Option<f64>,
    /// Effective data format.
    #[serde(default)]
    pub data_format: Option<String>,
    /// Effective fields per event type.
    #[serde(default)]
    pub event_fields: Option<BTreeMap<String, Vec<String>>>,
}

/// Server `FEED_DATA`: a flat `[tag, [values...], tag, [values...]]` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedDataMessage {
    /// Feed channel.
    pub channel: u32,
    /// Compact payload.
    pub data: Vec<serde_json::Value>,
}

/// Server `KEEPALIVE`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeepaliveMessage {
    /// Control channel.
    pub channel: u32,
}

/// Server `ERROR`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorMessage {
    /// Channel the error relates to.
    #[serde(default)]
    pub channel: u32,
    /// Error code, e.g. `UNAUTHORIZED`.
    #[serde(default)]
    pub error: String,
    /// Human readable detail.
    #[serde(default)]
    pub message: String,
}

/// Messages received from the server, decoded by `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// `SETUP`
    Setup(SetupMessage),
    /// `AUTH_STATE`
    AuthState(AuthStateMessage),
    /// `CHANNEL_OPENED`
    ChannelOpened(ChannelMessage),
    /// `CHANNEL_CLOSED`
    ChannelClosed(ChannelMessage),
    /// `FEED_CONFIG`
    FeedConfig(FeedConfigMessage),
    /// `FEED_DATA`
    FeedData(FeedDataMessage),
    /// `KEEPALIVE`
    Keepalive(KeepaliveMessage),
    /// `ERROR`
    Error(ErrorMessage),
    /// Any type this client does not handle.
    Unknown {
        /// Raw type tag.
        msg_type: String,
    },
}

impl ServerMessage {
    /// Wire type tag, for logging and metrics.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Setup(_) => "SETUP",
            Self::AuthState(_) => "AUTH_STATE",
            Self::ChannelOpened(_) => "CHANNEL_OPENED",
            Self::ChannelClosed(_) => "CHANNEL_CLOSED",
            Self::FeedConfig(_) => "FEED_CONFIG",
            Self::FeedData(_) => "FEED_DATA",
            Self::Keepalive(_) => "KEEPALIVE",
            Self::Error(_) => "ERROR",
            Self::Unknown { msg_type } => msg_type,
        }
    }
}
