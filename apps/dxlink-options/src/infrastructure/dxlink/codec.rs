//! DXLink Codec
//!
//! Decodes server messages and the compact `FEED_DATA` payload.
//!
//! # Compact Format
//!
//! A `FEED_DATA` payload alternates an event tag with a flat block of
//! positional values, several records per block:
//!
//! ```json
//! ["Quote", ["Quote", ".SPY240315P500", 2.1, 2.15, "Quote", "SPY", 500.1, 500.2],
//!  "Greeks", ["Greeks", ".SPY240315P500", 2.12, 0.18, -0.31, 0.02, -0.4, -0.05, 0.3]]
//! ```
//!
//! Each event type has a fixed arity; blocks are walked in strides of that
//! arity. Numeric fields may be numbers, `null`, or the strings `"NaN"`,
//! `"Infinity"` and `"-Infinity"`.

use serde_json::Value;

use super::messages::{
    AuthStateMessage, ChannelMessage, ClientMessage, ErrorMessage, FeedConfigMessage,
    FeedDataMessage, KeepaliveMessage, ServerMessage, SetupMessage,
};
use crate::domain::streaming::{Candle, EventType, FeedEvent, Greeks, Quote, Trade};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message has no `type` field.
    #[error("message missing type field")]
    MissingType,

    /// Payload does not follow the compact layout.
    #[error("malformed feed data: {0}")]
    Malformed(String),
}

// =============================================================================
// Envelope Codec
// =============================================================================

/// JSON codec for DXLink protocol messages.
#[derive(Debug, Default, Clone)]
pub struct DxLinkCodec;

impl DxLinkCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into a typed server message.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, lacks a `type`, or a known
    /// type does not match its schema. Unknown types decode to
    /// `ServerMessage::Unknown`.
    pub fn decode(&self, text: &str) -> Result<ServerMessage, CodecError> {
        let value: Value = serde_json::from_str(text)?;
        let msg_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingType)?
            .to_string();

        let message = match msg_type.as_str() {
            "SETUP" => ServerMessage::Setup(serde_json::from_value::<SetupMessage>(value)?),
            "AUTH_STATE" => {
                ServerMessage::AuthState(serde_json::from_value::<AuthStateMessage>(value)?)
            }
            "CHANNEL_OPENED" => {
                ServerMessage::ChannelOpened(serde_json::from_value::<ChannelMessage>(value)?)
            }
            "CHANNEL_CLOSED" => {
                ServerMessage::ChannelClosed(serde_json::from_value::<ChannelMessage>(value)?)
            }
            "FEED_CONFIG" => {
                ServerMessage::FeedConfig(serde_json::from_value::<FeedConfigMessage>(value)?)
            }
            "FEED_DATA" => {
                ServerMessage::FeedData(serde_json::from_value::<FeedDataMessage>(value)?)
            }
            "KEEPALIVE" => {
                ServerMessage::Keepalive(serde_json::from_value::<KeepaliveMessage>(value)?)
            }
            "ERROR" => ServerMessage::Error(serde_json::from_value::<ErrorMessage>(value)?),
            _ => ServerMessage::Unknown { msg_type },
        };

        Ok(message)
    }

    /// Encode a client message as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, message: &ClientMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }
}

// =============================================================================
// Compact Feed Decoder
// =============================================================================

type DecodeFn = fn(&[Value]) -> Result<FeedEvent, CodecError>;

/// Arity and decoder for one event type.
struct EventLayout {
    event_type: EventType,
    decode: DecodeFn,
}

const LAYOUTS: &[EventLayout] = &[
    EventLayout {
        event_type: EventType::Quote,
        decode: decode_quote,
    },
    EventLayout {
        event_type: EventType::Trade,
        decode: decode_trade,
    },
    EventLayout {
        event_type: EventType::Greeks,
        decode: decode_greeks,
    },
    EventLayout {
        event_type: EventType::Candle,
        decode: decode_candle,
    },
];

fn layout_for(tag: &str) -> Option<&'static EventLayout> {
    LAYOUTS.iter().find(|l| l.event_type.tag() == tag)
}

/// Decode a compact `FEED_DATA` payload into events, in wire order.
///
/// Unknown event tags are skipped.
///
/// # Errors
///
/// Returns `CodecError::Malformed` if tags and blocks do not alternate, a
/// block length is not a multiple of its arity, or a field has the wrong
/// JSON type.
pub fn decode_feed_data(data: &[Value]) -> Result<Vec<FeedEvent>, CodecError> {
    if data.len() % 2 != 0 {
        return Err(CodecError::Malformed(format!(
            "expected tag/values pairs, got {} elements",
            data.len()
        )));
    }

    let mut events = Vec::new();

    for pair in data.chunks_exact(2) {
        let tag = pair[0]
            .as_str()
            .ok_or_else(|| CodecError::Malformed(format!("expected event tag, got {}", pair[0])))?;
        let values = pair[1]
            .as_array()
            .ok_or_else(|| CodecError::Malformed(format!("expected value block for {tag}")))?;

        let Some(layout) = layout_for(tag) else {
            tracing::trace!(tag, "Skipping unhandled event type");
            continue;
        };

        let arity = layout.event_type.arity();
        if values.len() % arity != 0 {
            return Err(CodecError::Malformed(format!(
                "{tag} block of {} values is not a multiple of {arity}",
                values.len()
            )));
        }

        events.reserve(values.len() / arity);
        for record in values.chunks_exact(arity) {
            events.push((layout.decode)(record)?);
        }
    }

    Ok(events)
}

fn decode_quote(r: &[Value]) -> Result<FeedEvent, CodecError> {
    Ok(FeedEvent::Quote(Quote {
        event_symbol: symbol(&r[1])?,
        bid_price: number(&r[2])?,
        ask_price: number(&r[3])?,
    }))
}

fn decode_trade(r: &[Value]) -> Result<FeedEvent, CodecError> {
    Ok(FeedEvent::Trade(Trade {
        event_symbol: symbol(&r[1])?,
        price: number(&r[2])?,
        size: number(&r[3])?,
    }))
}

fn decode_greeks(r: &[Value]) -> Result<FeedEvent, CodecError> {
    Ok(FeedEvent::Greeks(Greeks {
        event_symbol: symbol(&r[1])?,
        price: number(&r[2])?,
        volatility: number(&r[3])?,
        delta: number(&r[4])?,
        gamma: number(&r[5])?,
        theta: number(&r[6])?,
        rho: number(&r[7])?,
        vega: number(&r[8])?,
    }))
}

fn decode_candle(r: &[Value]) -> Result<FeedEvent, CodecError> {
    Ok(FeedEvent::Candle(Candle {
        event_symbol: symbol(&r[1])?,
        time: timestamp(&r[2])?,
        open: number(&r[3])?,
        high: number(&r[4])?,
        low: number(&r[5])?,
        close: number(&r[6])?,
        volume: number(&r[7])?,
        imp_volatility: number(&r[8])?,
        open_interest: number(&r[9])?,
    }))
}

fn symbol(value: &Value) -> Result<String, CodecError> {
    value
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| CodecError::Malformed(format!("expected symbol string, got {value}")))
}

/// Numeric field: number, `null`, or a sentinel string.
fn number(value: &Value) -> Result<Option<f64>, CodecError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(Some(f64::NAN)),
            "Infinity" => Ok(Some(f64::INFINITY)),
            "-Infinity" => Ok(Some(f64::NEG_INFINITY)),
            other => other
                .parse::<f64>()
                .map(Some)
                .map_err(|_| CodecError::Malformed(format!("expected number, got \"{other}\""))),
        },
        other => Err(CodecError::Malformed(format!("expected number, got {other}"))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp(value: &Value) -> Result<Option<i64>, CodecError> {
    if let Some(ms) = value.as_i64() {
        return Ok(Some(ms));
    }
    Ok(number(value)?.filter(|v| v.is_finite()).map(|v| v as i64))
}
