//! Feed Channels
//!
//! The session multiplexes two feed channels over one connection: one for
//! underlying trades and one for option quotes and Greeks. Each channel is
//! opened, configured and subscribed independently.

use std::collections::BTreeMap;

use super::messages::{
    AUTO_CONTRACT, COMPACT_FORMAT, ChannelParameters, ClientMessage, FEED_SERVICE, FeedSubItem,
};
use crate::domain::streaming::EventType;

/// Per-message item cap for `FEED_SUBSCRIPTION` batches.
pub const DEFAULT_BATCH_SIZE: usize = 45;

/// Data domain carried by a feed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    /// Underlying trades.
    Underlying,
    /// Option quotes and Greeks.
    Options,
}

impl ChannelKind {
    /// All feed channels, in opening order.
    pub const ALL: [Self; 2] = [Self::Underlying, Self::Options];

    /// Wire channel number.
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::Underlying => 1,
            Self::Options => 3,
        }
    }

    /// Map a wire channel number back to a feed channel.
    #[must_use]
    pub const fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::Underlying),
            3 => Some(Self::Options),
            _ => None,
        }
    }

    /// Event types subscribed per symbol on this channel.
    #[must_use]
    pub const fn event_types(self) -> &'static [EventType] {
        match self {
            Self::Underlying => &[EventType::Trade],
            Self::Options => &[EventType::Quote, EventType::Greeks],
        }
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Underlying => "underlying",
            Self::Options => "options",
        }
    }

    /// `CHANNEL_REQUEST` for this channel.
    #[must_use]
    pub const fn channel_request(self) -> ClientMessage {
        ClientMessage::ChannelRequest {
            channel: self.id(),
            service: FEED_SERVICE,
            parameters: ChannelParameters {
                contract: AUTO_CONTRACT,
            },
        }
    }

    /// `FEED_SETUP` declaring the compact format and field lists.
    #[must_use]
    pub fn feed_setup(self, aggregation_period: u64) -> ClientMessage {
        let accept_event_fields: BTreeMap<&'static str, Vec<&'static str>> = self
            .event_types()
            .iter()
            .map(|event_type| (event_type.tag(), event_type.fields().to_vec()))
            .collect();

        ClientMessage::FeedSetup {
            channel: self.id(),
            accept_aggregation_period: aggregation_period,
            accept_data_format: COMPACT_FORMAT,
            accept_event_fields,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one feed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// Not requested on this connection.
    #[default]
    Closed,
    /// `CHANNEL_REQUEST` sent.
    AwaitingOpen,
    /// `FEED_SETUP` sent.
    AwaitingConfig,
    /// Configured; subscriptions flow.
    Streaming,
}

/// Split `symbols` into `FEED_SUBSCRIPTION` messages for `kind`.
///
/// Each message carries at most `batch_size` symbols; every symbol expands
/// to one item per event type of the channel. Only the first message carries
/// `reset`, so later batches add to it.
#[must_use]
pub fn subscription_batches<S: AsRef<str>>(
    kind: ChannelKind,
    symbols: &[S],
    batch_size: usize,
    reset: bool,
) -> Vec<ClientMessage> {
    let batch_size = batch_size.max(1);

    symbols
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| ClientMessage::FeedSubscription {
            channel: kind.id(),
            add: chunk
                .iter()
                .flat_map(|symbol| {
                    kind.event_types().iter().map(move |event_type| FeedSubItem {
                        event_type: *event_type,
                        symbol: symbol.as_ref().to_string(),
                    })
                })
                .collect(),
            reset: reset && index == 0,
        })
        .collect()
}
