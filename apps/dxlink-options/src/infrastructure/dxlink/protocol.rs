//! Session Protocol State Machine
//!
//! Pure handshake logic: consumes decoded server messages and yields the
//! client messages to send in reply. Socket I/O lives in the session.
//!
//! # States
//!
//! ```text
//! Disconnected -> AwaitingSetupAck -> AwaitingAuthChallenge -> AwaitingAuthResult
//!              -> OpeningChannels -> Streaming
//! ```
//!
//! While `OpeningChannels`, each feed channel advances on its own through
//! [`ChannelPhase`]: `AwaitingOpen` -> `AwaitingConfig` -> `Streaming`. The
//! session is `Streaming` once every channel is.

use std::collections::BTreeMap;

use super::auth::{ApiToken, AuthAction, AuthError, AuthHandler};
use super::channel::{ChannelKind, ChannelPhase, DEFAULT_BATCH_SIZE, subscription_batches};
use super::messages::{CONTROL_CHANNEL, ClientMessage, ServerMessage};
use crate::domain::subscription::SubscriptionStore;

/// Client version advertised in `SETUP`.
pub const CLIENT_VERSION: &str = concat!("dxlink-options-", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Error Types
// =============================================================================

/// Errors that end the handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Authorization failed.
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),

    /// Message arrived before `start`.
    #[error("received {msg_type} while disconnected")]
    NotStarted {
        /// Message type.
        msg_type: String,
    },
}

// =============================================================================
// Configuration
// =============================================================================

/// Negotiated protocol parameters.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Keepalive timeout advertised in `SETUP`, in seconds.
    pub keepalive_timeout_secs: u64,
    /// Aggregation period requested in `FEED_SETUP`, in seconds.
    pub aggregation_period_secs: u64,
    /// Symbols per `FEED_SUBSCRIPTION` message.
    pub batch_size: usize,
    /// Client version string.
    pub version: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            keepalive_timeout_secs: 60,
            aggregation_period_secs: 60,
            batch_size: DEFAULT_BATCH_SIZE,
            version: CLIENT_VERSION.to_string(),
        }
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Session-level handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection.
    #[default]
    Disconnected,
    /// `SETUP` sent.
    AwaitingSetupAck,
    /// Server acknowledged `SETUP`; waiting for `AUTH_STATE`.
    AwaitingAuthChallenge,
    /// `AUTH` sent.
    AwaitingAuthResult,
    /// Authorized; feed channels are being opened and configured.
    OpeningChannels,
    /// Every feed channel is streaming.
    Streaming,
}

impl SessionState {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingSetupAck => "awaiting_setup_ack",
            Self::AwaitingAuthChallenge => "awaiting_auth_challenge",
            Self::AwaitingAuthResult => "awaiting_auth_result",
            Self::OpeningChannels => "opening_channels",
            Self::Streaming => "streaming",
        }
    }
}

/// DXLink handshake state machine for one connection.
#[derive(Debug)]
pub struct ProtocolMachine {
    config: ProtocolConfig,
    auth: AuthHandler,
    state: SessionState,
    channels: BTreeMap<ChannelKind, ChannelPhase>,
}

impl ProtocolMachine {
    /// Create a machine in `Disconnected`.
    #[must_use]
    pub const fn new(config: ProtocolConfig, token: ApiToken) -> Self {
        Self {
            config,
            auth: AuthHandler::new(token),
            state: SessionState::Disconnected,
            channels: BTreeMap::new(),
        }
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Protocol configuration.
    #[must_use]
    pub const fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Phase of a feed channel.
    #[must_use]
    pub fn channel_phase(&self, kind: ChannelKind) -> ChannelPhase {
        self.channels.get(&kind).copied().unwrap_or_default()
    }

    /// Whether subscriptions can be sent on `kind` right now.
    #[must_use]
    pub fn is_streaming(&self, kind: ChannelKind) -> bool {
        self.channel_phase(kind) == ChannelPhase::Streaming
    }

    /// Begin a new connection: reset progress and produce `SETUP`.
    pub fn start(&mut self) -> ClientMessage {
        self.reset();
        self.state = SessionState::AwaitingSetupAck;
        ClientMessage::Setup {
            channel: CONTROL_CHANNEL,
            keepalive_timeout: self.config.keepalive_timeout_secs,
            accept_keepalive_timeout: self.config.keepalive_timeout_secs,
            version: self.config.version.clone(),
        }
    }

    /// Return to `Disconnected`.
    pub fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.auth.reset();
        self.channels.clear();
    }

    /// Advance on a server message.
    ///
    /// Returns the messages to send in reply, in order. Once a channel
    /// finishes configuration, its reply carries the store's current
    /// symbols for that channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected or a message arrives before
    /// `start`.
    pub fn on_message(
        &mut self,
        message: &ServerMessage,
        store: &SubscriptionStore,
    ) -> Result<Vec<ClientMessage>, ProtocolError> {
        if self.state == SessionState::Disconnected {
            return Err(ProtocolError::NotStarted {
                msg_type: message.type_name().to_string(),
            });
        }

        match message {
            ServerMessage::Setup(setup) => {
                if self.state == SessionState::AwaitingSetupAck {
                    self.state = SessionState::AwaitingAuthChallenge;
                }
                tracing::debug!(
                    version = ?setup.version,
                    keepalive_timeout = ?setup.keepalive_timeout,
                    "Setup acknowledged"
                );
                Ok(Vec::new())
            }
            ServerMessage::AuthState(auth_state) => match self.auth.on_auth_state(auth_state)? {
                AuthAction::Send(auth) => {
                    self.state = SessionState::AwaitingAuthResult;
                    Ok(vec![auth])
                }
                AuthAction::Authorized => {
                    tracing::info!(user_id = ?auth_state.user_id, "DXLink session authorized");
                    self.state = SessionState::OpeningChannels;
                    Ok(ChannelKind::ALL
                        .iter()
                        .map(|kind| {
                            self.channels.insert(*kind, ChannelPhase::AwaitingOpen);
                            kind.channel_request()
                        })
                        .collect())
                }
                AuthAction::None => Ok(Vec::new()),
            },
            ServerMessage::ChannelOpened(opened) => {
                let Some(kind) = self.feed_channel(opened.channel) else {
                    return Ok(Vec::new());
                };
                if self.channel_phase(kind) != ChannelPhase::AwaitingOpen {
                    tracing::debug!(channel = opened.channel, "Ignoring repeated CHANNEL_OPENED");
                    return Ok(Vec::new());
                }
                self.channels.insert(kind, ChannelPhase::AwaitingConfig);
                Ok(vec![kind.feed_setup(self.config.aggregation_period_secs)])
            }
            ServerMessage::FeedConfig(config) => {
                let Some(kind) = self.feed_channel(config.channel) else {
                    return Ok(Vec::new());
                };
                if self.channel_phase(kind) != ChannelPhase::AwaitingConfig {
                    tracing::debug!(channel = config.channel, "Feed config update");
                    return Ok(Vec::new());
                }
                self.channels.insert(kind, ChannelPhase::Streaming);
                if ChannelKind::ALL.iter().all(|k| self.is_streaming(*k)) {
                    self.state = SessionState::Streaming;
                    tracing::info!("DXLink session streaming");
                }

                let symbols = match kind {
                    ChannelKind::Underlying => store.underlying_symbols(),
                    ChannelKind::Options => store.option_symbols(),
                };
                tracing::debug!(channel = %kind, symbols = symbols.len(), "Channel configured");
                Ok(subscription_batches(kind, &symbols, self.config.batch_size, true))
            }
            ServerMessage::ChannelClosed(closed) => {
                let Some(kind) = self.feed_channel(closed.channel) else {
                    return Ok(Vec::new());
                };
                tracing::warn!(channel = %kind, "Feed channel closed by server, reopening");
                self.channels.insert(kind, ChannelPhase::AwaitingOpen);
                if self.state == SessionState::Streaming {
                    self.state = SessionState::OpeningChannels;
                }
                if self.auth.is_authorized() {
                    Ok(vec![kind.channel_request()])
                } else {
                    Ok(Vec::new())
                }
            }
            ServerMessage::FeedData(_)
            | ServerMessage::Keepalive(_)
            | ServerMessage::Error(_)
            | ServerMessage::Unknown { .. } => Ok(Vec::new()),
        }
    }

    /// Subscription messages for newly added symbols.
    ///
    /// Empty while the channel is still being set up; the channel picks the
    /// symbols up from the store when its configuration completes.
    #[must_use]
    pub fn subscription_messages<S: AsRef<str>>(
        &self,
        kind: ChannelKind,
        symbols: &[S],
    ) -> Vec<ClientMessage> {
        if !self.is_streaming(kind) {
            return Vec::new();
        }
        subscription_batches(kind, symbols, self.config.batch_size, false)
    }

    /// Empty `reset = true` subscriptions for every streaming channel.
    #[must_use]
    pub fn reset_messages(&self) -> Vec<ClientMessage> {
        ChannelKind::ALL
            .iter()
            .filter(|kind| self.is_streaming(**kind))
            .map(|kind| ClientMessage::FeedSubscription {
                channel: kind.id(),
                add: Vec::new(),
                reset: true,
            })
            .collect()
    }

    fn feed_channel(&self, channel: u32) -> Option<ChannelKind> {
        let kind = ChannelKind::from_id(channel);
        if kind.is_none() {
            tracing::warn!(channel, state = self.state.as_str(), "Message for unknown channel");
        }
        kind
    }
}
