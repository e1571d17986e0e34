//! DXLink WebSocket Session
//!
//! Owns one DXLink connection: drives the handshake through
//! [`ProtocolMachine`], keeps it alive, and writes decoded feed data into the
//! shared [`SubscriptionStore`].
//!
//! # Tasks
//!
//! Each connection runs two background tasks sharing one cancellation token:
//!
//! - the read loop, which decodes frames and dispatches them by type. Feed
//!   data is decoded and applied on its own spawned task so a large payload
//!   never delays the next read.
//! - the keepalive task, which sends `KEEPALIVE` on channel 0.
//!
//! Outbound frames are serialized by the writer lock. Protocol transitions
//! that produce messages run while holding it, so a subscription added
//! during the handshake is always written after the `reset` batch that
//! opens its channel.
//!
//! # Failure Handling
//!
//! Malformed frames are logged and dropped. A closed or failed socket moves
//! the session to `Disconnected` and publishes that on the status channel;
//! reconnecting is up to the owner via [`DxLinkSession::reconnect`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use super::auth::ApiToken;
use super::channel::ChannelKind;
use super::codec::{CodecError, DxLinkCodec, decode_feed_data};
use super::heartbeat::{KeepaliveConfig, KeepaliveSink, KeepaliveState, KeepaliveTask};
use super::messages::{ClientMessage, FeedDataMessage, ServerMessage};
use super::protocol::{ProtocolConfig, ProtocolMachine, SessionState};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use crate::application::ports::{FeedSubscriber, PortError};
use crate::domain::streaming::EventType;
use crate::domain::subscription::SubscriptionStore;
use crate::infrastructure::metrics::{self, ErrorKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Longest payload rendered in debug logs.
const LOG_PREVIEW_LEN: usize = 200;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the DXLink session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `connect` called on a live session.
    #[error("session is already connected")]
    AlreadyConnected,

    /// No socket to write to.
    #[error("session is not connected")]
    NotConnected,

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection dropped before the session reached streaming.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Reconnect gave up.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),

    /// Shutdown was requested.
    #[error("session cancelled")]
    Cancelled,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the DXLink session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Quote streamer token.
    pub token: ApiToken,
    /// Handshake parameters.
    pub protocol: ProtocolConfig,
    /// Keepalive configuration.
    pub keepalive: KeepaliveConfig,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    /// Create a configuration with default protocol, keepalive and reconnect
    /// settings.
    #[must_use]
    pub fn new(url: impl Into<String>, token: ApiToken) -> Self {
        Self {
            url: url.into(),
            token,
            protocol: ProtocolConfig::default(),
            keepalive: KeepaliveConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Create a configuration from `SessionSettings`.
    #[must_use]
    pub fn from_settings(
        url: impl Into<String>,
        token: ApiToken,
        settings: &crate::SessionSettings,
    ) -> Self {
        Self {
            url: url.into(),
            token,
            protocol: settings.protocol_config(),
            keepalive: KeepaliveConfig::new(settings.keepalive_interval),
            reconnect: ReconnectConfig::from_session_settings(settings),
        }
    }
}

/// Connection status published to the session owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Socket open, handshake in progress.
    Connecting,
    /// Every feed channel is streaming.
    Connected,
}

impl ConnectionState {
    const fn gauge_value(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Background tasks of one connection.
struct Connection {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

struct Inner {
    config: SessionConfig,
    store: Arc<SubscriptionStore>,
    codec: DxLinkCodec,
    protocol: parking_lot::Mutex<ProtocolMachine>,
    writer: Mutex<Option<WsSink>>,
    connection: parking_lot::Mutex<Option<Connection>>,
    generation: AtomicU64,
    sequence: AtomicU64,
    keepalive: Arc<KeepaliveState>,
    status: watch::Sender<ConnectionState>,
    last_error: parking_lot::Mutex<Option<String>>,
    shutdown: CancellationToken,
}

/// DXLink streaming session.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct DxLinkSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DxLinkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DxLinkSession")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("status", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl DxLinkSession {
    /// Create a disconnected session writing into `store`.
    ///
    /// Cancelling `shutdown` stops every connection task and aborts pending
    /// connects and reconnects.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        store: Arc<SubscriptionStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let protocol = ProtocolMachine::new(config.protocol.clone(), config.token.clone());
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                codec: DxLinkCodec::new(),
                protocol: parking_lot::Mutex::new(protocol),
                writer: Mutex::new(None),
                connection: parking_lot::Mutex::new(None),
                generation: AtomicU64::new(0),
                sequence: AtomicU64::new(0),
                keepalive: Arc::new(KeepaliveState::new()),
                status,
                last_error: parking_lot::Mutex::new(None),
                shutdown,
            }),
        }
    }

    /// Shared subscription store.
    #[must_use]
    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.inner.store
    }

    /// Current handshake state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.protocol.lock().state()
    }

    /// Current connection status.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.status.borrow()
    }

    /// Watch connection status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.subscribe()
    }

    /// Keepalive bookkeeping for the current connection.
    #[must_use]
    pub fn keepalive(&self) -> &Arc<KeepaliveState> {
        &self.inner.keepalive
    }

    /// Connect and complete the handshake.
    ///
    /// Returns once every feed channel is streaming. Symbols already in the
    /// store are subscribed as part of the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is already connected, the socket
    /// cannot be opened, or the connection drops during the handshake.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.inner.connection.lock().is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        self.inner.open().await
    }

    /// Close the connection.
    ///
    /// Cancels the background tasks, then closes the socket. Closing a
    /// disconnected session does nothing.
    pub async fn close(&self) {
        let connection = {
            let mut guard = self.inner.connection.lock();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            guard.take()
        };
        let Some(connection) = connection else {
            return;
        };

        connection.cancel.cancel();

        if let Some(mut sink) = self.inner.writer.lock().await.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "Close frame not delivered");
            }
            let _ = sink.close().await;
        }

        let _ = connection.reader.await;
        let _ = connection.keepalive.await;

        self.inner.protocol.lock().reset();
        self.inner.set_status(ConnectionState::Disconnected);
        tracing::info!("DXLink session closed");
    }

    /// Tear the connection down and reconnect with exponential backoff.
    ///
    /// Each attempt re-runs the full handshake; the store's symbols are
    /// resubscribed when the channels come back.
    ///
    /// # Errors
    ///
    /// Returns `ReconnectError::Exhausted` once the attempt budget is spent,
    /// or `ReconnectError::Cancelled` on shutdown.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.close().await;

        let mut policy = ReconnectPolicy::new(self.inner.config.reconnect.clone());
        let mut last_error = String::from("no attempt made");

        while let Some(delay) = policy.next_delay() {
            let attempt = policy.attempt_count();
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting to DXLink"
            );
            metrics::record_reconnect();

            tokio::select! {
                () = self.inner.shutdown.cancelled() => {
                    return Err(ReconnectError::Cancelled.into());
                }
                () = tokio::time::sleep(delay) => {}
            }

            match self.inner.open().await {
                Ok(()) => {
                    tracing::info!(attempt, "DXLink reconnected");
                    return Ok(());
                }
                Err(SessionError::Cancelled) => return Err(ReconnectError::Cancelled.into()),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                    last_error = e.to_string();
                    self.close().await;
                }
            }
        }

        Err(ReconnectError::Exhausted {
            attempts: policy.attempt_count(),
            last_error,
        }
        .into())
    }

    /// Drop every subscription: clear the store and reset each streaming
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns an error if a reset message cannot be written.
    pub async fn reset_subscriptions(&self) -> Result<(), SessionError> {
        self.inner.store.reset_data();
        self.inner.publish_counts();

        let mut writer = self.inner.writer.lock().await;
        let messages = self.inner.protocol.lock().reset_messages();
        for message in &messages {
            self.inner.write(writer.as_mut(), message).await?;
        }
        drop(writer);
        tracing::info!(channels = messages.len(), "Subscriptions reset");
        Ok(())
    }

    /// Stream trades for `symbols`.
    ///
    /// # Errors
    ///
    /// Returns an error if a subscription message cannot be written.
    pub async fn subscribe_underlyings(&self, symbols: &[String]) -> Result<(), SessionError> {
        let added: Vec<String> = symbols
            .iter()
            .filter(|symbol| self.inner.store.subscribe_underlying(symbol))
            .cloned()
            .collect();
        self.inner.publish_counts();
        self.inner.push(ChannelKind::Underlying, &added).await
    }
}

#[async_trait]
impl FeedSubscriber for DxLinkSession {
    async fn subscribe(&self, underlyings: &[String], options: &[String]) -> Result<(), PortError> {
        for symbol in underlyings {
            self.inner.store.subscribe_underlying(symbol);
        }
        self.inner.publish_counts();

        self.inner
            .push(ChannelKind::Underlying, underlyings)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        self.inner
            .push(ChannelKind::Options, options)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))
    }
}

// =============================================================================
// Connection Internals
// =============================================================================

impl Inner {
    async fn open(self: &Arc<Self>) -> Result<(), SessionError> {
        self.set_status(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to DXLink");

        let ws_stream = match connect_async(&self.config.url).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                self.set_status(ConnectionState::Disconnected);
                metrics::record_error(ErrorKind::Socket);
                return Err(e.into());
            }
        };
        let (write, read) = ws_stream.split();
        *self.writer.lock().await = Some(write);
        *self.last_error.lock() = None;
        self.keepalive.reset();
        let setup = self.protocol.lock().start();

        let generation = {
            let mut guard = self.connection.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let cancel = self.shutdown.child_token();

            let keepalive = KeepaliveTask::new(
                self.config.keepalive.clone(),
                Arc::clone(&self.keepalive),
                Arc::clone(self) as Arc<dyn KeepaliveSink>,
                cancel.clone(),
            );
            let keepalive = tokio::spawn(keepalive.run());
            let reader = tokio::spawn(Arc::clone(self).read_loop(read, generation, cancel.clone()));

            *guard = Some(Connection {
                cancel,
                reader,
                keepalive,
            });
            generation
        };

        let mut status = self.status.subscribe();
        if let Err(e) = self.send(&setup).await {
            self.drop_connection(generation, format!("SETUP failed: {e}"))
                .await;
            return Err(e);
        }

        let outcome = tokio::select! {
            () = self.shutdown.cancelled() => return Err(SessionError::Cancelled),
            result = status.wait_for(|state| *state != ConnectionState::Connecting) => {
                result.map(|state| *state)
            }
        };

        match outcome {
            Ok(ConnectionState::Connected) => Ok(()),
            _ => {
                let reason = self
                    .last_error
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "connection closed".to_string());
                Err(SessionError::HandshakeFailed(reason))
            }
        }
    }

    async fn read_loop(self: Arc<Self>, mut read: WsSource, generation: u64, cancel: CancellationToken) {
        let reason = loop {
            tokio::select! {
                () = cancel.cancelled() => break "cancelled".to_string(),
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str(), generation).await,
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = self.send_frame(Message::Pong(data)).await {
                            tracing::debug!(error = %e, "Failed to answer ping");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break format!("server closed connection: {frame:?}");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) if is_fatal(&e) => {
                        metrics::record_error(ErrorKind::Socket);
                        break format!("read failed: {e}");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Dropping unreadable frame");
                        metrics::record_error(ErrorKind::Decode);
                    }
                    None => break "stream ended".to_string(),
                }
            }
        };

        if !cancel.is_cancelled() {
            tracing::warn!(reason = %reason, "DXLink connection lost");
        }
        self.drop_connection(generation, reason).await;
    }

    /// Handle one text frame.
    async fn dispatch(self: &Arc<Self>, text: &str, generation: u64) {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, payload = preview(text), "Dropping undecodable message");
                metrics::record_error(ErrorKind::Decode);
                return;
            }
        };
        metrics::record_message_received(message.type_name());

        match message {
            ServerMessage::FeedData(data) => {
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.ingest(&data) });
            }
            ServerMessage::Keepalive(_) => {
                self.keepalive.record_echo();
                tracing::trace!("server <- KEEPALIVE");
            }
            ServerMessage::Error(err) => {
                tracing::warn!(
                    channel = err.channel,
                    error = %err.error,
                    message = %err.message,
                    "DXLink server error"
                );
                metrics::record_error(ErrorKind::Server);
            }
            ServerMessage::Unknown { msg_type } => {
                tracing::debug!(msg_type = %msg_type, "Ignoring unhandled message type");
            }
            control => self.handle_control(&control, generation).await,
        }
    }

    /// Advance the handshake and send the replies in order.
    async fn handle_control(&self, message: &ServerMessage, generation: u64) {
        tracing::debug!(message_type = message.type_name(), "server <-");

        let mut writer = self.writer.lock().await;
        let (result, before, after) = {
            let mut protocol = self.protocol.lock();
            let before = protocol.state();
            let result = protocol.on_message(message, &self.store);
            (result, before, protocol.state())
        };

        let replies = match result {
            Ok(replies) => replies,
            Err(e) => {
                tracing::error!(error = %e, state = before.as_str(), "DXLink handshake failed");
                metrics::record_error(ErrorKind::Protocol);
                drop(writer);
                self.drop_connection(generation, e.to_string()).await;
                return;
            }
        };

        for reply in &replies {
            if let Err(e) = self.write(writer.as_mut(), reply).await {
                tracing::warn!(error = %e, message_type = reply.type_name(), "Failed to send reply");
                metrics::record_error(ErrorKind::Socket);
                return;
            }
        }
        drop(writer);

        if before != after {
            tracing::debug!(from = before.as_str(), to = after.as_str(), "Session state changed");
        }
        if after == SessionState::Streaming && before != SessionState::Streaming {
            self.publish_counts();
            self.set_status(ConnectionState::Connected);
        }
    }

    /// Decode a `FEED_DATA` payload and apply it to the store.
    fn ingest(&self, data: &FeedDataMessage) {
        let started = Instant::now();

        let events = match decode_feed_data(&data.data) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(channel = data.channel, error = %e, "Dropping malformed feed data");
                metrics::record_error(ErrorKind::Decode);
                return;
            }
        };

        let mut per_type = [0_u64; 4];
        for event in &events {
            per_type[event_slot(event.event_type())] += 1;
        }

        let stats = self.store.apply_events(events);

        for event_type in [
            EventType::Quote,
            EventType::Trade,
            EventType::Greeks,
            EventType::Candle,
        ] {
            let count = per_type[event_slot(event_type)];
            if count > 0 {
                metrics::record_feed_events(event_type.tag(), count);
            }
        }
        if stats.dropped > 0 {
            tracing::debug!(
                channel = data.channel,
                dropped = stats.dropped,
                "Dropped events for unsubscribed symbols"
            );
            metrics::record_feed_events_dropped(stats.dropped as u64);
        }
        tracing::trace!(
            channel = data.channel,
            applied = stats.applied,
            quotes = per_type[0],
            trades = per_type[1],
            greeks = per_type[2],
            candles = per_type[3],
            "Feed data applied"
        );
        metrics::record_feed_processing(started.elapsed());
    }

    /// Send subscriptions for `symbols` if `kind` is streaming.
    async fn push(&self, kind: ChannelKind, symbols: &[String]) -> Result<(), SessionError> {
        if symbols.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        let messages = self.protocol.lock().subscription_messages(kind, symbols);
        if messages.is_empty() {
            tracing::debug!(
                channel = %kind,
                symbols = symbols.len(),
                "Channel not streaming, subscriptions deferred"
            );
        }
        for message in &messages {
            self.write(writer.as_mut(), message).await?;
        }
        Ok(())
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        self.write(writer.as_mut(), message).await
    }

    /// Write `message` through a sink the caller has already locked.
    async fn write(
        &self,
        sink: Option<&mut WsSink>,
        message: &ClientMessage,
    ) -> Result<(), SessionError> {
        let text = self.codec.encode(message)?;
        let sink = sink.ok_or(SessionError::NotConnected)?;
        sink.send(Message::Text(text.clone().into())).await?;

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        if matches!(message, ClientMessage::Auth { .. }) {
            tracing::debug!(seq, message_type = "AUTH", "client ->");
        } else {
            tracing::debug!(seq, message_type = message.type_name(), payload = preview(&text), "client ->");
        }
        metrics::record_message_sent(message.type_name());
        Ok(())
    }

    async fn send_frame(&self, frame: Message) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(SessionError::NotConnected)?;
        sink.send(frame).await?;
        Ok(())
    }

    /// Tear down connection `generation` if it is still the current one.
    async fn drop_connection(&self, generation: u64, reason: String) {
        let connection = {
            let mut guard = self.connection.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            guard.take()
        };
        let Some(connection) = connection else {
            return;
        };

        connection.cancel.cancel();
        self.writer.lock().await.take();
        self.protocol.lock().reset();
        *self.last_error.lock() = Some(reason);
        self.set_status(ConnectionState::Disconnected);
    }

    fn set_status(&self, state: ConnectionState) {
        metrics::set_connection_state(state.gauge_value());
        let previous = self.status.send_replace(state);
        if previous != state {
            tracing::info!(from = ?previous, to = ?state, "DXLink connection state changed");
        }
    }

    fn publish_counts(&self) {
        let (underlyings, options) = self.store.counts();
        metrics::set_subscribed_symbols(underlyings, options);
    }
}

#[async_trait]
impl KeepaliveSink for Inner {
    async fn send_keepalive(&self) -> Result<(), String> {
        self.send(&ClientMessage::keepalive())
            .await
            .map_err(|e| e.to_string())
    }
}

const fn event_slot(event_type: EventType) -> usize {
    match event_type {
        EventType::Quote => 0,
        EventType::Trade => 1,
        EventType::Greeks => 2,
        EventType::Candle => 3,
    }
}

const fn is_fatal(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_) | WsError::Protocol(_)
    )
}

/// Prefix of `text` for logging, cut on a character boundary.
fn preview(text: &str) -> &str {
    if text.len() <= LOG_PREVIEW_LEN {
        return text;
    }
    let mut end = LOG_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        let short = "abc";
        assert_eq!(preview(short), "abc");

        let long = "é".repeat(LOG_PREVIEW_LEN);
        let cut = preview(&long);
        assert!(cut.len() <= LOG_PREVIEW_LEN);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn fatal_errors() {
        assert!(is_fatal(&WsError::ConnectionClosed));
        assert!(is_fatal(&WsError::AlreadyClosed));
        assert!(!is_fatal(&WsError::Capacity(
            tokio_tungstenite::tungstenite::error::CapacityError::MessageTooLong {
                size: 10,
                max_size: 5,
            }
        )));
    }

    #[test]
    fn session_config_from_settings() {
        let settings = crate::SessionSettings {
            keepalive_interval: std::time::Duration::from_secs(5),
            subscription_batch_size: 20,
            max_reconnect_attempts: 7,
            ..crate::SessionSettings::default()
        };
        let config = SessionConfig::from_settings("wss://x", ApiToken::new("t"), &settings);
        assert_eq!(config.keepalive.interval, std::time::Duration::from_secs(5));
        assert_eq!(config.protocol.batch_size, 20);
        assert_eq!(config.reconnect.max_attempts, 7);
    }

    #[tokio::test]
    async fn new_session_is_disconnected() {
        let session = DxLinkSession::new(
            SessionConfig::new("ws://127.0.0.1:9", ApiToken::new("t")),
            Arc::new(SubscriptionStore::new()),
            CancellationToken::new(),
        );
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        session.close().await;
    }

    #[tokio::test]
    async fn subscribing_while_disconnected_defers_to_handshake() {
        let store = Arc::new(SubscriptionStore::new());
        let session = DxLinkSession::new(
            SessionConfig::new("ws://127.0.0.1:9", ApiToken::new("t")),
            Arc::clone(&store),
            CancellationToken::new(),
        );
        session
            .subscribe(&["SPY".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(store.underlying_symbols(), vec!["SPY".to_string()]);
    }

    #[tokio::test]
    async fn reset_while_disconnected_clears_store() {
        let store = Arc::new(SubscriptionStore::new());
        store.subscribe_underlying("SPY");
        let session = DxLinkSession::new(
            SessionConfig::new("ws://127.0.0.1:9", ApiToken::new("t")),
            Arc::clone(&store),
            CancellationToken::new(),
        );
        session.reset_subscriptions().await.unwrap();
        assert_eq!(store.counts(), (0, 0));
    }
}
