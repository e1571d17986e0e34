//! DXLink Streaming Adapter
//!
//! WebSocket client for the DXLink market data protocol: wire messages, the
//! compact feed decoder, the handshake state machine, keepalive and
//! reconnect handling, and the session that ties them to the subscription
//! store.

pub mod auth;
pub mod channel;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod protocol;
pub mod reconnect;
pub mod session;

pub use auth::{ApiToken, AuthError, AuthHandler, AuthState};
pub use channel::{ChannelKind, ChannelPhase, DEFAULT_BATCH_SIZE, subscription_batches};
pub use codec::{CodecError, DxLinkCodec, decode_feed_data};
pub use heartbeat::{KeepaliveConfig, KeepaliveSink, KeepaliveState, KeepaliveTask};
pub use messages::{ClientMessage, ServerMessage};
pub use protocol::{ProtocolConfig, ProtocolError, ProtocolMachine, SessionState};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use session::{ConnectionState, DxLinkSession, SessionConfig, SessionError};
