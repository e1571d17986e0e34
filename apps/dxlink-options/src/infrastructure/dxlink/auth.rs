//! DXLink Authorization
//!
//! DXLink authorizes with a single streamer token sent on the control
//! channel once the server reports `UNAUTHORIZED`.
//!
//! # Authorization Flow
//!
//! 1. Client sends `SETUP`
//! 2. Server replies `SETUP`, then `AUTH_STATE` with `UNAUTHORIZED`
//! 3. Client sends `{"type":"AUTH","channel":0,"token":"..."}`
//! 4. Server replies `AUTH_STATE` with `AUTHORIZED`
//!
//! A second `UNAUTHORIZED` after the token was sent means it was rejected.

use serde::Serialize;
use thiserror::Error;

use super::messages::{AuthStateMessage, AuthorizationState, CONTROL_CHANNEL, ClientMessage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authorization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Token is empty.
    #[error("streamer token cannot be empty")]
    EmptyToken,

    /// Server rejected the token.
    #[error("authorization rejected by server")]
    Rejected,
}

// =============================================================================
// Token
// =============================================================================

/// Streamer token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a token without validation.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Wrap a token, rejecting empty values.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmptyToken` if the token is empty.
    pub fn parse(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Self(token))
    }

    /// Raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiToken([REDACTED])")
    }
}

// =============================================================================
// Authorization State
// =============================================================================

/// Client-side view of authorization progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Token not sent yet.
    #[default]
    Pending,
    /// Token sent, awaiting verdict.
    Authorizing,
    /// Server accepted the token.
    Authorized,
}

/// What the session should do after an `AUTH_STATE` message.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    /// Send this `AUTH` message.
    Send(ClientMessage),
    /// Authorization completed.
    Authorized,
    /// Nothing to do.
    None,
}

/// Tracks authorization for one connection.
#[derive(Debug, Clone)]
pub struct AuthHandler {
    token: ApiToken,
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler for `token`.
    #[must_use]
    pub const fn new(token: ApiToken) -> Self {
        Self {
            token,
            state: AuthState::Pending,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Whether the server accepted the token.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self.state, AuthState::Authorized)
    }

    /// Forget progress for a new connection.
    pub const fn reset(&mut self) {
        self.state = AuthState::Pending;
    }

    /// Process an `AUTH_STATE` message.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` when the server answers the token with
    /// `UNAUTHORIZED`.
    pub fn on_auth_state(&mut self, msg: &AuthStateMessage) -> Result<AuthAction, AuthError> {
        match (msg.state, self.state) {
            (AuthorizationState::Authorized, AuthState::Authorized) => Ok(AuthAction::None),
            (AuthorizationState::Authorized, _) => {
                self.state = AuthState::Authorized;
                Ok(AuthAction::Authorized)
            }
            (AuthorizationState::Unauthorized, AuthState::Authorizing) => Err(AuthError::Rejected),
            (AuthorizationState::Unauthorized, _) => {
                self.state = AuthState::Authorizing;
                Ok(AuthAction::Send(ClientMessage::Auth {
                    channel: CONTROL_CHANNEL,
                    token: self.token.clone(),
                }))
            }
        }
    }
}
