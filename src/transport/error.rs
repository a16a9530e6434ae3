//! Transport layer error types.

use thiserror::Error;

use super::frame::FrameError;
use crate::core::WireError;

/// Websocket close codes the relay transport distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Ordinary end of session.
    Normal,
    /// Peer is going away.
    GoingAway,
    /// Ended because of a protocol error.
    ProtocolError,
    /// Closed without a close frame.
    Abnormal,
    /// Server-side failure.
    InternalServerError,
    /// Any other code.
    Other(u16),
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseCode::Normal => f.write_str("normalClosure"),
            CloseCode::GoingAway => f.write_str("goingAway"),
            CloseCode::ProtocolError => f.write_str("protocolError"),
            CloseCode::Abnormal => f.write_str("abnormalClosure"),
            CloseCode::InternalServerError => f.write_str("internalServerError"),
            CloseCode::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A received game state could not be decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A received frame could not be parsed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The underlying connection is not (or no longer) connected.
    /// Expected during teardown.
    #[error("not connected")]
    NotConnected,

    /// An in-flight operation was cancelled. Expected during teardown.
    #[error("operation canceled")]
    Cancelled,

    /// The relay connection closed.
    #[error("websocket closed, code={code}{}", reason_suffix(.reason))]
    Closed {
        /// Close code.
        code: CloseCode,
        /// Close reason, if any.
        reason: Option<String>,
    },

    /// Sending failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Receiving failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// Advertising or browsing could not start.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// Relay transport requested without an access token.
    #[error("relay transport requires an access token")]
    MissingAccessToken,

    /// The configured relay endpoint is empty.
    #[error("relay transport requires an endpoint")]
    MissingEndpoint,

    /// The relay endpoint is not a valid URL.
    #[error("invalid relay endpoint: {0}")]
    InvalidEndpoint(String),

    /// The relay connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl TransportError {
    /// Check if this error is an expected consequence of teardown.
    ///
    /// These are swallowed rather than reported.
    pub fn is_expected_teardown(&self) -> bool {
        matches!(self, TransportError::NotConnected | TransportError::Cancelled)
    }

    /// Check if this error means a peer broke the wire protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, TransportError::Wire(_) | TransportError::Frame(_))
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(", reason={r}"))
        .unwrap_or_default()
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
