//! Error types for the Unigame protocol.

use thiserror::Error;

/// Errors that can occur when encoding or decoding a game state record.
///
/// A decode failure means a peer (or the relay) produced bytes that violate
/// the wire layout. It is never recovered from locally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Input is shorter than the header plus the declared scores.
    #[error("game state too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// More scores than the one-byte count can describe.
    #[error("too many scores to encode: {0}")]
    TooManyScores(usize),
}

/// Errors found while validating a complete roster.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RosterError {
    /// More players joined than the leader declared.
    #[error("Too Many Players")]
    TooManyPlayers,

    /// A leader-ordered player appears past index 0.
    #[error("Too Many Leaders")]
    TooManyLeaders,

    /// The player at index 0 is not the leader.
    #[error("No Lead Player")]
    NoLeadPlayer,
}

/// Error reported by a game handler when it cannot accept remote state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct GameError(pub String);

impl GameError {
    /// Create a game error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors in the synchronization engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The local player is missing from a received roster.
    #[error("local player '{0}' is not in the received roster")]
    SelfNotInRoster(String),

    /// Roster validation failed.
    #[error("roster error: {0}")]
    Roster(#[from] RosterError),

    /// A remote record named an active player outside the roster.
    #[error("active player {active} out of range for roster of {len}")]
    ActivePlayerOutOfRange {
        /// Index received.
        active: usize,
        /// Current roster length.
        len: usize,
    },
}

/// Errors in the settings and credential collaborators.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading or writing a backing file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file does not contain valid JSON.
    #[cfg(feature = "persistence")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A setting has a value the protocol cannot use.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Errors while obtaining or storing bearer credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The token provider could not log in.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// Credentials could not be persisted.
    #[error("could not store credentials: {0}")]
    CouldNotStore(#[source] ConfigError),

    /// Stored credentials could not be removed.
    #[error("failure during logout: {0}")]
    LogoutFailure(#[source] ConfigError),
}

/// Top-level Unigame errors.
#[derive(Debug, Error)]
pub enum UnigameError {
    /// Sync engine error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Wire codec error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential error.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The session driver is no longer running.
    #[error("session closed")]
    SessionClosed,
}
