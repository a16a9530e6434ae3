//! Unigame Protocol - Transport Layer
//!
//! This module implements the transport side of the Unigame protocol. It
//! provides:
//!
//! - **Framing**: [`Frame`] and the one-byte [`MessageType`] tags
//! - **Event contract**: [`TransportEvent`] delivered through an [`EventSink`] /
//!   [`EventStream`] pair
//! - **Proximity transport**: [`ProximityTransport`] over a [`ProximityRadio`]
//! - **Relay transport**: [`RelayTransport`] over a [`RelayConnector`]
//!   (requires the `relay` feature)
//! - **In-memory medium**: [`Airspace`], a [`ProximityRadio`] without radios
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Sync Engine                  │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   framing, discovery, relay protocol    │
//! ├─────────────────────────────────────────┤
//! │   Radio / websocket (external)          │
//! └─────────────────────────────────────────┘
//! ```

mod airspace;
mod error;
mod event;
mod frame;
mod proximity;
#[cfg(feature = "relay")]
mod relay;

use std::sync::Arc;

pub use airspace::Airspace;
pub use error::*;
pub use event::{EventSink, EventStream, TransportEvent};
pub use frame::*;
pub use proximity::{
    Advertisement, DiscoveryInfo, LinkEvent, PeerState, ProximityLink, ProximityRadio,
    ProximityTransport, service_name,
};
#[cfg(feature = "relay")]
pub use relay::{
    RelayCommand, RelayConnector, RelayLink, RelayMessage, RelayRequest, RelayTransport,
    relay_url,
};

use crate::core::Player;
use crate::sync::GameState;

/// A bidirectional channel to the other players of one game.
///
/// Sends are fire-and-forget; anything that goes wrong is reported on the
/// transport's [`EventStream`].
pub trait Transport: Send + Sync {
    /// Send a game state to every other player. A no-op with no peers.
    fn send(&self, state: &GameState);

    /// Send a chat line to every other player.
    fn send_chat(&self, text: &str);

    /// Tear the transport down and close its event stream. Idempotent.
    fn shutdown(&self, due_to_error: bool);
}

/// Everything needed to construct a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Use the proximity transport (no credentials needed).
    pub proximity_only: bool,
    /// The local player.
    pub local_player: Player,
    /// Declared player count (0 = unknown, only the leader knows it).
    pub num_players: usize,
    /// Group token scoping discovery and relay membership.
    pub group_token: String,
    /// Game identifier.
    pub app_id: String,
    /// Bearer token for the relay.
    pub access_token: Option<String>,
    /// Relay endpoint URL.
    pub relay_endpoint: Option<String>,
}

impl TransportConfig {
    /// Start building a config.
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::new()
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl Default for TransportConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfigBuilder {
    /// Create a builder for a relay transport with no player set.
    pub fn new() -> Self {
        Self {
            config: TransportConfig {
                proximity_only: false,
                local_player: Player::with_order("", crate::core::LEADER_ORDER),
                num_players: 0,
                group_token: String::new(),
                app_id: String::new(),
                access_token: None,
                relay_endpoint: None,
            },
        }
    }

    /// Select the proximity transport.
    pub fn proximity_only(mut self, proximity_only: bool) -> Self {
        self.config.proximity_only = proximity_only;
        self
    }

    /// Set the local player.
    pub fn local_player(mut self, player: Player) -> Self {
        self.config.local_player = player;
        self
    }

    /// Set the declared player count.
    pub fn num_players(mut self, num_players: usize) -> Self {
        self.config.num_players = num_players;
        self
    }

    /// Set the group token.
    pub fn group_token(mut self, token: impl Into<String>) -> Self {
        self.config.group_token = token.into();
        self
    }

    /// Set the game identifier.
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.app_id = app_id.into();
        self
    }

    /// Set the relay bearer token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    /// Set the relay endpoint.
    pub fn relay_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.relay_endpoint = Some(endpoint.into());
        self
    }

    /// Finish the config.
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

/// The external I/O layers transports are built on.
#[derive(Clone, Default)]
pub struct Backends {
    proximity: Option<Arc<dyn ProximityRadio>>,
    #[cfg(feature = "relay")]
    relay: Option<Arc<dyn RelayConnector>>,
}

impl Backends {
    /// No backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this radio for proximity transports.
    pub fn with_proximity(mut self, radio: Arc<dyn ProximityRadio>) -> Self {
        self.proximity = Some(radio);
        self
    }

    /// Use this connector for relay transports.
    #[cfg(feature = "relay")]
    pub fn with_relay(mut self, connector: Arc<dyn RelayConnector>) -> Self {
        self.relay = Some(connector);
        self
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Backends");
        s.field("proximity", &self.proximity.is_some());
        #[cfg(feature = "relay")]
        s.field("relay", &self.relay.is_some());
        s.finish()
    }
}

/// Construct the transport selected by `config`.
///
/// Must be called inside a tokio runtime.
pub fn make_transport(
    config: &TransportConfig,
    backends: &Backends,
) -> TransportResult<(Box<dyn Transport>, EventStream)> {
    if config.proximity_only {
        let radio = backends
            .proximity
            .as_deref()
            .ok_or_else(|| TransportError::ConnectionFailed("no proximity radio".into()))?;
        let (transport, events) = ProximityTransport::start(config, radio)?;
        return Ok((Box::new(transport), events));
    }
    make_relay(config, backends)
}

#[cfg(feature = "relay")]
fn make_relay(
    config: &TransportConfig,
    backends: &Backends,
) -> TransportResult<(Box<dyn Transport>, EventStream)> {
    if config.access_token.is_none() {
        return Err(TransportError::MissingAccessToken);
    }
    let connector = backends
        .relay
        .as_deref()
        .ok_or_else(|| TransportError::ConnectionFailed("no relay connector".into()))?;
    let (transport, events) = RelayTransport::connect(config, connector)?;
    Ok((Box::new(transport), events))
}

#[cfg(not(feature = "relay"))]
fn make_relay(
    config: &TransportConfig,
    _backends: &Backends,
) -> TransportResult<(Box<dyn Transport>, EventStream)> {
    if config.access_token.is_none() {
        return Err(TransportError::MissingAccessToken);
    }
    Err(TransportError::ConnectionFailed(
        "relay support not compiled in".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TransportConfigBuilder {
        TransportConfig::builder()
            .local_player(Player::with_order("Ada", 1))
            .num_players(2)
            .group_token("grp")
            .app_id("cards")
    }

    #[test]
    fn test_builder() {
        let config = base().access_token("tok").build();
        assert!(!config.proximity_only);
        assert_eq!(config.num_players, 2);
        assert_eq!(config.access_token.as_deref(), Some("tok"));
        assert_eq!(config.relay_endpoint, None);
    }

    #[tokio::test]
    async fn test_make_proximity() {
        let backends = Backends::new().with_proximity(Arc::new(Airspace::new()));
        let (transport, mut events) =
            make_transport(&base().proximity_only(true).build(), &backends).unwrap();
        transport.shutdown(false);
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_relay_requires_token() {
        let result = make_transport(&base().build(), &Backends::new());
        assert!(matches!(result, Err(TransportError::MissingAccessToken)));
    }

    #[tokio::test]
    async fn test_proximity_requires_radio() {
        let result = make_transport(&base().proximity_only(true).build(), &Backends::new());
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
