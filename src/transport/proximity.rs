//! Proximity (peer-to-peer) transport.
//!
//! Every participant advertises and browses at the same time under a service
//! name derived from the app id. The service name is shared by every group
//! playing the same game, so discovery info carries the group token and
//! peers from other groups are ignored. Only the leader's discovery info
//! carries the declared player count.
//!
//! The radio itself (advertising, browsing, sessions) is an external
//! collaborator reached through [`ProximityRadio`] and [`ProximityLink`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::{TransportError, TransportResult};
use super::event::{EventSink, EventStream, TransportEvent};
use super::frame::{Frame, MessageType};
use super::{Transport, TransportConfig};
use crate::core::{
    DISCOVERY_GROUP_TOKEN_KEY, DISCOVERY_NUM_PLAYERS_KEY, INVITATION_TIMEOUT, MAX_SERVICE_NAME_LEN,
    Player, sort_roster,
};
use crate::sync::GameState;

/// Key/value pairs advertised alongside a peer.
pub type DiscoveryInfo = HashMap<String, String>;

/// Session state of one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Not (or no longer) connected.
    NotConnected,
    /// Connection in progress.
    Connecting,
    /// Connected; data can flow.
    Connected,
}

/// Callbacks from the radio layer, delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Browsing found a peer.
    PeerFound {
        /// Peer identifier (its player token).
        peer: String,
        /// The peer's discovery info.
        info: DiscoveryInfo,
    },
    /// Browsing lost sight of a peer.
    PeerLost {
        /// Peer identifier.
        peer: String,
    },
    /// A peer invited us into its session.
    Invitation {
        /// Inviting peer.
        peer: String,
    },
    /// A peer's session state changed.
    PeerState {
        /// Peer identifier.
        peer: String,
        /// New state.
        state: PeerState,
    },
    /// A peer sent data.
    Data {
        /// Sending peer.
        peer: String,
        /// Raw message.
        bytes: Vec<u8>,
    },
    /// Advertising could not start.
    AdvertiseFailed(String),
    /// Browsing could not start.
    BrowseFailed(String),
}

/// What the local device advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Local peer identifier (the local player token).
    pub peer_id: String,
    /// Service name shared by every device running the same game.
    pub service: String,
    /// Discovery info.
    pub info: DiscoveryInfo,
}

/// An open radio session.
pub trait ProximityLink: Send + Sync {
    /// Invite a discovered peer into the local session.
    fn invite(&self, peer: &str, timeout: Duration);

    /// Accept an invitation from a peer.
    fn accept(&self, peer: &str);

    /// Currently connected peers.
    fn connected_peers(&self) -> Vec<String>;

    /// Send reliably to the given peers.
    fn send(&self, data: &[u8], peers: &[String]) -> TransportResult<()>;

    /// Stop advertising and browsing and leave the session.
    fn stop(&self);
}

/// Factory for radio sessions.
pub trait ProximityRadio: Send + Sync {
    /// Start advertising and browsing.
    fn open(
        &self,
        advertisement: Advertisement,
    ) -> TransportResult<(Arc<dyn ProximityLink>, mpsc::UnboundedReceiver<LinkEvent>)>;
}

/// Translate an app id into a legal service name.
///
/// Service names are limited to 15 characters and may not contain
/// underscores.
pub fn service_name(app_id: &str) -> String {
    app_id
        .chars()
        .take(MAX_SERVICE_NAME_LEN)
        .map(|c| if c == '_' { '-' } else { c })
        .collect()
}

struct Inner {
    link: Arc<dyn ProximityLink>,
    sink: EventSink,
    local: Player,
    group_token: String,
    num_players: AtomicUsize,
}

impl Inner {
    fn handle(&self, event: LinkEvent) {
        match event {
            LinkEvent::PeerFound { peer, info } => self.peer_found(&peer, &info),
            LinkEvent::PeerLost { peer } => {
                tracing::debug!(%peer, "peer lost from browsing");
            }
            LinkEvent::Invitation { peer } => {
                tracing::debug!(%peer, "invitation received");
                self.link.accept(&peer);
            }
            LinkEvent::PeerState { peer, state } => self.peer_state(&peer, state),
            LinkEvent::Data { peer, bytes } => self.data(&peer, &bytes),
            LinkEvent::AdvertiseFailed(reason) | LinkEvent::BrowseFailed(reason) => {
                self.sink.error(TransportError::Discovery(reason), false);
            }
        }
    }

    fn peer_found(&self, peer: &str, info: &DiscoveryInfo) {
        if info.get(DISCOVERY_GROUP_TOKEN_KEY) != Some(&self.group_token) {
            tracing::debug!(%peer, "ignoring peer from another group");
            return;
        }
        tracing::debug!(%peer, "peer found, inviting");
        self.link.invite(peer, INVITATION_TIMEOUT);
        if let Some(num_players) = info
            .get(DISCOVERY_NUM_PLAYERS_KEY)
            .and_then(|n| n.parse::<usize>().ok())
        {
            self.num_players.store(num_players, Ordering::SeqCst);
        }
    }

    fn peer_state(&self, peer: &str, state: PeerState) {
        tracing::debug!(%peer, ?state, "peer state changed");
        match state {
            PeerState::NotConnected => {
                if let Some(player) = Player::from_token(peer) {
                    self.sink.emit(TransportEvent::PlayerLost(player));
                }
            }
            PeerState::Connecting => {}
            PeerState::Connected => {
                if self.num_players.load(Ordering::SeqCst) > 0 {
                    self.announce_roster();
                }
            }
        }
    }

    fn announce_roster(&self) {
        let mut players = vec![self.local.clone()];
        players.extend(
            self.link
                .connected_peers()
                .iter()
                .filter_map(|peer| Player::from_token(peer)),
        );
        sort_roster(&mut players);
        self.sink.emit(TransportEvent::RosterObserved {
            declared: self.num_players.load(Ordering::SeqCst),
            players,
        });
    }

    fn data(&self, peer: &str, bytes: &[u8]) {
        let (msg_type, payload) = match Frame::split(bytes) {
            Ok(split) => split,
            Err(err) => {
                tracing::warn!(%peer, %err, "dropping message");
                return;
            }
        };
        tracing::debug!(%peer, %msg_type, "message received");
        match msg_type {
            MessageType::Game => match GameState::decode(payload) {
                Ok(state) => {
                    self.sink.emit(TransportEvent::StateChanged(state));
                }
                Err(err) => {
                    self.sink.error(err.into(), true);
                }
            },
            MessageType::Chat => {
                let text = String::from_utf8_lossy(payload).into_owned();
                self.sink.emit(TransportEvent::ChatReceived(text));
            }
            other => {
                tracing::warn!(%peer, msg_type = %other, "no proximity handling for message type");
            }
        }
    }

    fn broadcast(&self, frame: &Frame) -> TransportResult<bool> {
        let peers = self.link.connected_peers();
        if peers.is_empty() {
            return Ok(false);
        }
        let bytes = frame.encode()?;
        self.link.send(&bytes, &peers)?;
        Ok(true)
    }
}

/// Transport over a proximity radio.
pub struct ProximityTransport {
    inner: Arc<Inner>,
    pump: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ProximityTransport {
    /// Start advertising and browsing.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: &TransportConfig,
        radio: &dyn ProximityRadio,
    ) -> TransportResult<(Self, EventStream)> {
        let mut info = DiscoveryInfo::new();
        info.insert(
            DISCOVERY_GROUP_TOKEN_KEY.to_string(),
            config.group_token.clone(),
        );
        let num_players = if config.local_player.is_leader() {
            info.insert(
                DISCOVERY_NUM_PLAYERS_KEY.to_string(),
                config.num_players.to_string(),
            );
            config.num_players
        } else {
            0
        };

        let advertisement = Advertisement {
            peer_id: config.local_player.token(),
            service: service_name(&config.app_id),
            info,
        };
        tracing::info!(service = %advertisement.service, "proximity: starting advertiser and browser");
        let (link, mut link_events) = radio.open(advertisement)?;

        let (sink, stream) = EventSink::channel();
        let inner = Arc::new(Inner {
            link,
            sink,
            local: config.local_player.clone(),
            group_token: config.group_token.clone(),
            num_players: AtomicUsize::new(num_players),
        });

        let pump_inner = Arc::clone(&inner);
        let pump = tokio::spawn(async move {
            while let Some(event) = link_events.recv().await {
                pump_inner.handle(event);
            }
        });

        let transport = Self {
            inner,
            pump: Mutex::new(Some(pump)),
            stopped: AtomicBool::new(false),
        };
        Ok((transport, stream))
    }

    /// Player count currently known to this transport (0 = unknown).
    pub fn num_players(&self) -> usize {
        self.inner.num_players.load(Ordering::SeqCst)
    }
}

impl Transport for ProximityTransport {
    fn send(&self, state: &GameState) {
        tracing::debug!("sending new game state");
        if let Err(err) = self.inner.broadcast(&Frame::Game(state.clone())) {
            self.inner.sink.error(err, false);
        }
    }

    fn send_chat(&self, text: &str) {
        match self.inner.broadcast(&Frame::Chat(text.to_string())) {
            Ok(true) => {
                tracing::debug!("sent chat message");
                self.inner
                    .sink
                    .emit(TransportEvent::ChatReceived(text.to_string()));
            }
            Ok(false) => {}
            Err(err) => {
                self.inner.sink.error(err, false);
            }
        }
    }

    fn shutdown(&self, due_to_error: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(due_to_error, "proximity: shutting down");
        self.inner.link.stop();
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
        self.inner.sink.close();
    }
}

impl Drop for ProximityTransport {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}
