//! Relay (brokered) transport.
//!
//! One long-lived bidirectional message channel to a relay server,
//! authenticated with a bearer token. The relay groups connections by the
//! composite key `appId_groupToken`, announces rosters and lost players, and
//! fans game and chat messages out to the rest of the group.
//!
//! The websocket itself is an external collaborator reached through
//! [`RelayConnector`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use super::error::{CloseCode, TransportError, TransportResult};
use super::event::{EventSink, EventStream, TransportEvent};
use super::frame::{FrameError, MessageType, decode_player_list};
use super::{Transport, TransportConfig};
use crate::core::{
    DEFAULT_RELAY_ENDPOINT, GROUP_KEY_SEPARATOR, MSG_TYPE_CHAT, MSG_TYPE_GAME, Player,
    RELAY_GAME_KEY, RELAY_NUM_PLAYERS_KEY, RELAY_PLAYER_KEY,
};
use crate::sync::GameState;

/// A websocket message. Text and binary are both just bytes to the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Binary message.
    Binary(Vec<u8>),
    /// Text message.
    Text(String),
}

impl RelayMessage {
    /// Raw bytes of the message.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            RelayMessage::Binary(bytes) => bytes,
            RelayMessage::Text(text) => text.into_bytes(),
        }
    }
}

/// Instructions to the socket layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    /// Send a message.
    Send(RelayMessage),
    /// Close the connection with the given code.
    Close(CloseCode),
}

/// Everything needed to open the relay connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    /// Endpoint with group, player and (for the leader) player count query.
    pub url: Url,
    /// Bearer token for the `Authorization` header.
    pub bearer: String,
}

impl RelayRequest {
    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer)
    }
}

/// An open relay connection, as channels.
///
/// Send and receive failures (including a close notification) arrive on
/// `inbound` as errors.
#[derive(Debug)]
pub struct RelayLink {
    /// Commands to the socket layer.
    pub commands: mpsc::UnboundedSender<RelayCommand>,
    /// Messages and failures from the socket layer.
    pub inbound: mpsc::UnboundedReceiver<TransportResult<RelayMessage>>,
}

/// Opens relay connections.
pub trait RelayConnector: Send + Sync {
    /// Open a connection for the given request.
    fn connect(&self, request: RelayRequest) -> TransportResult<RelayLink>;
}

/// Build the relay connection URL.
pub fn relay_url(
    endpoint: &str,
    app_id: &str,
    group_token: &str,
    player: &Player,
    num_players: usize,
) -> TransportResult<Url> {
    let mut url = Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
    let group_key = format!("{app_id}{GROUP_KEY_SEPARATOR}{group_token}");
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(RELAY_GAME_KEY, &group_key);
        query.append_pair(RELAY_PLAYER_KEY, &player.token());
        if player.is_leader() {
            query.append_pair(RELAY_NUM_PLAYERS_KEY, &num_players.to_string());
        }
    }
    Ok(url)
}

/// Receive-side protocol state, owned by the pump task.
struct Receiver {
    sink: EventSink,
    last_state: Option<GameState>,
    closing: Arc<AtomicBool>,
}

impl Receiver {
    fn on_inbound(&mut self, inbound: TransportResult<RelayMessage>) {
        match inbound {
            Ok(message) => self.on_message(&message.into_bytes()),
            Err(err) => self.on_failure(err),
        }
    }

    fn on_failure(&self, err: TransportError) {
        if err.is_expected_teardown() {
            tracing::debug!(%err, "ignoring relay teardown error");
            return;
        }
        if matches!(err, TransportError::Closed { .. }) && self.closing.load(Ordering::SeqCst) {
            tracing::debug!(%err, "relay closed after local shutdown");
            return;
        }
        tracing::warn!(%err, "relay failure");
        self.sink.error(err, true);
    }

    fn on_message(&mut self, data: &[u8]) {
        let (msg_type, payload) = match super::frame::Frame::split(data) {
            Ok(split) => split,
            Err(err) => {
                tracing::error!(%err, "protocol error on relay");
                self.sink.error(err.into(), true);
                return;
            }
        };
        tracing::debug!(%msg_type, "message received on relay");
        match msg_type {
            MessageType::Chat => {
                let text = String::from_utf8_lossy(payload).into_owned();
                self.sink.emit(TransportEvent::ChatReceived(text));
            }
            MessageType::Game => match GameState::decode(payload) {
                Ok(state) => self.deliver_state(state),
                Err(err) => {
                    self.sink.error(err.into(), true);
                }
            },
            MessageType::Players => match player_list(payload) {
                Ok((declared, players)) => {
                    self.sink
                        .emit(TransportEvent::RosterObserved { declared, players });
                }
                Err(err) => tracing::warn!(%err, "dropping malformed player list"),
            },
            MessageType::LostPlayer => {
                let token = String::from_utf8_lossy(payload);
                match Player::from_token(&token) {
                    Some(player) => {
                        self.sink.emit(TransportEvent::PlayerLost(player));
                    }
                    None => tracing::warn!(%token, "dropping malformed lost player"),
                }
            }
        }
    }

    fn deliver_state(&mut self, state: GameState) {
        if self.last_state.as_ref() == Some(&state) {
            tracing::trace!("suppressing unchanged game state");
            return;
        }
        self.last_state = Some(state.clone());
        self.sink.emit(TransportEvent::StateChanged(state));
    }

    fn on_end(&self) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        self.sink.error(
            TransportError::Closed {
                code: CloseCode::Abnormal,
                reason: Some("relay connection ended".into()),
            },
            true,
        );
    }
}

fn player_list(payload: &[u8]) -> Result<(usize, Vec<Player>), FrameError> {
    let text = std::str::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)?;
    decode_player_list(text)
}

/// Transport through a relay server.
pub struct RelayTransport {
    commands: mpsc::UnboundedSender<RelayCommand>,
    sink: EventSink,
    closing: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl RelayTransport {
    /// Connect to the relay.
    ///
    /// Fails without an access token. Without an endpoint the default relay
    /// is used. Must be called inside a tokio runtime.
    pub fn connect(
        config: &TransportConfig,
        connector: &dyn RelayConnector,
    ) -> TransportResult<(Self, EventStream)> {
        let bearer = config
            .access_token
            .clone()
            .ok_or(TransportError::MissingAccessToken)?;
        let endpoint = config
            .relay_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_RELAY_ENDPOINT);
        if endpoint.trim().is_empty() {
            return Err(TransportError::MissingEndpoint);
        }
        let url = relay_url(
            endpoint,
            &config.app_id,
            &config.group_token,
            &config.local_player,
            config.num_players,
        )?;
        tracing::info!(player = %config.local_player.token(), "new relay connection");
        if config.local_player.is_leader() {
            tracing::debug!(num_players = config.num_players, "leader; player count sent to relay");
        }

        let RelayLink {
            commands,
            mut inbound,
        } = connector.connect(RelayRequest { url, bearer })?;

        let (sink, stream) = EventSink::channel();
        let closing = Arc::new(AtomicBool::new(false));
        let mut receiver = Receiver {
            sink: sink.clone(),
            last_state: None,
            closing: Arc::clone(&closing),
        };
        let pump = tokio::spawn(async move {
            while let Some(item) = inbound.recv().await {
                receiver.on_inbound(item);
            }
            receiver.on_end();
        });

        let transport = Self {
            commands,
            sink,
            closing,
            pump: Mutex::new(Some(pump)),
        };
        Ok((transport, stream))
    }

    fn submit(&self, message: RelayMessage) {
        if self.commands.send(RelayCommand::Send(message)).is_err() {
            tracing::debug!("relay send after connection ended");
        }
    }
}

impl Transport for RelayTransport {
    fn send(&self, state: &GameState) {
        let mut buf = vec![MSG_TYPE_GAME];
        match state.encode() {
            Ok(encoded) => buf.extend_from_slice(&encoded),
            Err(err) => {
                self.sink.error(err.into(), true);
                return;
            }
        }
        tracing::debug!(len = buf.len(), "sending game state message");
        self.submit(RelayMessage::Binary(buf));
    }

    fn send_chat(&self, text: &str) {
        let mut message = String::with_capacity(text.len() + 1);
        message.push(char::from(MSG_TYPE_CHAT));
        message.push_str(text);
        self.submit(RelayMessage::Text(message));
    }

    fn shutdown(&self, due_to_error: bool) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let code = if due_to_error {
            CloseCode::ProtocolError
        } else {
            CloseCode::Normal
        };
        tracing::info!(%code, "relay: shutting down");
        if self.commands.send(RelayCommand::Close(code)).is_err() {
            tracing::debug!("relay close after connection ended");
        }
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
        self.sink.close();
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}
