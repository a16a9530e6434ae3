//! Transport message framing.
//!
//! Every message on either transport is a one-byte type tag followed by its
//! payload:
//!
//! ```text
//! +0  Type (1 byte: 'C', 'G', 'P' or 'L')
//! +1  Payload (remaining bytes)
//! ```
//!
//! Both transports send and receive `Chat` and `Game`. Only the relay sends
//! `Players` and `LostPlayer`.

use thiserror::Error;

use crate::core::{
    MSG_TYPE_CHAT, MSG_TYPE_GAME, MSG_TYPE_LOST_PLAYER, MSG_TYPE_PLAYERS, PLAYER_LIST_SEPARATOR,
    Player, WireError, sort_roster,
};
use crate::sync::GameState;

/// Frame parsing errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame has no type byte.
    #[error("empty frame")]
    Empty,

    /// Unrecognized type byte.
    #[error("unknown message type {0:#04x}")]
    UnknownType(u8),

    /// A text payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// A roster announcement could not be parsed.
    #[error("invalid player list: {0}")]
    InvalidPlayerList(String),

    /// A lost player notification could not be parsed.
    #[error("invalid player token: {0}")]
    InvalidPlayerToken(String),
}

/// One-byte message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Chat text.
    Chat,
    /// Encoded game state.
    Game,
    /// Roster announcement (relay only).
    Players,
    /// Lost player notification (relay only).
    LostPlayer,
}

impl MessageType {
    /// All message types.
    pub const ALL: [MessageType; 4] = [
        MessageType::Chat,
        MessageType::Game,
        MessageType::Players,
        MessageType::LostPlayer,
    ];

    /// Wire code.
    pub fn code(self) -> u8 {
        match self {
            MessageType::Chat => MSG_TYPE_CHAT,
            MessageType::Game => MSG_TYPE_GAME,
            MessageType::Players => MSG_TYPE_PLAYERS,
            MessageType::LostPlayer => MSG_TYPE_LOST_PLAYER,
        }
    }

    /// Look up a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Name for logs.
    pub fn display(self) -> &'static str {
        match self {
            MessageType::Chat => "CHAT",
            MessageType::Game => "GAME",
            MessageType::Players => "PLAYER LIST",
            MessageType::LostPlayer => "LOST PLAYER",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display())
    }
}

/// A decoded transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Chat text.
    Chat(String),
    /// Game state.
    Game(GameState),
    /// Roster announcement: declared count and sorted players.
    Players(usize, Vec<Player>),
    /// A player the relay lost contact with.
    LostPlayer(Player),
}

impl Frame {
    /// Message type of this frame.
    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::Chat(_) => MessageType::Chat,
            Frame::Game(_) => MessageType::Game,
            Frame::Players(..) => MessageType::Players,
            Frame::LostPlayer(_) => MessageType::LostPlayer,
        }
    }

    /// Encode to wire format.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = vec![self.message_type().code()];
        match self {
            Frame::Chat(text) => buf.extend_from_slice(text.as_bytes()),
            Frame::Game(state) => buf.extend_from_slice(&state.encode()?),
            Frame::Players(count, players) => {
                buf.extend_from_slice(encode_player_list(*count, players).as_bytes())
            }
            Frame::LostPlayer(player) => buf.extend_from_slice(player.token().as_bytes()),
        }
        Ok(buf)
    }

    /// Split a raw message into its type and payload.
    ///
    /// Unknown types are returned as [`FrameError::UnknownType`]; whether that
    /// is fatal is up to the transport.
    pub fn split(data: &[u8]) -> Result<(MessageType, &[u8]), FrameError> {
        let (&code, payload) = data.split_first().ok_or(FrameError::Empty)?;
        let msg_type = MessageType::from_code(code).ok_or(FrameError::UnknownType(code))?;
        Ok((msg_type, payload))
    }

    /// Decode a complete frame.
    pub fn decode(data: &[u8]) -> Result<Self, super::TransportError> {
        let (msg_type, payload) = Self::split(data)?;
        let frame = match msg_type {
            MessageType::Chat => Frame::Chat(String::from_utf8_lossy(payload).into_owned()),
            MessageType::Game => Frame::Game(GameState::decode(payload)?),
            MessageType::Players => {
                let text = std::str::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)?;
                let (count, players) = decode_player_list(text)?;
                Frame::Players(count, players)
            }
            MessageType::LostPlayer => {
                let text = std::str::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)?;
                let player = Player::from_token(text)
                    .ok_or_else(|| FrameError::InvalidPlayerToken(text.to_string()))?;
                Frame::LostPlayer(player)
            }
        };
        Ok(frame)
    }
}

/// Encode a roster announcement: the count, then one token per line.
pub fn encode_player_list(num_players: usize, players: &[Player]) -> String {
    let mut out = num_players.to_string();
    for player in players {
        out.push(PLAYER_LIST_SEPARATOR);
        out.push_str(&player.token());
    }
    out
}

/// Decode a roster announcement. The players come back sorted.
pub fn decode_player_list(text: &str) -> Result<(usize, Vec<Player>), FrameError> {
    let mut lines = text.split(PLAYER_LIST_SEPARATOR);
    let count = lines
        .next()
        .and_then(|c| c.trim().parse::<usize>().ok())
        .ok_or_else(|| FrameError::InvalidPlayerList(format!("bad player count in {text:?}")))?;

    let mut players = lines
        .filter(|line| !line.is_empty())
        .map(|line| {
            Player::from_token(line)
                .ok_or_else(|| FrameError::InvalidPlayerList(format!("bad player token {line:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    sort_roster(&mut players);
    Ok((count, players))
}
