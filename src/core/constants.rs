//! Protocol constants for the Unigame wire format and transports.
//!
//! The wire values are shared by every peer and by the relay and MUST NOT be
//! changed within a single app identifier.

use std::time::Duration;

// =============================================================================
// WIRE RECORD
// =============================================================================

/// Fixed header size of an encoded game state (sender + active + score count).
pub const GAME_STATE_HEADER_SIZE: usize = 3;

/// Size of one encoded score (signed 32-bit, little-endian).
pub const SCORE_SIZE: usize = 4;

/// Maximum number of scores a single record can carry.
pub const MAX_SCORES: usize = u8::MAX as usize;

/// Reserved `active_player` value announcing that the sender is withdrawing.
pub const WITHDRAWING: u8 = 255;

/// Largest roster a record can address (the sentinel is not an index).
pub const MAX_PLAYERS: usize = WITHDRAWING as usize;

/// Roster order value that marks the leader.
pub const LEADER_ORDER: u32 = 1;

// =============================================================================
// MESSAGE TYPE TAGS
// =============================================================================

/// Chat message (UTF-8 text follows).
pub const MSG_TYPE_CHAT: u8 = b'C';

/// Encoded game state follows.
pub const MSG_TYPE_GAME: u8 = b'G';

/// Roster announcement from the relay (delimited text follows).
pub const MSG_TYPE_PLAYERS: u8 = b'P';

/// Lost player notification from the relay (player token follows).
pub const MSG_TYPE_LOST_PLAYER: u8 = b'L';

// =============================================================================
// PROXIMITY TRANSPORT
// =============================================================================

/// Longest service name the proximity radio layer accepts.
pub const MAX_SERVICE_NAME_LEN: usize = 15;

/// Bounded timeout for a single peer invitation.
pub const INVITATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Discovery info key carrying the group token.
pub const DISCOVERY_GROUP_TOKEN_KEY: &str = "GroupToken";

/// Discovery info key carrying the leader's declared player count.
pub const DISCOVERY_NUM_PLAYERS_KEY: &str = "NumPlayers";

// =============================================================================
// RELAY TRANSPORT
// =============================================================================

/// Relay endpoint used when the settings name none.
pub const DEFAULT_RELAY_ENDPOINT: &str = "wss://unigame-befsi.ondigitalocean.app/websocket";

/// Query parameter carrying the composite group key (`appId_groupToken`).
pub const RELAY_GAME_KEY: &str = "GameToken";

/// Query parameter carrying the local player token.
pub const RELAY_PLAYER_KEY: &str = "Player";

/// Query parameter carrying the leader's declared player count.
pub const RELAY_NUM_PLAYERS_KEY: &str = "NumPlayers";

/// Separator between app id and group token in the composite group key.
pub const GROUP_KEY_SEPARATOR: char = '_';

// =============================================================================
// PLAYER TOKENS
// =============================================================================

/// Separator between order and name in a player token.
pub const PLAYER_TOKEN_SEPARATOR: char = ':';

/// Separator between entries of a relay roster announcement.
pub const PLAYER_LIST_SEPARATOR: char = '\n';
