//! Player identity.
//!
//! A player is identified on the wire by its *token*, `"<order>:<name>"`.
//! The proximity transport uses the token as the peer display name and the
//! relay uses it as the player query parameter, so any peer can turn an
//! opaque peer identifier back into a [`Player`].

use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::constants::{LEADER_ORDER, PLAYER_LIST_SEPARATOR, PLAYER_TOKEN_SEPARATOR};

/// One participant in a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Display name, also used to find the local player in a roster.
    pub name: String,
    /// 1 for the leader, otherwise ascending in join order.
    pub order: u32,
    /// Current score (meaningful only when scoring is on).
    pub score: i32,
    /// Set once this player has announced withdrawal.
    pub withdrawn: bool,
}

impl Player {
    /// Create the local player at the start of a game.
    ///
    /// A leader gets order 1. Anyone else gets a provisional order taken from
    /// the wall clock, so players who join later sort after earlier ones.
    pub fn new(name: impl Into<String>, leader: bool) -> Self {
        let order = if leader {
            LEADER_ORDER
        } else {
            provisional_order()
        };
        Self::with_order(name, order)
    }

    /// Create a player with an explicit order.
    pub fn with_order(name: impl Into<String>, order: u32) -> Self {
        Self {
            name: name.into(),
            order,
            score: 0,
            withdrawn: false,
        }
    }

    /// Whether this player is the leader.
    pub fn is_leader(&self) -> bool {
        self.order == LEADER_ORDER
    }

    /// The opaque identity token for this player.
    pub fn token(&self) -> String {
        format!("{}{}{}", self.order, PLAYER_TOKEN_SEPARATOR, self.name)
    }

    /// Parse a player back out of its token.
    ///
    /// Returns `None` if the order is not a positive integer or the name is
    /// empty or contains a list separator.
    pub fn from_token(token: &str) -> Option<Self> {
        let (order, name) = token.split_once(PLAYER_TOKEN_SEPARATOR)?;
        let order: u32 = order.parse().ok()?;
        if order == 0 || name.is_empty() || name.contains(PLAYER_LIST_SEPARATOR) {
            return None;
        }
        Some(Self::with_order(name, order))
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Roster ordering: by order ascending, then by name for a stable tie-break.
pub fn roster_order(a: &Player, b: &Player) -> Ordering {
    a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name))
}

/// Sort players into roster order.
pub fn sort_roster(players: &mut [Player]) {
    players.sort_by(roster_order);
}

fn provisional_order() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    // Keep clear of the leader marker even with a broken clock.
    (secs.min(u64::from(u32::MAX)) as u32).max(LEADER_ORDER + 1)
}
