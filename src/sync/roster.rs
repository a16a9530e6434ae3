//! Roster convergence
//!
//! Tracks the list of players for the current game and decides when it is
//! complete.

use crate::core::{Player, RosterError, SyncError};

/// Outcome of folding a roster announcement into the local roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterStatus {
    /// The player count is still unknown (non-leader that has not heard it).
    CountUnknown,
    /// Fewer players than declared so far.
    Incomplete {
        /// Players present.
        present: usize,
        /// Players declared.
        declared: usize,
    },
    /// Exactly the declared players with one leader at index 0.
    Complete,
}

/// The ordered list of players for one game.
///
/// Always contains the local player. Index 0 is the leader once complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    players: Vec<Player>,
    local_index: usize,
    complete: bool,
}

impl Roster {
    /// Create a roster holding only the local player.
    pub fn new(local: Player) -> Self {
        Self {
            players: vec![local],
            local_index: 0,
            complete: false,
        }
    }

    /// All players in roster order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Number of players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Always false; a roster holds at least the local player.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Index of the local player.
    pub fn local_index(&self) -> usize {
        self.local_index
    }

    /// The local player.
    pub fn local(&self) -> &Player {
        &self.players[self.local_index]
    }

    /// Player at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Player> {
        self.players.get(index)
    }

    /// Whether the roster has converged.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Mark a single-player roster complete (solitaire play).
    pub fn complete_solitaire(&mut self) {
        self.players.truncate(1);
        self.local_index = 0;
        self.complete = true;
    }

    /// Replace the roster with an announced one.
    ///
    /// `players` must already be sorted. The local player is found again by
    /// name; failing that is a protocol error, since it means two devices
    /// share a name or a transport dropped this device from its own list.
    pub fn replace(
        &mut self,
        players: Vec<Player>,
        local_name: &str,
        num_players: usize,
    ) -> Result<RosterStatus, SyncError> {
        let local_index = players
            .iter()
            .position(|p| p.name == local_name)
            .ok_or_else(|| SyncError::SelfNotInRoster(local_name.to_string()))?;

        self.players = players;
        self.local_index = local_index;
        self.complete = false;

        if num_players == 0 {
            return Ok(RosterStatus::CountUnknown);
        }
        if self.players.len() < num_players {
            return Ok(RosterStatus::Incomplete {
                present: self.players.len(),
                declared: num_players,
            });
        }

        validate(&self.players, num_players)?;
        self.complete = true;
        Ok(RosterStatus::Complete)
    }

    /// Set a player's score. Indices past the end are ignored.
    pub fn set_score(&mut self, index: usize, score: i32) {
        if let Some(player) = self.players.get_mut(index) {
            player.score = score;
        }
    }

    /// Overwrite scores index by index, ignoring any beyond the roster.
    pub fn apply_scores(&mut self, scores: &[i32]) {
        for (player, score) in self.players.iter_mut().zip(scores) {
            player.score = *score;
        }
    }

    /// Current scores in roster order.
    pub fn scores(&self) -> Vec<i32> {
        self.players.iter().map(|p| p.score).collect()
    }

    /// Mark the player at `index` withdrawn. Returns false if out of range.
    pub fn mark_withdrawn(&mut self, index: usize) -> bool {
        match self.players.get_mut(index) {
            Some(player) => {
                player.withdrawn = true;
                true
            }
            None => false,
        }
    }

    /// Whether a player with this name is marked withdrawn.
    pub fn is_withdrawn(&self, name: &str) -> bool {
        self.players.iter().any(|p| p.name == name && p.withdrawn)
    }

    /// Whether every player other than the local one has withdrawn.
    pub fn all_others_withdrawn(&self) -> bool {
        self.players
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.local_index)
            .all(|(_, p)| p.withdrawn)
    }
}

/// Validate a roster that is at least as long as the declared count.
///
/// A complete roster has exactly `num_players` members, exactly one of
/// which is the leader, and the leader is at index 0.
pub fn validate(players: &[Player], num_players: usize) -> Result<(), RosterError> {
    if players.len() > num_players {
        return Err(RosterError::TooManyPlayers);
    }
    for (index, player) in players.iter().enumerate() {
        if player.is_leader() {
            if index > 0 {
                return Err(RosterError::TooManyLeaders);
            }
        } else if index == 0 {
            return Err(RosterError::NoLeadPlayer);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(name: &str) -> Player {
        Player::with_order(name, 1)
    }

    fn member(name: &str, order: u32) -> Player {
        Player::with_order(name, order)
    }

    #[test]
    fn test_new_roster() {
        let roster = Roster::new(lead("Ada"));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.local_index(), 0);
        assert!(!roster.is_complete());
    }

    #[test]
    fn test_complete_roster() {
        let mut roster = Roster::new(member("Bob", 7));
        let status = roster
            .replace(vec![lead("Ada"), member("Bob", 7)], "Bob", 2)
            .unwrap();
        assert_eq!(status, RosterStatus::Complete);
        assert!(roster.is_complete());
        assert_eq!(roster.local_index(), 1);
    }

    #[test]
    fn test_incomplete_roster() {
        let mut roster = Roster::new(lead("Ada"));
        let status = roster
            .replace(vec![lead("Ada"), member("Bob", 7)], "Ada", 3)
            .unwrap();
        assert_eq!(
            status,
            RosterStatus::Incomplete {
                present: 2,
                declared: 3
            }
        );
        assert!(!roster.is_complete());
    }

    #[test]
    fn test_count_unknown() {
        let mut roster = Roster::new(member("Bob", 7));
        let status = roster
            .replace(vec![lead("Ada"), member("Bob", 7)], "Bob", 0)
            .unwrap();
        assert_eq!(status, RosterStatus::CountUnknown);
    }

    #[test]
    fn test_self_absent() {
        let mut roster = Roster::new(lead("Ada"));
        let result = roster.replace(vec![lead("Zoe"), member("Bob", 7)], "Ada", 2);
        assert_eq!(result, Err(SyncError::SelfNotInRoster("Ada".into())));
    }

    #[test]
    fn test_too_many_players() {
        let players = vec![lead("Ada"), member("Bob", 7), member("Cy", 8)];
        assert_eq!(validate(&players, 2), Err(RosterError::TooManyPlayers));
    }

    #[test]
    fn test_no_leaders_never_complete() {
        let mut roster = Roster::new(member("Bob", 7));
        let result = roster.replace(vec![member("Bob", 7), member("Cy", 8)], "Bob", 2);
        assert_eq!(result, Err(SyncError::Roster(RosterError::NoLeadPlayer)));
        assert!(!roster.is_complete());
    }

    #[test]
    fn test_two_leaders_never_complete() {
        let mut roster = Roster::new(lead("Ada"));
        let result = roster.replace(vec![lead("Ada"), lead("Bea")], "Ada", 2);
        assert_eq!(result, Err(SyncError::Roster(RosterError::TooManyLeaders)));
        assert!(!roster.is_complete());
    }

    #[test]
    fn test_leader_not_first() {
        // One leader, but delivered out of order.
        let players = vec![member("P1", 2), lead("P0")];
        assert_eq!(validate(&players, 2), Err(RosterError::NoLeadPlayer));
    }

    #[test]
    fn test_scores() {
        let mut roster = Roster::new(lead("Ada"));
        roster
            .replace(vec![lead("Ada"), member("Bob", 7)], "Ada", 2)
            .unwrap();
        roster.apply_scores(&[3, 4, 99]);
        assert_eq!(roster.scores(), vec![3, 4]);
        roster.set_score(1, -2);
        roster.set_score(5, 1);
        assert_eq!(roster.scores(), vec![3, -2]);
    }

    #[test]
    fn test_withdrawn_tracking() {
        let mut roster = Roster::new(lead("Ada"));
        roster
            .replace(
                vec![lead("Ada"), member("Bob", 7), member("Cy", 8)],
                "Ada",
                3,
            )
            .unwrap();
        assert!(!roster.all_others_withdrawn());
        assert!(roster.mark_withdrawn(1));
        assert!(!roster.all_others_withdrawn());
        assert!(roster.mark_withdrawn(2));
        assert!(roster.all_others_withdrawn());
        assert!(roster.is_withdrawn("Bob"));
        assert!(!roster.is_withdrawn("Ada"));
        assert!(!roster.mark_withdrawn(9));
    }
}
