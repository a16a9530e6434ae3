//! Core traits for the Unigame protocol.
//!
//! The synchronization core never looks inside the game payload. Each game
//! supplies a [`GameHandler`] that produces and consumes it.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::error::GameError;

/// Whether a game keeps per-player scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scoring {
    /// No scores are kept or transmitted.
    #[default]
    Off,
    /// Scores are kept in the roster and carried in every record.
    On,
}

/// Game-specific half of a Unigame session.
///
/// # Requirements
///
/// - `encode_state` output MUST be accepted by `state_changed` on every peer
///   running the same `app_id`
/// - `state_changed` MUST NOT assume it is called on every local transmission
///   (records the local player produced are never echoed back)
///
/// # Example
///
/// ```ignore
/// struct Counter { value: u32 }
///
/// impl GameHandler for Counter {
///     fn reset(&mut self) { self.value = 0; }
///
///     fn state_changed(&mut self, data: &[u8], _during_setup: bool) -> Result<(), GameError> {
///         let bytes: [u8; 4] = data.try_into().map_err(|_| GameError::new("bad counter"))?;
///         self.value = u32::from_le_bytes(bytes);
///         Ok(())
///     }
///
///     fn encode_state(&self, _during_setup: bool) -> Vec<u8> {
///         self.value.to_le_bytes().to_vec()
///     }
///
///     fn num_player_range(&self) -> RangeInclusive<usize> { 2..=4 }
///     fn app_id(&self) -> &str { "counter" }
/// }
/// ```
pub trait GameHandler: Send + 'static {
    /// Discard all game state; a new game is starting.
    fn reset(&mut self);

    /// Another player transmitted new state.
    ///
    /// `during_setup` is true only on non-leaders while the leader is still
    /// in its setup phase.
    fn state_changed(&mut self, data: &[u8], during_setup: bool) -> Result<(), GameError>;

    /// Current state for transmission. `during_setup` is only ever true for
    /// the leader.
    fn encode_state(&self, during_setup: bool) -> Vec<u8>;

    /// Allowed player counts.
    fn num_player_range(&self) -> RangeInclusive<usize>;

    /// Identifier scoping discovery and relay groups to this game.
    fn app_id(&self) -> &str;

    /// Human-friendly name.
    fn game_name(&self) -> &str {
        self.app_id()
    }

    /// Whether the game has a leader-only setup phase.
    fn has_setup(&self) -> bool {
        false
    }

    /// Scoring mode at the start of each game.
    fn initial_scoring(&self) -> Scoring {
        Scoring::Off
    }
}

/// A handler with no game logic, for solitaire play and tests.
#[derive(Debug, Clone)]
pub struct SolitaireHandler {
    app_id: String,
    num_players: RangeInclusive<usize>,
}

impl SolitaireHandler {
    /// Create a handler for the given app id allowing 1 to 6 players.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            num_players: 1..=6,
        }
    }
}

impl Default for SolitaireHandler {
    fn default() -> Self {
        Self::new("solitaire")
    }
}

impl GameHandler for SolitaireHandler {
    fn reset(&mut self) {}

    fn state_changed(&mut self, _data: &[u8], _during_setup: bool) -> Result<(), GameError> {
        Ok(())
    }

    fn encode_state(&self, _during_setup: bool) -> Vec<u8> {
        Vec::new()
    }

    fn num_player_range(&self) -> RangeInclusive<usize> {
        self.num_players.clone()
    }

    fn app_id(&self) -> &str {
        &self.app_id
    }
}
