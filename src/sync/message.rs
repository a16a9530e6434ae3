//! Game state record
//!
//! The one record replicated between peers.

use crate::core::{GAME_STATE_HEADER_SIZE, MAX_SCORES, SCORE_SIZE, WITHDRAWING, WireError};

/// Game state wire record.
///
/// Wire format:
/// ```text
/// +0   Sending Player (1 byte)
/// +1   Active Player (1 byte, 255 = withdrawing)
/// +2   Score Count N (1 byte)
/// +3   Scores (N x 4 bytes LE i32)
/// +3+4N Game Info (remaining bytes, opaque)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameState {
    /// Roster index of the player that produced this record
    pub sending_player: u8,
    /// Roster index of the player whose turn it is, or [`WITHDRAWING`]
    pub active_player: u8,
    /// Per-player scores (empty when scoring is off)
    pub scores: Vec<i32>,
    /// Game-specific payload
    pub game_info: Vec<u8>,
}

impl GameState {
    /// Create a new record
    pub fn new(sending_player: u8, active_player: u8, game_info: Vec<u8>) -> Self {
        Self {
            sending_player,
            active_player,
            scores: Vec::new(),
            game_info,
        }
    }

    /// Attach scores
    pub fn with_scores(mut self, scores: Vec<i32>) -> Self {
        self.scores = scores;
        self
    }

    /// Create a withdrawal record for the given sender
    pub fn withdrawal(sending_player: u8, scores: Vec<i32>) -> Self {
        Self {
            sending_player,
            active_player: WITHDRAWING,
            scores,
            game_info: Vec::new(),
        }
    }

    /// Check if this record announces the sender's withdrawal
    pub fn is_withdrawal(&self) -> bool {
        self.active_player == WITHDRAWING
    }

    /// Total wire size
    pub fn wire_size(&self) -> usize {
        GAME_STATE_HEADER_SIZE + self.scores.len() * SCORE_SIZE + self.game_info.len()
    }

    /// Encode to wire format
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.scores.len() > MAX_SCORES {
            return Err(WireError::TooManyScores(self.scores.len()));
        }
        let mut buf = Vec::with_capacity(self.wire_size());
        buf.push(self.sending_player);
        buf.push(self.active_player);
        buf.push(self.scores.len() as u8);
        for score in &self.scores {
            buf.extend_from_slice(&score.to_le_bytes());
        }
        buf.extend_from_slice(&self.game_info);
        Ok(buf)
    }

    /// Decode from wire format
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < GAME_STATE_HEADER_SIZE {
            return Err(WireError::TooShort {
                expected: GAME_STATE_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let sending_player = data[0];
        let active_player = data[1];
        let score_count = data[2] as usize;
        let scores_end = GAME_STATE_HEADER_SIZE + score_count * SCORE_SIZE;

        if data.len() < scores_end {
            return Err(WireError::TooShort {
                expected: scores_end,
                actual: data.len(),
            });
        }

        let scores = data[GAME_STATE_HEADER_SIZE..scores_end]
            .chunks_exact(SCORE_SIZE)
            .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self {
            sending_player,
            active_player,
            scores,
            game_info: data[scores_end..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let state = GameState::new(1, 2, vec![9, 8, 7]).with_scores(vec![-5, 0, 1_000_000]);

        let encoded = state.encode().unwrap();
        assert_eq!(encoded.len(), state.wire_size());

        let decoded = GameState::decode(&encoded).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_wire_layout() {
        let state = GameState::new(0, 1, vec![0xAA, 0xBB]).with_scores(vec![-1, 2]);
        let encoded = state.encode().unwrap();
        assert_eq!(encoded, hex::decode("000102ffffffff02000000aabb").unwrap());
    }

    #[test]
    fn test_no_scores_layout() {
        let state = GameState::new(3, 0, b"xy".to_vec());
        assert_eq!(state.encode().unwrap(), hex::decode("0300007879").unwrap());
    }

    #[test]
    fn test_empty_game_info() {
        let state = GameState::new(0, 0, Vec::new());
        let encoded = state.encode().unwrap();
        assert_eq!(encoded.len(), GAME_STATE_HEADER_SIZE);
        assert_eq!(GameState::decode(&encoded).unwrap(), state);
    }

    #[test]
    fn test_withdrawal_record() {
        let state = GameState::withdrawal(2, vec![4, 5]);
        assert!(state.is_withdrawal());
        assert!(state.game_info.is_empty());

        let decoded = GameState::decode(&state.encode().unwrap()).unwrap();
        assert!(decoded.is_withdrawal());
        assert_eq!(decoded.sending_player, 2);
    }

    #[test]
    fn test_withdrawal_ignores_other_fields() {
        // Payload bytes after a withdrawal sentinel still decode, and the
        // record is still a withdrawal.
        let decoded = GameState::decode(&hex::decode("01ff00deadbeef").unwrap()).unwrap();
        assert!(decoded.is_withdrawal());
    }

    #[test]
    fn test_decode_too_short() {
        let result = GameState::decode(&[0, 1]);
        assert_eq!(
            result,
            Err(WireError::TooShort {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_decode_scores_truncated() {
        // Declares two scores but carries only one.
        let result = GameState::decode(&hex::decode("00000201000000").unwrap());
        assert_eq!(
            result,
            Err(WireError::TooShort {
                expected: 11,
                actual: 7
            })
        );
    }

    #[test]
    fn test_too_many_scores() {
        let state = GameState::new(0, 0, Vec::new()).with_scores(vec![0; 256]);
        assert_eq!(state.encode(), Err(WireError::TooManyScores(256)));
    }
}
