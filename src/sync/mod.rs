//! Unigame Protocol - Sync Layer
//!
//! Implements:
//! - The wire record exchanged on every turn
//! - Roster convergence and validation
//! - The turn, setup and withdrawal state machine

mod engine;
mod message;
mod roster;

pub use engine::*;
pub use message::*;
pub use roster::*;
