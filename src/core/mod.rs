//! Unigame Protocol - Core traits, types, and constants.
//!
//! This module provides the foundational types shared by the wire codec,
//! the transports and the synchronization engine. It has minimal
//! dependencies and defines the core abstractions.

mod constants;
mod error;
mod player;
mod traits;

pub use constants::*;
pub use error::*;
pub use player::*;
pub use traits::*;
