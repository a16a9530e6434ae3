//! Unigame Protocol - Configuration
//!
//! User settings with a pluggable persistence port, and bearer credentials
//! for the relay.

mod credentials;
mod settings;

pub use credentials::*;
pub use settings::*;
