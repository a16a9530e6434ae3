//! # Unigame Protocol
//!
//! Synchronization for small turn-based games played by 1 to 6 people,
//! each on their own device.
//!
//! Unigame provides:
//!
//! - **Roster convergence**: every device agrees on who plays and in what order
//! - **Turn ownership**: exactly one player may transmit at a time
//! - **Opaque game state**: the game encodes its own state; Unigame carries it
//! - **Graceful withdrawal**: a leaving player ends the game for everyone
//! - **Two transports**: peer-to-peer proximity, or a brokered relay
//!
//! ## Feature Flags
//!
//! - `relay` (default): Relay transport and its URL building
//! - `persistence` (default): JSON file storage for settings and credentials
//!
//! ## Modules
//!
//! - [`core`]: Game handler trait, players, constants and error types
//! - [`transport`]: Framing, event contract, proximity and relay transports
//! - [`sync`]: Wire record, roster validation and the sync engine
//! - [`config`]: Settings and relay credentials
//! - [`client`]: Session driver
//!
//! ## Example Usage
//!
//! ```rust
//! use std::ops::RangeInclusive;
//! use unigame_protocol::prelude::*;
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: u32,
//! }
//!
//! impl GameHandler for Counter {
//!     fn reset(&mut self) {
//!         self.value = 0;
//!     }
//!
//!     fn state_changed(&mut self, data: &[u8], _during_setup: bool) -> Result<(), GameError> {
//!         let bytes: [u8; 4] = data
//!             .try_into()
//!             .map_err(|_| GameError::new("bad counter"))?;
//!         self.value = u32::from_le_bytes(bytes);
//!         Ok(())
//!     }
//!
//!     fn encode_state(&self, _during_setup: bool) -> Vec<u8> {
//!         self.value.to_le_bytes().to_vec()
//!     }
//!
//!     fn num_player_range(&self) -> RangeInclusive<usize> {
//!         1..=4
//!     }
//!
//!     fn app_id(&self) -> &str {
//!         "counter"
//!     }
//! }
//!
//! let settings = Settings {
//!     user_name: "Ada".into(),
//!     lead_player: true,
//!     num_players: 1,
//!     ..Settings::default()
//! };
//! let mut engine = SyncEngine::new(Counter::default(), settings);
//! assert!(engine.start_solitaire());
//! assert!(engine.is_my_turn());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod config;
pub mod core;
pub mod sync;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{SessionSnapshot, UnigameClient};
    pub use crate::config::{
        CredentialStore, Credentials, MemoryStore, Preferences, Settings, SettingsStore,
        TokenProvider,
    };
    pub use crate::core::*;
    pub use crate::sync::{EventOutcome, GameState, Notice, NoticeKind, Phase, SyncEngine};
    pub use crate::transport::{
        Airspace, Backends, EventStream, ProximityRadio, Transport, TransportConfig,
        TransportError, TransportEvent, make_transport,
    };

    #[cfg(feature = "persistence")]
    pub use crate::config::JsonFileStore;

    #[cfg(feature = "relay")]
    pub use crate::transport::RelayConnector;
}

pub use crate::client::UnigameClient;
pub use crate::core::{GameHandler, Player, UnigameError};
pub use crate::sync::SyncEngine;
