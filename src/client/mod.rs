//! Unigame Protocol - Client Library
//!
//! Session driver that runs a [`crate::sync::SyncEngine`] on a background
//! task and exposes it through commands and snapshots.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
