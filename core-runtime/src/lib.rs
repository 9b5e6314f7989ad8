//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the sync engine crates:
//! - Logging and tracing bootstrap
//! - Typed configuration with fail-fast validation
//! - Broadcast event bus for refresh and tracking progress
//!
//! Nothing here knows about library entries or trackers; the domain crates
//! publish into the event bus and read their knobs from [`config::SyncEngineConfig`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
