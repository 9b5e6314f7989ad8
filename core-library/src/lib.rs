//! # Library Module
//!
//! Owns the library database and the on-disk cover cache.
//!
//! - SQLite schema, migrations and connection pooling ([`db`])
//! - Library entries, their sparse updates and tracker records ([`models`])
//! - Repository traits with SQLite implementations ([`repositories`])
//! - Provider and custom cover image cache ([`cover_cache`])

pub mod cover_cache;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use cover_cache::{CoverCache, CoverKind, FsCoverCache};
pub use error::{LibraryError, Result};
pub use models::{
    EntryStatus, EntryUpdate, LibraryEntry, ProviderId, RemoteMetadata, Track, UpdateStrategy,
};
pub use repositories::{EntryRepository, SqliteEntryRepository, SqliteTrackRepository, TrackRepository};
