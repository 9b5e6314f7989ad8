//! # Repository Pattern Implementation
//!
//! Repository traits with SQLite implementations backed by `sqlx`.
//!
//! - `EntryRepository` - Library entries and their sparse metadata updates
//! - `TrackRepository` - Tracker records and their local progress

pub mod entry;
pub mod track;

pub use entry::{EntryRepository, SqliteEntryRepository};
pub use track::{SqliteTrackRepository, TrackRepository};
