use bridge_traits::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("Invalid progress: {0}")]
    InvalidProgress(String),
}

pub type Result<T> = std::result::Result<T, TrackingError>;
