use bridge_traits::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("A metadata refresh is already in progress")]
    RefreshInProgress,

    #[error("Refresh worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
