//! Remote tracker contract

use crate::error::Result;
use async_trait::async_trait;
use core_library::Track;

/// Pushes progress to the remote tracker a track belongs to.
///
/// Implementations dispatch on `track.tracker_id` and own their transport.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn push_progress(&self, track: &Track, progress: f64) -> Result<()>;
}
