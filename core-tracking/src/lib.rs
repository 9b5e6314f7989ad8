//! # Tracker Progress Module
//!
//! Mirrors watch/read progress to remote trackers and redelivers what could
//! not be pushed.
//!
//! ## Components
//!
//! - **Tracker** (`tracker`): push contract implemented per tracker service
//! - **Deferred Update Store** (`store`): durable latest-value-per-track queue
//! - **Delayed Tracking Job** (`job`): attempt-bounded redelivery run by the executor
//! - **Tracking Service** (`service`): push-or-defer entry point

pub mod error;
pub mod job;
pub mod service;
pub mod store;
pub mod tracker;

pub use error::{Result, TrackingError};
pub use job::{DelayedTrackingJob, DeliveryOutcome, DELAYED_TRACKING_TASK};
pub use service::TrackingService;
pub use store::{DeferredUpdateStore, PendingTrackUpdate, SqliteDeferredUpdateStore};
pub use tracker::TrackerClient;
