//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host must implement for the library
//! synchronization core.
//!
//! ## Traits
//!
//! - [`BackgroundExecutor`](background::BackgroundExecutor) - Named task scheduling with
//!   backoff and replace/keep conflict policies
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity detection for
//!   network-constrained tasks
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError`
//! and include enough context (task name, path) to act on the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so a single handle can be
//! shared by every refresh worker and background task.

pub mod background;
pub mod error;
pub mod network;
pub mod time;

pub use error::BridgeError;

pub use background::{
    BackgroundExecutor, BackoffKind, BackoffPolicy, ExistingTaskPolicy, OneTimeTaskRequest,
    TaskConstraints, TaskContext, TaskHandler, TaskId, TaskOutcome, TaskStatus,
};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
