//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `BackgroundExecutor` backed by Tokio tasks inside the host process,
//!   with unique-name work, retry backoff and network constraints
//! - `NetworkMonitor` using a cached TCP reachability probe
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, TokioBackgroundExecutor};
//! use std::sync::Arc;
//!
//! let monitor = Arc::new(DesktopNetworkMonitor::new());
//! let executor = TokioBackgroundExecutor::with_network_monitor(Some(monitor));
//! ```

mod background;
mod network;

pub use background::TokioBackgroundExecutor;
pub use network::DesktopNetworkMonitor;
