//! AeroView Environment Abstraction Layer
//!
//! This crate isolates the two things an AeroView viewer needs from the
//! outside world so that the same controllers run against a live simulator
//! link and against the deterministic simulation harness:
//!
//! - Time (`now()`, `sleep()`)
//! - Telemetry transport (`connect()`, `declare_readable()`, `read_raw()`)
//!
//! # Example
//!
//! ```ignore
//! use aeroview_env::{SharedConnection, TelemetryTransport, ViewerContext};
//!
//! async fn attach<T: TelemetryTransport>(link: &SharedConnection<T>) {
//!     if link.acquire().await.is_ok() {
//!         link.transport().declare_readable("Drone", "pos").await.ok();
//!     }
//! }
//! ```

mod context;
mod error;
mod shared;
mod transport;
mod types;

pub use context::ViewerContext;
pub use error::EnvError;
pub use shared::SharedConnection;
pub use transport::TelemetryTransport;
pub use types::ChannelKey;
