//! Telemetry transport abstraction.

use async_trait::async_trait;
use crate::error::EnvError;

/// Source of raw telemetry buffers published by the simulator.
///
/// # Implementations
///
/// - **Production**: a WebSocket/PDU bridge to the running simulator
/// - **Simulation**: `ScriptedTransport`, an in-memory channel map
///
/// # Buffer Flow
///
/// ```text
/// Simulator              Transport                 VehicleController
///   |                        |                             |
///   |-- publish(pos) ------->|                             |
///   |                        |<------ read_raw(pos) -------| (every poll)
///   |                        |------- Some(bytes) -------->|
/// ```
///
/// Reads never block: a channel with nothing new returns the last buffer
/// or `None`, and the caller treats `None` as "no update this cycle".
#[async_trait]
pub trait TelemetryTransport: Send + Sync + 'static {
    /// Opens the connection. Calling it while already connected is a no-op.
    async fn connect(&self) -> Result<(), EnvError>;

    /// Closes the connection. Calling it while disconnected is a no-op.
    async fn disconnect(&self);

    /// Registers interest in a channel so that `read_raw` can serve it.
    async fn declare_readable(&self, entity: &str, channel: &str) -> Result<(), EnvError>;

    /// Returns the latest raw buffer for a declared channel, if any.
    fn read_raw(&self, entity: &str, channel: &str) -> Option<Vec<u8>>;

    /// Returns whether the link is currently up.
    fn is_connected(&self) -> bool;
}
