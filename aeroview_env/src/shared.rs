//! Reference-counted access to one telemetry transport.

use crate::error::EnvError;
use crate::transport::TelemetryTransport;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A transport shared by several vehicle controllers.
///
/// Each controller calls `acquire` once when it wants telemetry and
/// `release` once on teardown. The first successful `acquire` opens the
/// link; the last `release` closes it. Controllers never reach for a
/// process-wide connection, they are handed an `Arc<SharedConnection<T>>`.
pub struct SharedConnection<T: TelemetryTransport> {
    transport: Arc<T>,

    /// Number of controllers currently holding a share
    users: Mutex<usize>,
}

impl<T: TelemetryTransport> SharedConnection<T> {
    /// Wraps an existing transport handle.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            users: Mutex::new(0),
        }
    }

    /// Creates an Arc-wrapped connection for handing to controllers.
    pub fn shared(transport: T) -> Arc<Self> {
        Arc::new(Self::new(Arc::new(transport)))
    }

    /// Takes a share of the connection, connecting if the link is down.
    ///
    /// On failure the share is not taken and the caller should fall back to
    /// running without telemetry.
    pub async fn acquire(&self) -> Result<(), EnvError> {
        let mut users = self.users.lock().await;

        if self.transport.is_connected() {
            debug!("Telemetry link already up, reusing ({} users)", *users);
        } else {
            self.transport.connect().await?;
            info!("Telemetry link connected");
        }

        *users += 1;
        Ok(())
    }

    /// Gives back a share; disconnects when the last share is returned.
    pub async fn release(&self) {
        let mut users = self.users.lock().await;
        if *users == 0 {
            return;
        }

        *users -= 1;
        if *users == 0 && self.transport.is_connected() {
            self.transport.disconnect().await;
            info!("Telemetry link disconnected (no remaining users)");
        }
    }

    /// Returns the number of shares currently held.
    pub async fn user_count(&self) -> usize {
        *self.users.lock().await
    }

    /// Returns whether the underlying link is up.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Borrows the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTransport {
        connected: AtomicBool,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        refuse: bool,
    }

    #[async_trait]
    impl TelemetryTransport for CountingTransport {
        async fn connect(&self) -> Result<(), EnvError> {
            if self.refuse {
                return Err(EnvError::connection("refused"));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
        }

        async fn declare_readable(&self, _entity: &str, _channel: &str) -> Result<(), EnvError> {
            Ok(())
        }

        fn read_raw(&self, _entity: &str, _channel: &str) -> Option<Vec<u8>> {
            None
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_shared_connection_connects_once() {
        let link = SharedConnection::shared(CountingTransport::default());

        link.acquire().await.unwrap();
        link.acquire().await.unwrap();

        assert!(link.is_connected());
        assert_eq!(link.user_count().await, 2);
        assert_eq!(link.transport().connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_release_disconnects() {
        let link = SharedConnection::shared(CountingTransport::default());
        link.acquire().await.unwrap();
        link.acquire().await.unwrap();

        link.release().await;
        assert!(link.is_connected());

        link.release().await;
        assert!(!link.is_connected());
        assert_eq!(link.transport().disconnects.load(Ordering::SeqCst), 1);

        // Extra release is harmless
        link.release().await;
        assert_eq!(link.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_connect_takes_no_share() {
        let link = SharedConnection::shared(CountingTransport {
            refuse: true,
            ..Default::default()
        });

        assert!(link.acquire().await.is_err());
        assert_eq!(link.user_count().await, 0);
        assert!(!link.is_connected());
    }
}
