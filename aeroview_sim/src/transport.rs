//! In-memory telemetry transport with scripted faults.
//!
//! Buffers are published by the flight oracle and read by the vehicle
//! controllers exactly like a live simulator bridge, with three knobs:
//!
//! - `refuse_connections`: every `connect()` fails
//! - `sever`: the link drops mid-run and stays down
//! - `with_drop_rate`: each read misses with probability `p` (seeded)

use aeroview_env::{ChannelKey, EnvError, TelemetryTransport};
use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Read/drop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub connects: u64,
    pub reads: u64,
    pub dropped: u64,
}

pub struct ScriptedTransport {
    buffers: Mutex<HashMap<ChannelKey, Vec<u8>>>,
    declared: Mutex<HashSet<ChannelKey>>,
    connected: AtomicBool,
    refuse: AtomicBool,
    drop_rate: f64,
    rng: Mutex<ChaCha8Rng>,

    connects: AtomicU64,
    reads: AtomicU64,
    dropped: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not hide the buffers from the others
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedTransport {
    pub fn new(seed: u64) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            declared: Mutex::new(HashSet::new()),
            connected: AtomicBool::new(false),
            refuse: AtomicBool::new(false),
            drop_rate: 0.0,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            connects: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Probability in [0, 1] that a read returns nothing.
    pub fn with_drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Drops the link and refuses to reconnect.
    pub fn sever(&self) {
        self.refuse.store(true, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Scripted link severed");
        }
    }

    /// Stores the latest buffer for a channel.
    pub fn publish(&self, entity: &str, channel: &str, buf: Vec<u8>) {
        lock(&self.buffers).insert(ChannelKey::new(entity, channel), buf);
    }

    pub fn is_declared(&self, entity: &str, channel: &str) -> bool {
        lock(&self.declared).contains(&ChannelKey::new(entity, channel))
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            connects: self.connects.load(Ordering::SeqCst),
            reads: self.reads.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }

    fn roll_drop(&self) -> bool {
        self.drop_rate > 0.0 && lock(&self.rng).gen_bool(self.drop_rate)
    }
}

#[async_trait]
impl TelemetryTransport for ScriptedTransport {
    async fn connect(&self) -> Result<(), EnvError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(EnvError::connection("scripted refusal"));
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn declare_readable(&self, entity: &str, channel: &str) -> Result<(), EnvError> {
        if !self.is_connected() {
            return Err(EnvError::NotConnected);
        }
        let key = ChannelKey::new(entity, channel);
        debug!("Declared readable: {}", key);
        lock(&self.declared).insert(key);
        Ok(())
    }

    fn read_raw(&self, entity: &str, channel: &str) -> Option<Vec<u8>> {
        if !self.is_connected() {
            return None;
        }
        let key = ChannelKey::new(entity, channel);
        if !lock(&self.declared).contains(&key) {
            return None;
        }

        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.roll_drop() {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        lock(&self.buffers).get(&key).cloned()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
