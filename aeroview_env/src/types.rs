//! Common types for the AeroView environment abstraction.

use serde::{Deserialize, Serialize};

/// Address of one telemetry channel: the owning entity plus the channel name.
///
/// Both parts are opaque to the transport layer; the core only agrees on
/// names such as `"pos"` and `"motor"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    /// Entity identifier (the vehicle name)
    pub entity: String,

    /// Channel name within the entity
    pub channel: String,
}

impl ChannelKey {
    /// Creates a key from any pair of string-likes.
    pub fn new(entity: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            channel: channel.into(),
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity, self.channel)
    }
}
