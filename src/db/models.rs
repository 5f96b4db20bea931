use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::fingerprint::ContentHash;

/// A source channel as remembered between cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: i64,
    pub username: String,
    /// Highest ingested sequence id, derived from stored messages; 0 when none.
    pub cursor: i64,
}

impl ChannelRecord {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            cursor: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub sequence_id: i64,
    pub group_id: Option<i64>,
    pub channel_id: i64,
    pub content_hash: ContentHash,
}

/// Channels taking part in the current cycle: the handles from the source
/// list plus the ids the platform resolved them to.
#[derive(Debug, Clone, Default)]
pub struct ActiveChannels {
    pub usernames: HashSet<String>,
    pub ids: HashSet<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct StoredState {
    pub channels: Vec<ChannelRecord>,
    pub max_seen: HashMap<i64, i64>,
}
