use std::collections::HashSet;

use async_trait::async_trait;

use super::DatabaseError;
use super::models::{ActiveChannels, ChannelRecord, MessageRecord, StoredState};
use crate::fingerprint::ContentHash;

#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Opens the transaction that scopes one sync cycle.
    async fn begin(&self) -> Result<Box<dyn CycleTransaction>, DatabaseError>;
}

/// All reads and writes of one cycle. Nothing becomes durable until
/// [`CycleTransaction::commit`]; dropping the value rolls back.
#[async_trait]
pub trait CycleTransaction: Send {
    async fn load_state(&mut self, active: &ActiveChannels) -> Result<StoredState, DatabaseError>;
    async fn posted_hashes(
        &mut self,
        hashes: &[ContentHash],
    ) -> Result<HashSet<ContentHash>, DatabaseError>;
    async fn save_channels(&mut self, channels: &[ChannelRecord]) -> Result<(), DatabaseError>;
    async fn rename_channels(&mut self, channels: &[ChannelRecord]) -> Result<(), DatabaseError>;
    async fn save_messages(&mut self, messages: &[MessageRecord]) -> Result<usize, DatabaseError>;
    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;
    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
