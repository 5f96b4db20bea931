//! In-memory platform used by the engine tests.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use super::{
    MediaKind, MediaRef, MessageMedia, PlatformChannel, PlatformClient, PlatformError,
    PlatformMessage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub destination: i64,
    pub media: Vec<MediaRef>,
    pub caption: String,
}

#[derive(Default)]
struct State {
    channels: Vec<PlatformChannel>,
    /// Per channel id, stored oldest first.
    messages: HashMap<i64, Vec<PlatformMessage>>,
    media: HashMap<MediaRef, Vec<u8>>,
    invites: HashMap<String, i64>,
    broken_media: Vec<MediaRef>,
    failing_channels: Vec<i64>,
    fail_publish: bool,
    joined: Vec<i64>,
    published: Vec<Published>,
    fetches: Vec<(i64, i64, usize)>,
}

#[derive(Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, id: i64, username: &str) -> PlatformChannel {
        let channel = PlatformChannel {
            id,
            username: username.to_string(),
            title: format!("{username} title"),
            is_member: false,
        };
        let mut state = self.state.lock();
        state.channels.retain(|c| c.id != id);
        state.channels.push(channel.clone());
        channel
    }

    pub fn rename_channel(&self, id: i64, username: &str) {
        let mut state = self.state.lock();
        if let Some(channel) = state.channels.iter_mut().find(|c| c.id == id) {
            channel.username = username.to_string();
        }
    }

    pub fn add_invite(&self, hash: &str, channel_id: i64) {
        self.state.lock().invites.insert(hash.to_string(), channel_id);
    }

    /// Appends a media post; the media bytes default to the reference text.
    pub fn post(
        &self,
        channel_id: i64,
        sequence_id: i64,
        group_id: Option<i64>,
        kind: MediaKind,
        text: Option<&str>,
    ) -> MediaRef {
        let reference = MediaRef::new(format!("{channel_id}-{sequence_id}"));
        let bytes = reference.as_str().as_bytes().to_vec();
        self.post_with_bytes(channel_id, sequence_id, group_id, kind, text, bytes);
        reference
    }

    pub fn post_with_bytes(
        &self,
        channel_id: i64,
        sequence_id: i64,
        group_id: Option<i64>,
        kind: MediaKind,
        text: Option<&str>,
        bytes: Vec<u8>,
    ) {
        let reference = MediaRef::new(format!("{channel_id}-{sequence_id}"));
        let mut state = self.state.lock();
        state.media.insert(reference.clone(), bytes);
        state
            .messages
            .entry(channel_id)
            .or_default()
            .push(PlatformMessage {
                sequence_id,
                group_id,
                text: text.map(ToOwned::to_owned),
                media: Some(MessageMedia { kind, reference }),
                links: Vec::new(),
            });
    }

    pub fn post_message(&self, channel_id: i64, message: PlatformMessage) {
        if let Some(media) = &message.media {
            let bytes = media.reference.as_str().as_bytes().to_vec();
            self.state.lock().media.insert(media.reference.clone(), bytes);
        }
        self.state
            .lock()
            .messages
            .entry(channel_id)
            .or_default()
            .push(message);
    }

    pub fn break_media(&self, reference: &MediaRef) {
        self.state.lock().broken_media.push(reference.clone());
    }

    pub fn fail_fetches_for(&self, channel_id: i64) {
        self.state.lock().failing_channels.push(channel_id);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.lock().published.clone()
    }

    pub fn joined(&self) -> Vec<i64> {
        self.state.lock().joined.clone()
    }

    /// `(channel_id, cursor, limit)` of every message listing.
    pub fn fetches(&self) -> Vec<(i64, i64, usize)> {
        self.state.lock().fetches.clone()
    }
}

#[async_trait]
impl PlatformClient for MemoryPlatform {
    async fn resolve_channel(&self, identifier: &str) -> Result<PlatformChannel, PlatformError> {
        let state = self.state.lock();
        state
            .channels
            .iter()
            .find(|c| c.username == identifier)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(identifier.to_string()))
    }

    async fn accept_invite(&self, invite_hash: &str) -> Result<PlatformChannel, PlatformError> {
        let mut state = self.state.lock();
        let channel_id = *state
            .invites
            .get(invite_hash)
            .ok_or_else(|| PlatformError::InviteInvalid(invite_hash.to_string()))?;
        let channel = state
            .channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| PlatformError::NotFound(channel_id.to_string()))?;
        channel.is_member = true;
        Ok(channel.clone())
    }

    async fn join_channel(&self, channel: &PlatformChannel) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.joined.contains(&channel.id) {
            return Err(PlatformError::AlreadyMember);
        }
        state.joined.push(channel.id);
        if let Some(live) = state.channels.iter_mut().find(|c| c.id == channel.id) {
            live.is_member = true;
        }
        Ok(())
    }

    async fn list_messages_since(
        &self,
        channel: &PlatformChannel,
        cursor: i64,
        limit: usize,
    ) -> Result<BoxStream<'static, Result<PlatformMessage, PlatformError>>, PlatformError> {
        let mut state = self.state.lock();
        state.fetches.push((channel.id, cursor, limit));
        if state.failing_channels.contains(&channel.id) {
            return Err(PlatformError::Transport("connection reset".to_string()));
        }
        let messages: Vec<PlatformMessage> = state
            .messages
            .get(&channel.id)
            .map(|all| {
                all.iter()
                    .rev()
                    .filter(|m| m.sequence_id > cursor)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(stream::iter(messages.into_iter().map(Ok)).boxed())
    }

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, PlatformError> {
        let state = self.state.lock();
        if state.broken_media.contains(media) {
            return Err(PlatformError::UnsupportedMedia(media.as_str().to_string()));
        }
        state
            .media
            .get(media)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(media.as_str().to_string()))
    }

    async fn publish(
        &self,
        destination: &PlatformChannel,
        media: &[MediaRef],
        caption: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.fail_publish {
            return Err(PlatformError::BadRequest("MEDIA_INVALID".to_string()));
        }
        state.published.push(Published {
            destination: destination.id,
            media: media.to_vec(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}
