use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod http;
#[cfg(test)]
pub mod testing;

pub use self::error::PlatformError;
pub use self::http::HttpPlatformClient;

/// Live view of a channel as the platform reports it right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformChannel {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_member: bool,
}

impl PlatformChannel {
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            format!("@{}", self.username)
        } else {
            format!("{} (@{})", self.title, self.username)
        }
    }
}

/// Opaque handle the platform accepts back when re-posting media.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(String);

impl MediaRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
    Document,
    Audio,
    Voice,
    Sticker,
    #[serde(other)]
    Other,
}

impl MediaKind {
    /// Only pictures, videos and animations are worth reposting.
    pub fn is_repostable(&self) -> bool {
        matches!(self, Self::Photo | Self::Video | Self::Animation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMedia {
    pub kind: MediaKind,
    pub reference: MediaRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMessage {
    pub sequence_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<MessageMedia>,
    /// Targets of hyperlink entities embedded in the text.
    #[serde(default)]
    pub links: Vec<String>,
}

impl PlatformMessage {
    pub fn repostable_media(&self) -> Option<&MessageMedia> {
        self.media.as_ref().filter(|media| media.kind.is_repostable())
    }
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn resolve_channel(&self, identifier: &str) -> Result<PlatformChannel, PlatformError>;

    async fn accept_invite(&self, invite_hash: &str) -> Result<PlatformChannel, PlatformError>;

    async fn join_channel(&self, channel: &PlatformChannel) -> Result<(), PlatformError>;

    /// Messages with `sequence_id > cursor`, newest first, at most `limit`.
    async fn list_messages_since(
        &self,
        channel: &PlatformChannel,
        cursor: i64,
        limit: usize,
    ) -> Result<BoxStream<'static, Result<PlatformMessage, PlatformError>>, PlatformError>;

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, PlatformError>;

    async fn publish(
        &self,
        destination: &PlatformChannel,
        media: &[MediaRef],
        caption: &str,
    ) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::{MediaKind, PlatformMessage};

    #[test]
    fn message_deserializes_with_missing_optionals() {
        let message: PlatformMessage = serde_json::from_str(
            r#"{"sequence_id": 7, "media": {"kind": "photo", "reference": "p7"}}"#,
        )
        .expect("message json");

        assert_eq!(message.sequence_id, 7);
        assert_eq!(message.group_id, None);
        assert!(message.links.is_empty());
        assert!(message.repostable_media().is_some());
    }

    #[test]
    fn unknown_media_kind_is_not_repostable() {
        let message: PlatformMessage = serde_json::from_str(
            r#"{"sequence_id": 8, "media": {"kind": "poll", "reference": "x"}}"#,
        )
        .expect("message json");

        assert_eq!(message.media.as_ref().map(|m| &m.kind), Some(&MediaKind::Other));
        assert!(message.repostable_media().is_none());
    }
}
