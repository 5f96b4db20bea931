use std::sync::Arc;

use futures::StreamExt;
use tracing::{Instrument, Span, debug, warn};

use crate::config::{FingerprintSource, SyncConfig};
use crate::db::MessageRecord;
use crate::fingerprint::{ContentHash, fingerprint, fingerprint_reference};
use crate::platform::{MediaRef, PlatformChannel, PlatformClient, PlatformError, PlatformMessage};

/// A media item that was fetched and hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub record: MessageRecord,
    pub text: Option<String>,
    pub has_link: bool,
    pub media: MediaRef,
}

/// Items of one channel sharing a group id, or a single ungrouped item.
/// Items are kept in the order the platform returned them (newest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageGroup {
    pub channel_id: i64,
    pub items: Vec<FetchedMessage>,
}

impl MessageGroup {
    pub fn hashes(&self) -> impl Iterator<Item = ContentHash> + '_ {
        self.items.iter().map(|item| item.record.content_hash)
    }

    pub fn records(&self) -> impl Iterator<Item = &MessageRecord> {
        self.items.iter().map(|item| &item.record)
    }

    /// Items in posting order, oldest first.
    pub fn oldest_first(&self) -> impl Iterator<Item = &FetchedMessage> {
        self.items.iter().rev()
    }
}

/// Starts a new group whenever an item has no group id or its group id
/// differs from the previous item's.
pub fn group_messages(items: Vec<FetchedMessage>) -> Vec<MessageGroup> {
    let mut groups: Vec<MessageGroup> = Vec::new();
    let mut last_group_id: Option<i64> = None;

    for item in items {
        let group_id = item.record.group_id;
        match groups.last_mut() {
            Some(current) if group_id.is_some() && group_id == last_group_id => {
                current.items.push(item);
            }
            _ => groups.push(MessageGroup {
                channel_id: item.record.channel_id,
                items: vec![item],
            }),
        }
        last_group_id = group_id;
    }

    groups
}

pub struct Fetcher {
    platform: Arc<dyn PlatformClient>,
    config: SyncConfig,
    span: Span,
}

impl Fetcher {
    pub fn new(platform: Arc<dyn PlatformClient>, config: &SyncConfig, span: Span) -> Self {
        Self {
            platform,
            config: config.clone(),
            span,
        }
    }

    /// Media groups posted to `channel` after `cursor`. Items whose media
    /// cannot be hashed are skipped; only the listing itself can fail.
    pub async fn fetch(
        &self,
        channel: &PlatformChannel,
        cursor: i64,
    ) -> Result<Vec<MessageGroup>, PlatformError> {
        let span = self.span.clone();
        async move {
            let limit = self.config.fetch_limit(cursor);
            let mut stream = self
                .platform
                .list_messages_since(channel, cursor, limit)
                .await?;

            let mut retained = Vec::new();
            let mut listed = 0usize;
            while let Some(next) = stream.next().await {
                listed += 1;
                let message = match next {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(channel_id = channel.id, "skipping unreadable message: {}", e);
                        continue;
                    }
                };
                if let Some(item) = self.hash_message(channel.id, message).await {
                    retained.push(item);
                }
            }

            let groups = group_messages(retained);
            debug!(
                channel_id = channel.id,
                cursor,
                limit,
                listed,
                groups = groups.len(),
                "fetched channel"
            );
            Ok(groups)
        }
        .instrument(span)
        .await
    }

    async fn hash_message(
        &self,
        channel_id: i64,
        message: PlatformMessage,
    ) -> Option<FetchedMessage> {
        let media = message.repostable_media()?.reference.clone();

        let content_hash = match self.config.fingerprint_source {
            FingerprintSource::Reference => fingerprint_reference(&media),
            FingerprintSource::Bytes => match self.platform.download_media(&media).await {
                Ok(bytes) => fingerprint(&bytes),
                Err(e) => {
                    warn!(
                        channel_id,
                        sequence_id = message.sequence_id,
                        "skipping media that could not be downloaded: {}",
                        e
                    );
                    return None;
                }
            },
        };

        Some(FetchedMessage {
            record: MessageRecord {
                sequence_id: message.sequence_id,
                group_id: message.group_id,
                channel_id,
                content_hash,
            },
            has_link: !message.links.is_empty(),
            text: message.text,
            media,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tracing::Span;

    use super::{FetchedMessage, Fetcher, group_messages};
    use crate::config::{FingerprintSource, SyncConfig};
    use crate::db::MessageRecord;
    use crate::fingerprint::{fingerprint, fingerprint_reference};
    use crate::platform::testing::MemoryPlatform;
    use crate::platform::{MediaKind, MediaRef, PlatformMessage};

    fn item(sequence_id: i64, group_id: Option<i64>) -> FetchedMessage {
        FetchedMessage {
            record: MessageRecord {
                sequence_id,
                group_id,
                channel_id: 1,
                content_hash: fingerprint(&sequence_id.to_be_bytes()),
            },
            text: None,
            has_link: false,
            media: MediaRef::new(sequence_id.to_string()),
        }
    }

    fn fetcher(platform: Arc<MemoryPlatform>, source: FingerprintSource) -> Fetcher {
        let config = SyncConfig {
            fingerprint_source: source,
            ..SyncConfig::default()
        };
        Fetcher::new(platform, &config, Span::none())
    }

    #[test]
    fn groups_by_consecutive_group_id() {
        let a = Some(100);
        let b = Some(200);
        let groups = group_messages(vec![
            item(1, a),
            item(2, a),
            item(3, None),
            item(4, b),
            item(5, b),
            item(6, b),
        ]);

        let shape: Vec<Vec<i64>> = groups
            .iter()
            .map(|g| g.records().map(|r| r.sequence_id).collect())
            .collect();
        assert_eq!(shape, vec![vec![1, 2], vec![3], vec![4, 5, 6]]);
    }

    #[test]
    fn ungrouped_neighbours_are_separate_groups() {
        let groups = group_messages(vec![item(1, None), item(2, None)]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn interrupted_group_id_starts_a_new_group() {
        let groups = group_messages(vec![item(1, Some(5)), item(2, None), item(3, Some(5))]);
        assert_eq!(groups.len(), 3);
    }

    #[tokio::test]
    async fn drops_non_repostable_media_and_plain_text() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel(1, "chanA");
        platform.post(1, 1, None, MediaKind::Photo, None);
        platform.post(1, 2, None, MediaKind::Document, Some("pdf"));
        platform.post_message(1, PlatformMessage {
            sequence_id: 3,
            group_id: None,
            text: Some("just words".into()),
            media: None,
            links: Vec::new(),
        });
        platform.post(1, 4, None, MediaKind::Video, None);

        let groups = fetcher(platform, FingerprintSource::Bytes)
            .fetch(&channel, 0)
            .await
            .expect("fetch");

        let ids: Vec<i64> = groups
            .iter()
            .flat_map(|g| g.records().map(|r| r.sequence_id))
            .collect();
        assert_eq!(ids, vec![4, 1]);
    }

    #[tokio::test]
    async fn refetch_with_same_cursor_is_idempotent() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel(1, "chanA");
        platform.post(1, 1, Some(9), MediaKind::Photo, Some("album"));
        platform.post(1, 2, Some(9), MediaKind::Photo, None);
        platform.post(1, 3, None, MediaKind::Animation, None);
        let fetcher = fetcher(platform, FingerprintSource::Bytes);

        let first = fetcher.fetch(&channel, 0).await.expect("first fetch");
        let second = fetcher.fetch(&channel, 0).await.expect("second fetch");

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn broken_media_is_skipped_not_fatal() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel(1, "chanA");
        let broken = platform.post(1, 1, None, MediaKind::Photo, None);
        platform.post(1, 2, None, MediaKind::Photo, None);
        platform.break_media(&broken);

        let groups = fetcher(platform, FingerprintSource::Bytes)
            .fetch(&channel, 0)
            .await
            .expect("fetch");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].items[0].record.sequence_id, 2);
    }

    #[tokio::test]
    async fn reference_fingerprints_skip_downloads() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel(1, "chanA");
        let reference = platform.post(1, 1, None, MediaKind::Photo, None);
        platform.break_media(&reference);

        let groups = fetcher(platform, FingerprintSource::Reference)
            .fetch(&channel, 0)
            .await
            .expect("fetch");

        assert_eq!(
            groups[0].items[0].record.content_hash,
            fingerprint_reference(&reference)
        );
    }

    #[tokio::test]
    async fn limit_depends_on_cursor() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel(1, "chanA");
        let fetcher = fetcher(platform.clone(), FingerprintSource::Bytes);

        fetcher.fetch(&channel, 0).await.expect("first run");
        fetcher.fetch(&channel, 12).await.expect("backfill");

        assert_eq!(platform.fetches(), vec![(1, 0, 10), (1, 12, 3000)]);
    }

    #[tokio::test]
    async fn listing_failure_is_returned() {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel(1, "chanA");
        platform.fail_fetches_for(1);

        let result = fetcher(platform, FingerprintSource::Bytes)
            .fetch(&channel, 0)
            .await;

        assert!(result.is_err());
    }
}
