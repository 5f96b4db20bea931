use std::collections::HashSet;
use std::fmt;

use tracing::{Span, debug};

use super::fetch::MessageGroup;
use crate::fingerprint::ContentHash;
use crate::platform::MediaRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Link,
    TooLong,
    HashTag,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => f.write_str("contains a link"),
            Self::TooLong => f.write_str("caption too long"),
            Self::HashTag => f.write_str("contains a hashtag"),
        }
    }
}

/// Keeps out captions that look like promotion: links, hashtags and long text.
#[derive(Debug, Clone, Copy)]
pub struct CaptionFilter {
    max_chars: usize,
}

impl CaptionFilter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn check(&self, caption: &str, has_link: bool) -> Result<(), RejectReason> {
        if has_link {
            return Err(RejectReason::Link);
        }
        if caption.chars().count() > self.max_chars {
            return Err(RejectReason::TooLong);
        }
        if caption.contains('#') {
            return Err(RejectReason::HashTag);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPost {
    pub channel_id: i64,
    /// Oldest first, the order the album is published in.
    pub media: Vec<MediaRef>,
    pub caption: String,
    /// Same order as `media`.
    pub sequence_ids: Vec<i64>,
    pub hashes: Vec<ContentHash>,
}

impl OutgoingPost {
    /// Identifies the album in log lines: channel, source sequence ids and
    /// the fingerprint of its first item.
    pub fn describe(&self) -> String {
        let sequences = self
            .sequence_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        match self.hashes.first() {
            Some(hash) => format!(
                "channel {} sequence {} (hash {})",
                self.channel_id, sequences, hash
            ),
            None => format!("channel {} sequence {}", self.channel_id, sequences),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub posts: Vec<OutgoingPost>,
    pub duplicates: usize,
    pub rejected: Vec<RejectReason>,
}

pub struct Composer {
    filter: CaptionFilter,
    span: Span,
}

impl Composer {
    pub fn new(filter: CaptionFilter, span: Span) -> Self {
        Self { filter, span }
    }

    /// Decides which groups get published. `groups` is in fetch order; posts
    /// come out oldest first. Hashes of every evaluated group join the
    /// working set so the same content is never published twice in a cycle.
    pub fn select(
        &self,
        groups: &[MessageGroup],
        already_posted: HashSet<ContentHash>,
    ) -> Selection {
        let _entered = self.span.enter();
        let mut posted = already_posted;
        let mut selection = Selection::default();

        for group in groups.iter().rev() {
            if group.items.is_empty() {
                continue;
            }
            if group.hashes().all(|hash| posted.contains(&hash)) {
                selection.duplicates += 1;
                continue;
            }

            let mut caption = String::new();
            let mut has_link = false;
            let mut media = Vec::with_capacity(group.items.len());
            let mut sequence_ids = Vec::with_capacity(group.items.len());
            let mut hashes = Vec::with_capacity(group.items.len());
            for item in group.oldest_first() {
                if let Some(text) = item.text.as_deref().filter(|t| !t.is_empty()) {
                    caption = text.to_string();
                }
                has_link |= item.has_link;
                media.push(item.media.clone());
                sequence_ids.push(item.record.sequence_id);
                hashes.push(item.record.content_hash);
            }
            posted.extend(hashes.iter().copied());

            match self.filter.check(&caption, has_link) {
                Ok(()) => selection.posts.push(OutgoingPost {
                    channel_id: group.channel_id,
                    media,
                    caption,
                    sequence_ids,
                    hashes,
                }),
                Err(reason) => {
                    debug!(
                        channel_id = group.channel_id,
                        items = hashes.len(),
                        "not reposting group: {}",
                        reason
                    );
                    selection.rejected.push(reason);
                }
            }
        }

        selection
    }
}
