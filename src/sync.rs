use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tokio::sync::OnceCell;
use tracing::{Span, debug, error, info, info_span, warn};

use crate::config::Config;
use crate::db::{ActiveChannels, ChannelRecord, MessageRecord, SyncStore};
use crate::platform::{PlatformChannel, PlatformClient, PlatformError};
use crate::sources::{SourceEntry, SourceRegistry};
use crate::web::metrics::SyncMetrics;

pub mod compose;
pub mod fetch;
pub mod reconcile;
pub mod supervisor;

use self::compose::{CaptionFilter, Composer};
use self::fetch::{Fetcher, MessageGroup};
use self::reconcile::{ResolvedChannel, reconcile};

/// What one committed cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub channels_live: usize,
    pub channels_new: usize,
    pub channels_renamed: usize,
    pub channels_unresolved: usize,
    pub groups_fetched: usize,
    pub published: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub messages_recorded: usize,
}

pub struct SyncEngine {
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn SyncStore>,
    sources: SourceRegistry,
    fetcher: Fetcher,
    composer: Composer,
    metrics: Arc<SyncMetrics>,
    destination_name: String,
    destination: OnceCell<PlatformChannel>,
    concurrency: usize,
    span: Span,
}

impl SyncEngine {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn SyncStore>,
        config: &Config,
        metrics: Arc<SyncMetrics>,
        span: Span,
    ) -> Self {
        let sync = &config.sync;
        Self {
            sources: SourceRegistry::new(
                config.sources.channel_file.clone(),
                info_span!(parent: &span, "sources"),
            ),
            fetcher: Fetcher::new(platform.clone(), sync, info_span!(parent: &span, "fetch")),
            composer: Composer::new(
                CaptionFilter::new(sync.max_caption_chars),
                info_span!(parent: &span, "compose"),
            ),
            platform,
            store,
            metrics,
            destination_name: config.platform.destination.clone(),
            destination: OnceCell::new(),
            concurrency: sync.concurrency.max(1),
            span,
        }
    }

    /// Runs one cycle end to end. Nothing is persisted unless every publish
    /// succeeded and the transaction committed.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        match self.cycle().await {
            Ok(report) => {
                self.metrics.record_success(&report);
                Ok(report)
            }
            Err(err) => {
                self.metrics.record_failure();
                Err(err)
            }
        }
    }

    async fn cycle(&self) -> Result<CycleReport> {
        let destination = self.destination().await?;
        let mut report = CycleReport::default();

        let entries = self.sources.list().await;
        let live = self.enumerate(&entries).await;
        report.channels_live = live.len();
        self.subscribe(&live).await;

        let mut txn = self
            .store
            .begin()
            .await
            .context("failed to open sync transaction")?;

        let active = active_channels(&entries, &live);
        let state = txn
            .load_state(&active)
            .await
            .context("failed to load stored channels")?;
        let reconciliation = reconcile(state.channels, &live);
        for record in &reconciliation.unresolved {
            warn!(
                parent: &self.span,
                channel_id = record.id,
                "stored channel @{} did not resolve this cycle, skipping it",
                record.username
            );
        }
        for renamed in reconciliation.renamed() {
            info!(
                parent: &self.span,
                channel_id = renamed.record.id,
                "channel @{} is now @{}",
                renamed.record.username,
                renamed.live.username
            );
        }
        report.channels_new = reconciliation.new.len();
        report.channels_renamed = reconciliation.renamed().count();
        report.channels_unresolved = reconciliation.unresolved.len();

        let fetchable: Vec<&ResolvedChannel> = reconciliation.fetchable().collect();
        let groups = self.fetch_all(&fetchable).await;
        report.groups_fetched = groups.len();

        let hashes: Vec<_> = groups.iter().flat_map(MessageGroup::hashes).collect();
        let already_posted = txn
            .posted_hashes(&hashes)
            .await
            .context("failed to look up posted content")?;

        let selection = self.composer.select(&groups, already_posted);
        report.duplicates = selection.duplicates;
        report.rejected = selection.rejected.len();

        for post in &selection.posts {
            self.platform
                .publish(destination, &post.media, &post.caption)
                .await
                .with_context(|| {
                    format!(
                        "failed to publish {} item(s) from {} to {}",
                        post.media.len(),
                        post.describe(),
                        destination.label()
                    )
                })?;
            report.published += 1;
        }

        let new_channels: Vec<ChannelRecord> = reconciliation
            .new
            .iter()
            .map(|c| c.record.clone())
            .collect();
        let renamed: Vec<ChannelRecord> = reconciliation
            .renamed()
            .map(ResolvedChannel::renamed_record)
            .collect();
        let records: Vec<MessageRecord> = groups
            .iter()
            .flat_map(|group| group.records().cloned())
            .collect();

        txn.save_channels(&new_channels)
            .await
            .context("failed to save new channels")?;
        txn.rename_channels(&renamed)
            .await
            .context("failed to update renamed channels")?;
        report.messages_recorded = txn
            .save_messages(&records)
            .await
            .context("failed to record fetched messages")?;
        txn.commit().await.context("failed to commit sync cycle")?;

        Ok(report)
    }

    async fn destination(&self) -> Result<&PlatformChannel> {
        self.destination
            .get_or_try_init(|| async {
                let channel = self.platform.resolve_channel(&self.destination_name).await?;
                info!(parent: &self.span, "reposting to {}", channel.label());
                Ok::<_, PlatformError>(channel)
            })
            .await
            .with_context(|| format!("failed to resolve destination {}", self.destination_name))
    }

    /// Resolves every source entry to a live channel. Entries that fail are
    /// logged and left out; the same channel listed twice is kept once.
    async fn enumerate(&self, entries: &[SourceEntry]) -> Vec<PlatformChannel> {
        let resolved: Vec<Option<PlatformChannel>> = stream::iter(entries)
            .map(|entry| self.resolve_entry(entry))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut seen = HashSet::new();
        resolved
            .into_iter()
            .flatten()
            .filter(|channel| seen.insert(channel.id))
            .collect()
    }

    async fn resolve_entry(&self, entry: &SourceEntry) -> Option<PlatformChannel> {
        let result = match entry {
            SourceEntry::Username(name) => self.platform.resolve_channel(name).await,
            SourceEntry::Invite(hash) => self.platform.accept_invite(hash).await,
        };
        match result {
            Ok(channel) => Some(channel),
            Err(PlatformError::InviteAlreadyPending) => {
                info!(parent: &self.span, "join request for {:?} is still pending", entry);
                None
            }
            Err(e) => {
                error!(parent: &self.span, "failed to resolve source {:?}: {}", entry, e);
                None
            }
        }
    }

    async fn subscribe(&self, live: &[PlatformChannel]) {
        stream::iter(live.iter().filter(|channel| !channel.is_member))
            .for_each_concurrent(self.concurrency, |channel| async move {
                match self.platform.join_channel(channel).await {
                    Ok(()) => info!(parent: &self.span, "joined {}", channel.label()),
                    Err(e) if e.is_benign_join() => {
                        debug!(parent: &self.span, "not joining {}: {}", channel.label(), e)
                    }
                    Err(e) => {
                        error!(parent: &self.span, "failed to join {}: {}", channel.label(), e)
                    }
                }
            })
            .await;
    }

    /// Fetches every channel with bounded concurrency and waits for all of
    /// them. A channel whose listing fails contributes nothing.
    async fn fetch_all(&self, channels: &[&ResolvedChannel]) -> Vec<MessageGroup> {
        let fetched: Vec<Vec<MessageGroup>> = stream::iter(channels.iter().copied())
            .map(|channel| async move {
                match self.fetcher.fetch(&channel.live, channel.record.cursor).await {
                    Ok(groups) => groups,
                    Err(e) => {
                        error!(
                            parent: &self.span,
                            channel_id = channel.live.id,
                            "failed to fetch {}: {}",
                            channel.live.label(),
                            e
                        );
                        Vec::new()
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        fetched.into_iter().flatten().collect()
    }
}

fn active_channels(entries: &[SourceEntry], live: &[PlatformChannel]) -> ActiveChannels {
    let mut active = ActiveChannels::default();
    for entry in entries {
        if let SourceEntry::Username(name) = entry {
            active.usernames.insert(name.clone());
        }
    }
    for channel in live {
        active.usernames.insert(channel.username.clone());
        active.ids.insert(channel.id);
    }
    active
}
