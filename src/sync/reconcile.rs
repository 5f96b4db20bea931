use std::collections::{HashMap, HashSet};

use crate::db::ChannelRecord;
use crate::platform::PlatformChannel;

/// A live channel paired with what the store knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub record: ChannelRecord,
    pub live: PlatformChannel,
    /// Stored username when the platform now reports a different one.
    pub renamed_from: Option<String>,
}

impl ResolvedChannel {
    /// The record to persist on rename: same id, the live username.
    pub fn renamed_record(&self) -> ChannelRecord {
        ChannelRecord {
            id: self.record.id,
            username: self.live.username.clone(),
            cursor: self.record.cursor,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Live channels the store has never seen; cursor starts at 0.
    pub new: Vec<ResolvedChannel>,
    pub known: Vec<ResolvedChannel>,
    /// Stored channels that no live channel matched this cycle.
    pub unresolved: Vec<ChannelRecord>,
}

impl Reconciliation {
    /// Every channel that should be polled this cycle, known ones first.
    pub fn fetchable(&self) -> impl Iterator<Item = &ResolvedChannel> {
        self.known.iter().chain(self.new.iter())
    }

    pub fn renamed(&self) -> impl Iterator<Item = &ResolvedChannel> {
        self.known.iter().filter(|c| c.renamed_from.is_some())
    }
}

/// Pairs stored records with live channels. Ids are authoritative: a stored
/// record only matches a live channel with the same id, whatever its username.
pub fn reconcile(stored: Vec<ChannelRecord>, live: &[PlatformChannel]) -> Reconciliation {
    let mut by_id: HashMap<i64, ChannelRecord> =
        stored.into_iter().map(|record| (record.id, record)).collect();
    let mut seen = HashSet::new();
    let mut result = Reconciliation::default();

    for channel in live {
        if !seen.insert(channel.id) {
            continue;
        }

        match by_id.remove(&channel.id) {
            Some(record) => {
                let renamed_from =
                    (record.username != channel.username).then(|| record.username.clone());
                result.known.push(ResolvedChannel {
                    record,
                    live: channel.clone(),
                    renamed_from,
                });
            }
            None => result.new.push(ResolvedChannel {
                record: ChannelRecord::new(channel.id, channel.username.clone()),
                live: channel.clone(),
                renamed_from: None,
            }),
        }
    }

    let mut unresolved: Vec<ChannelRecord> = by_id.into_values().collect();
    unresolved.sort_by_key(|record| record.id);
    result.unresolved = unresolved;
    result
}
