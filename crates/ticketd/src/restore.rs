//! Startup reconstruction of open tickets.
//!
//! The durable index is authoritative and carries claims. Ticket channels
//! found under the storage container but missing from the index are
//! recovered from their topic string; those lose their creation time and
//! any claim they had.

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{info, warn};

use ticket_common::{ConfigStore, TicketRecord};

use crate::index::TicketIndex;
use crate::registry::TicketRegistry;
use crate::transport::{ChannelInfo, Transport};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    /// Tickets restored from the index
    pub from_index: usize,
    /// Claims restored from the index
    pub claims: usize,
    /// Tickets recovered from channel topics
    pub from_topics: usize,
    /// Index entries whose channel no longer exists
    pub dropped: usize,
}

/// Fields recovered from a ticket channel topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub creator_tag: String,
    pub creator_id: String,
    pub category: String,
}

fn topic_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"created by (.+?) \(([^()\s]+)\) - Category: (.+?)\s*$").ok())
        .as_ref()
}

pub fn parse_topic(topic: &str) -> Option<TopicMetadata> {
    let caps = topic_pattern()?.captures(topic)?;
    Some(TopicMetadata {
        creator_tag: caps[1].to_string(),
        creator_id: caps[2].to_string(),
        category: caps[3].to_string(),
    })
}

fn record_from_channel(channel: &ChannelInfo) -> Option<TicketRecord> {
    let meta = parse_topic(channel.topic.as_deref()?)?;
    Some(TicketRecord {
        channel_id: channel.id.clone(),
        channel_name: channel.name.clone(),
        category: meta.category,
        created_by: meta.creator_id,
        created_by_tag: meta.creator_tag,
        // not recoverable from the topic
        created_at: Utc::now(),
        closed_by: None,
        closed_by_tag: None,
        closed_at: None,
        close_reason: None,
    })
}

pub async fn restore_state(
    registry: &TicketRegistry,
    index: Option<&TicketIndex>,
    config: &ConfigStore,
    transport: &dyn Transport,
) -> RestoreSummary {
    let mut summary = RestoreSummary::default();
    let mut known: HashSet<String> = HashSet::new();

    if let Some(index) = index {
        let entries = match index.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[RESTORE] Ticket index unreadable, ignoring it: {}", e);
                Default::default()
            }
        };
        for (channel_id, entry) in entries {
            match transport.channel_exists(&channel_id).await {
                Ok(false) => {
                    info!("[RESTORE] Dropping {}: channel no longer exists", channel_id);
                    summary.dropped += 1;
                    continue;
                }
                Ok(true) => {}
                Err(e) => warn!("[RESTORE] Could not verify {}, keeping it: {}", channel_id, e),
            }
            let (record, claimed_by) = entry.into_record(channel_id.clone());
            if claimed_by.is_some() {
                summary.claims += 1;
            }
            registry.restore(record, claimed_by);
            known.insert(channel_id);
            summary.from_index += 1;
        }
    }

    let snapshot = config.snapshot();
    match snapshot.channels.ticket_category.as_deref() {
        Some(container) => match transport.list_channels(container).await {
            Ok(channels) => {
                let prefix = &snapshot.settings.ticket_prefix;
                let candidates = channels
                    .iter()
                    .filter(|c| c.name.starts_with(prefix.as_str()) && !known.contains(&c.id));
                for channel in candidates {
                    if let Some(record) = record_from_channel(channel) {
                        info!("[RESTORE] Recovered {} ({}) from its topic", channel.name, record.category);
                        registry.restore(record, None);
                        summary.from_topics += 1;
                    }
                }
            }
            Err(e) => warn!("[RESTORE] Could not list ticket channels: {}", e),
        },
        None => info!("[RESTORE] No ticket category configured"),
    }

    if summary.from_topics > 0 {
        warn!(
            "[RESTORE] {} tickets recovered from topics; their claims could not be recovered",
            summary.from_topics
        );
    }
    registry.flush();
    info!(
        "[RESTORE] {} open tickets ({} claimed)",
        registry.len(),
        registry.claim_count()
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_transport::MemoryTransport;
    use tempfile::tempdir;
    use ticket_common::{Actor, TicketConfig};

    #[test]
    fn test_parse_topic() {
        let meta = parse_topic("Ticket created by una#0001 (12345) - Category: General Support").unwrap();
        assert_eq!(meta.creator_tag, "una#0001");
        assert_eq!(meta.creator_id, "12345");
        assert_eq!(meta.category, "General Support");
        assert!(parse_topic("just a channel").is_none());
    }

    #[test]
    fn test_parse_topic_tag_with_parentheses() {
        let meta = parse_topic("Ticket created by una (the admin) (777) - Category: Billing").unwrap();
        assert_eq!(meta.creator_id, "777");
        assert_eq!(meta.category, "Billing");
    }

    #[tokio::test]
    async fn test_restore_prefers_index_and_keeps_claims() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new();
        let container = transport.add_container();
        let indexed = transport.add_existing_channel(
            &container,
            "ticket-una",
            Some("Ticket created by una (10) - Category: Billing"),
        );
        let legacy = transport.add_existing_channel(
            &container,
            "ticket-bob",
            Some("Ticket created by bob (11) - Category: General Support"),
        );
        transport.add_existing_channel(&container, "random", Some("Ticket created by x (1) - Category: Y"));

        let index = TicketIndex::in_dir(dir.path());
        {
            let writer = TicketRegistry::with_index(index.clone());
            writer
                .register(TicketRecord::open(&indexed, "ticket-una", "Billing", &Actor::new("10", "una")))
                .unwrap();
            writer.claim(&indexed, "20").unwrap();
            writer
                .register(TicketRecord::open("vanished", "ticket-old", "Billing", &Actor::new("12", "old")))
                .unwrap();
        }

        let mut config = TicketConfig::default();
        config.channels.ticket_category = Some(container);
        let store = ConfigStore::in_memory(config);

        let registry = TicketRegistry::with_index(index.clone());
        let summary = restore_state(&registry, Some(&index), &store, &transport).await;

        assert_eq!(summary.from_index, 1);
        assert_eq!(summary.claims, 1);
        assert_eq!(summary.from_topics, 1);
        assert_eq!(summary.dropped, 1);
        assert_eq!(registry.claimant(&indexed).as_deref(), Some("20"));
        assert_eq!(registry.lookup(&legacy).unwrap().created_by, "11");
        assert!(registry.claimant(&legacy).is_none());
        assert_eq!(registry.len(), 2);

        // reconstructed state is persisted for the next start
        assert_eq!(index.load().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_without_container() {
        let transport = MemoryTransport::new();
        let store = ConfigStore::in_memory(TicketConfig::default());
        let registry = TicketRegistry::new();
        let summary = restore_state(&registry, None, &store, &transport).await;
        assert_eq!(summary, RestoreSummary::default());
    }
}
