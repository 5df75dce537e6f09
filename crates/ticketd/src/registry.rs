//! Ticket registry: open ticket records and their claims.
//!
//! Both maps live behind one mutex. Every operation is a single short
//! critical section, so a record and its claim are always added and
//! removed together. When an index is attached, the registry persists a
//! snapshot after each mutation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use ticket_common::{ChannelId, Closure, TicketError, TicketRecord, TicketResult, TicketView, UserId};

use crate::index::{IndexEntry, TicketIndex};

#[derive(Default)]
struct Maps {
    records: HashMap<ChannelId, TicketRecord>,
    claims: HashMap<ChannelId, UserId>,
}

impl Maps {
    fn snapshot(&self) -> BTreeMap<ChannelId, IndexEntry> {
        self.records
            .iter()
            .map(|(id, record)| (id.clone(), IndexEntry::from_record(record, self.claims.get(id))))
            .collect()
    }
}

/// Owner of all open tickets. Constructed once per process and shared.
pub struct TicketRegistry {
    maps: Mutex<Maps>,
    index: Option<TicketIndex>,
}

impl Default for TicketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketRegistry {
    /// A registry that is not persisted
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(Maps::default()),
            index: None,
        }
    }

    pub fn with_index(index: TicketIndex) -> Self {
        Self {
            maps: Mutex::new(Maps::default()),
            index: Some(index),
        }
    }

    fn maps(&self) -> MutexGuard<'_, Maps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocking write, done under the lock so saves land in mutation order.
    /// The index is one small JSON file; callers never hold the lock across
    /// an await.
    fn persist(&self, maps: &Maps) {
        if let Some(index) = &self.index {
            if let Err(e) = index.save(maps.snapshot()) {
                warn!("Failed to persist ticket index: {}", e);
            }
        }
    }

    pub fn register(&self, record: TicketRecord) -> TicketResult<()> {
        let mut maps = self.maps();
        if maps.records.contains_key(&record.channel_id) {
            return Err(TicketError::DuplicateTicket(record.channel_id));
        }
        info!(
            "Registered ticket {} ({}) for {}",
            record.channel_id, record.category, record.created_by
        );
        maps.records.insert(record.channel_id.clone(), record);
        self.persist(&maps);
        Ok(())
    }

    pub fn lookup(&self, channel_id: &str) -> Option<TicketRecord> {
        self.maps().records.get(channel_id).cloned()
    }

    pub fn claimant(&self, channel_id: &str) -> Option<UserId> {
        self.maps().claims.get(channel_id).cloned()
    }

    pub fn claim(&self, channel_id: &str, actor_id: &str) -> TicketResult<()> {
        let mut maps = self.maps();
        if !maps.records.contains_key(channel_id) {
            return Err(TicketError::NotATicket);
        }
        match maps.claims.get(channel_id) {
            Some(current) if current == actor_id => return Err(TicketError::AlreadyClaimedBySelf),
            Some(current) => {
                return Err(TicketError::AlreadyClaimedByOther {
                    claimant: current.clone(),
                })
            }
            None => {}
        }
        maps.claims.insert(channel_id.to_string(), actor_id.to_string());
        info!("Ticket {} claimed by {}", channel_id, actor_id);
        self.persist(&maps);
        Ok(())
    }

    pub fn unclaim(&self, channel_id: &str, actor_id: &str) -> TicketResult<()> {
        let mut maps = self.maps();
        if !maps.records.contains_key(channel_id) {
            return Err(TicketError::NotATicket);
        }
        if maps.claims.get(channel_id).map(String::as_str) != Some(actor_id) {
            return Err(TicketError::NotClaimedBySelf);
        }
        maps.claims.remove(channel_id);
        info!("Ticket {} unclaimed by {}", channel_id, actor_id);
        self.persist(&maps);
        Ok(())
    }

    /// Stamp `closure` onto the record and evict it together with its claim.
    /// Returns the stamped record for archival.
    pub fn close(&self, channel_id: &str, closure: Closure) -> TicketResult<TicketRecord> {
        let mut maps = self.maps();
        let mut record = maps
            .records
            .remove(channel_id)
            .ok_or(TicketError::NotATicket)?;
        maps.claims.remove(channel_id);
        record.stamp(closure);
        info!(
            "Closed ticket {} by {}",
            channel_id,
            record.closed_by.as_deref().unwrap_or("unknown")
        );
        self.persist(&maps);
        Ok(record)
    }

    /// Insert a reconstructed record, replacing any existing one
    pub fn restore(&self, record: TicketRecord, claimed_by: Option<UserId>) {
        let mut maps = self.maps();
        let id = record.channel_id.clone();
        maps.records.insert(id.clone(), record);
        match claimed_by {
            Some(claimant) => {
                maps.claims.insert(id, claimant);
            }
            None => {
                maps.claims.remove(&id);
            }
        }
    }

    /// Persist the current state; used once after startup reconstruction
    pub fn flush(&self) {
        let maps = self.maps();
        self.persist(&maps);
    }

    /// Open tickets with their claimants, oldest first
    pub fn list(&self) -> Vec<TicketView> {
        let maps = self.maps();
        let mut views: Vec<TicketView> = maps
            .records
            .values()
            .map(|record| TicketView {
                record: record.clone(),
                claimed_by: maps.claims.get(&record.channel_id).cloned(),
            })
            .collect();
        views.sort_by(|a, b| {
            a.record
                .created_at
                .cmp(&b.record.created_at)
                .then_with(|| a.record.channel_id.cmp(&b.record.channel_id))
        });
        views
    }

    /// Number of open tickets created by `user_id`
    pub fn count_open_by(&self, user_id: &str) -> usize {
        self.maps()
            .records
            .values()
            .filter(|r| r.created_by == user_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.maps().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn claim_count(&self) -> usize {
        self.maps().claims.len()
    }
}
