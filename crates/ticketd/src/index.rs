//! Durable ticket index.
//!
//! A small JSON file in the state directory holding one entry per open
//! ticket, including its claimant. Rewritten after every registry
//! mutation so a restart can restore both Open and Claimed tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use ticket_common::{ChannelId, TicketRecord, UserId};

/// File name of the index inside the state directory
pub const INDEX_FILE: &str = "tickets.json";

const INDEX_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed ticket index: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported ticket index version {0}")]
    Version(u32),
}

/// What is persisted per ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub channel_name: String,
    pub category: String,
    pub created_by: UserId,
    pub created_by_tag: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<UserId>,
}

impl IndexEntry {
    pub fn from_record(record: &TicketRecord, claimed_by: Option<&UserId>) -> Self {
        Self {
            channel_name: record.channel_name.clone(),
            category: record.category.clone(),
            created_by: record.created_by.clone(),
            created_by_tag: record.created_by_tag.clone(),
            created_at: record.created_at,
            claimed_by: claimed_by.cloned(),
        }
    }

    pub fn into_record(self, channel_id: ChannelId) -> (TicketRecord, Option<UserId>) {
        let record = TicketRecord {
            channel_id,
            channel_name: self.channel_name,
            category: self.category,
            created_by: self.created_by,
            created_by_tag: self.created_by_tag,
            created_at: self.created_at,
            closed_by: None,
            closed_by_tag: None,
            closed_at: None,
            close_reason: None,
        };
        (record, self.claimed_by)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexFile {
    version: u32,
    written_at: DateTime<Utc>,
    tickets: BTreeMap<ChannelId, IndexEntry>,
}

#[derive(Debug, Clone)]
pub struct TicketIndex {
    path: PathBuf,
}

impl TicketIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Index file inside `state_dir`
    pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
        Self::new(state_dir.as_ref().join(INDEX_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all entries. A missing file is an empty index.
    pub fn load(&self) -> Result<BTreeMap<ChannelId, IndexEntry>, IndexError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let body = fs::read_to_string(&self.path).map_err(|source| IndexError::Io {
            path: self.path.clone(),
            source,
        })?;
        let file: IndexFile = serde_json::from_str(&body)?;
        if file.version != INDEX_VERSION {
            return Err(IndexError::Version(file.version));
        }
        Ok(file.tickets)
    }

    /// Replace the index with `tickets`
    pub fn save(&self, tickets: BTreeMap<ChannelId, IndexEntry>) -> Result<(), IndexError> {
        let io = |source| IndexError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io)?;
            }
        }

        let file = IndexFile {
            version: INDEX_VERSION,
            written_at: Utc::now(),
            tickets,
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io)?;
        fs::rename(&tmp, &self.path).map_err(io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use ticket_common::Actor;

    #[test]
    fn test_missing_index_is_empty() {
        let dir = tempdir().unwrap();
        let index = TicketIndex::in_dir(dir.path());
        assert!(index.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_keeps_claimant() {
        let dir = tempdir().unwrap();
        let index = TicketIndex::in_dir(dir.path().join("state"));
        let user = Actor::new("10", "una");
        let record = TicketRecord::open("c1", "ticket-una", "Billing", &user);

        let mut tickets = BTreeMap::new();
        tickets.insert(
            "c1".to_string(),
            IndexEntry::from_record(&record, Some(&"20".to_string())),
        );
        index.save(tickets).unwrap();

        let loaded = index.load().unwrap();
        let (restored, claimant) = loaded["c1"].clone().into_record("c1".into());
        assert_eq!(restored, record);
        assert_eq!(claimant.as_deref(), Some("20"));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let index = TicketIndex::in_dir(dir.path());
        fs::write(
            index.path(),
            r#"{"version":9,"writtenAt":"2024-01-01T00:00:00Z","tickets":{}}"#,
        )
        .unwrap();
        assert!(matches!(index.load(), Err(IndexError::Version(9))));
    }
}
