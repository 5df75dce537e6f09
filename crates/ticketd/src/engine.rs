//! Ticket lifecycle engine.
//!
//! Orchestrates create, claim, unclaim and close against the registry and
//! the permission resolver. Every intent runs inside the critical section
//! of its key. The registry commits first; transport side effects follow
//! and their failures are collected into a `SideEffectReport` instead of
//! undoing the commit.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ticket_common::{
    Actor, Capability, ChannelId, Closure, ConfigStore, PermissionResolver, RoleId, TicketError,
    TicketRecord, TicketResult, TicketView, TransportError, UserId,
};

use crate::locks::{user_key, KeyedLocks};
use crate::messages;
use crate::overwrites;
use crate::panel::PanelSynchronizer;
use crate::registry::TicketRegistry;
use crate::transcript::TranscriptExporter;
use crate::transport::{ChannelSpec, Overwrite, Transport};

/// Messages fetched from a ticket channel for its transcript
pub const TRANSCRIPT_FETCH_LIMIT: usize = 100;

/// One side effect that failed after the registry committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffectFailure {
    pub action: String,
    pub error: String,
}

/// Side effects that failed after a committed transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SideEffectReport {
    pub failures: Vec<SideEffectFailure>,
}

impl SideEffectReport {
    pub fn record(&mut self, action: impl Into<String>, error: impl std::fmt::Display) {
        let action = action.into();
        warn!("Side effect failed: {}: {}", action, error);
        self.failures.push(SideEffectFailure {
            action,
            error: error.to_string(),
        });
    }

    /// True when every side effect succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub record: TicketRecord,
    /// Initial overwrites the channel was created with
    pub grants: Vec<Overwrite>,
    pub pinged_roles: Vec<RoleId>,
    pub report: SideEffectReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub channel_id: ChannelId,
    pub claimant: UserId,
    pub overwrites: Vec<Overwrite>,
    pub report: SideEffectReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnclaimOutcome {
    pub channel_id: ChannelId,
    pub overwrites: Vec<Overwrite>,
    pub report: SideEffectReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Claimed(ClaimOutcome),
    Unclaimed(UnclaimOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArchiveStatus {
    Exported { file_name: String, path: PathBuf },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseOutcome {
    /// The evicted record with its close fields populated
    pub record: TicketRecord,
    pub archive: ArchiveStatus,
    pub summary_posted: bool,
    pub report: SideEffectReport,
}

pub struct TicketLifecycleEngine {
    config: Arc<ConfigStore>,
    registry: Arc<TicketRegistry>,
    transport: Arc<dyn Transport>,
    exporter: Arc<dyn TranscriptExporter>,
    panel: Arc<PanelSynchronizer>,
    locks: KeyedLocks,
}

impl TicketLifecycleEngine {
    pub fn new(
        config: Arc<ConfigStore>,
        registry: Arc<TicketRegistry>,
        transport: Arc<dyn Transport>,
        exporter: Arc<dyn TranscriptExporter>,
    ) -> Self {
        let panel = Arc::new(PanelSynchronizer::new(config.clone(), transport.clone()));
        Self {
            config,
            registry,
            transport,
            exporter,
            panel,
            locks: KeyedLocks::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TicketRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn panel(&self) -> &Arc<PanelSynchronizer> {
        &self.panel
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Open tickets with their claimants
    pub fn list(&self) -> Vec<TicketView> {
        self.registry.list()
    }

    /// Open a ticket in `category_name` for `actor`
    pub async fn create(&self, actor: &Actor, category_name: &str) -> TicketResult<CreateOutcome> {
        let _guard = self.locks.acquire(&user_key(&actor.id)).await;
        let config = self.config.snapshot();

        let category = config
            .category(category_name)
            .ok_or_else(|| TicketError::CategoryNotFound(category_name.to_string()))?;

        let open = self.registry.count_open_by(&actor.id);
        let max = config.settings.max_tickets_per_user;
        if open >= max as usize {
            debug!("{} is at the ticket limit ({}/{})", actor.id, open, max);
            return Err(TicketError::TicketLimitReached { open, max });
        }

        let container = config
            .channels
            .ticket_category
            .clone()
            .ok_or(TicketError::StorageNotConfigured)?;
        if !self.transport.container_exists(&container).await? {
            return Err(TicketError::StorageUnavailable { container });
        }

        let pinged_roles = PermissionResolver::new(&config).roles_to_ping(&category.name);
        let grants = overwrites::create_overwrites(Some(category), &config.permissions, &actor.id);
        let spec = ChannelSpec {
            name: format!("{}{}", config.settings.ticket_prefix, actor.name),
            topic: ticket_common::ticket::ticket_topic(&actor.tag, &actor.id, &category.name),
            parent: container,
            overwrites: grants.clone(),
        };

        let channel = self.transport.create_channel(spec).await?;
        let record = TicketRecord::open(&channel.id, &channel.name, &category.name, actor);
        self.registry.register(record.clone())?;

        let mut report = SideEffectReport::default();
        let welcome = messages::welcome(&record, category, actor, &pinged_roles);
        if let Err(e) = self.transport.send_message(&record.channel_id, welcome).await {
            report.record("post welcome message", e);
        }

        self.sync_panel().await;

        Ok(CreateOutcome {
            record,
            grants,
            pinged_roles,
            report,
        })
    }

    /// Create from a category picked on a panel message. Selections from
    /// messages that are not our panel are refused.
    pub async fn create_from_panel(
        &self,
        actor: &Actor,
        category_name: &str,
        panel_channel: &str,
        panel_message: &str,
    ) -> TicketResult<CreateOutcome> {
        let message = match self.transport.fetch_message(panel_channel, panel_message).await {
            Ok(message) => message,
            Err(TransportError::NotFound(_)) => return Err(TicketError::PanelOutdated),
            Err(e) => return Err(e.into()),
        };
        if !self.panel.is_panel(&message) {
            debug!("Selection from unrecognised message {}", panel_message);
            return Err(TicketError::PanelOutdated);
        }
        self.create(actor, category_name).await
    }

    pub async fn claim(&self, actor: &Actor, channel_id: &str) -> TicketResult<ClaimOutcome> {
        let _guard = self.locks.acquire(channel_id).await;
        self.claim_locked(actor, channel_id).await
    }

    pub async fn unclaim(&self, actor: &Actor, channel_id: &str) -> TicketResult<UnclaimOutcome> {
        let _guard = self.locks.acquire(channel_id).await;
        self.unclaim_locked(actor, channel_id).await
    }

    /// Unclaim if `actor` holds the claim, otherwise claim
    pub async fn toggle_claim(&self, actor: &Actor, channel_id: &str) -> TicketResult<ToggleOutcome> {
        let _guard = self.locks.acquire(channel_id).await;
        if self.registry.claimant(channel_id).as_deref() == Some(actor.id.as_str()) {
            self.unclaim_locked(actor, channel_id)
                .await
                .map(ToggleOutcome::Unclaimed)
        } else {
            self.claim_locked(actor, channel_id)
                .await
                .map(ToggleOutcome::Claimed)
        }
    }

    async fn claim_locked(&self, actor: &Actor, channel_id: &str) -> TicketResult<ClaimOutcome> {
        let record = self.registry.lookup(channel_id).ok_or(TicketError::NotATicket)?;
        let config = self.config.snapshot();

        if !PermissionResolver::new(&config).resolve_for(Capability::Claim, actor, Some(&record.category)) {
            debug!("{} may not claim {} ({})", actor.id, channel_id, record.category);
            return Err(TicketError::Forbidden {
                capability: Capability::Claim,
            });
        }

        self.registry.claim(channel_id, &actor.id)?;

        let planned = overwrites::claim_overwrites(
            config.category(&record.category),
            &config.permissions,
            &actor.id,
        );
        let mut report = SideEffectReport::default();
        self.apply_overwrites(channel_id, &planned, &mut report).await;
        self.relabel_toggle(channel_id, true, &mut report).await;
        if let Err(e) = self
            .transport
            .send_message(channel_id, messages::claimed_notice(actor))
            .await
        {
            report.record("post claim notice", e);
        }

        Ok(ClaimOutcome {
            channel_id: channel_id.to_string(),
            claimant: actor.id.clone(),
            overwrites: planned,
            report,
        })
    }

    async fn unclaim_locked(&self, actor: &Actor, channel_id: &str) -> TicketResult<UnclaimOutcome> {
        self.registry.unclaim(channel_id, &actor.id)?;

        let config = self.config.snapshot();
        let category = self
            .registry
            .lookup(channel_id)
            .and_then(|record| config.category(&record.category).cloned());
        let planned = overwrites::unclaim_overwrites(category.as_ref(), &config.permissions);

        let mut report = SideEffectReport::default();
        self.apply_overwrites(channel_id, &planned, &mut report).await;
        self.relabel_toggle(channel_id, false, &mut report).await;
        if let Err(e) = self
            .transport
            .send_message(channel_id, messages::unclaimed_notice(actor))
            .await
        {
            report.record("post unclaim notice", e);
        }

        Ok(UnclaimOutcome {
            channel_id: channel_id.to_string(),
            overwrites: planned,
            report,
        })
    }

    /// Close a ticket from Open or Claimed, archive it and tear the channel down
    pub async fn close(
        &self,
        actor: &Actor,
        channel_id: &str,
        reason: Option<&str>,
    ) -> TicketResult<CloseOutcome> {
        let _guard = self.locks.acquire(channel_id).await;
        let record = self.registry.lookup(channel_id).ok_or(TicketError::NotATicket)?;
        let config = self.config.snapshot();

        if !PermissionResolver::new(&config).resolve_for(Capability::Close, actor, Some(&record.category)) {
            debug!("{} may not close {} ({})", actor.id, channel_id, record.category);
            return Err(TicketError::Forbidden {
                capability: Capability::Close,
            });
        }

        let record = self.registry.close(channel_id, Closure::by(actor, reason))?;
        let mut report = SideEffectReport::default();

        let archive = self.archive(&record).await;
        let mut summary_posted = false;
        match (&archive, config.channels.transcript_channel.as_deref()) {
            (ArchiveStatus::Exported { path, .. }, Some(destination)) => {
                match self
                    .transport
                    .send_message(destination, messages::transcript_summary(&record, path))
                    .await
                {
                    Ok(_) => summary_posted = true,
                    Err(e) => report.record("post transcript summary", e),
                }
            }
            (ArchiveStatus::Failed { .. }, Some(_)) => {
                debug!("Skipping transcript summary for {}: export failed", channel_id);
            }
            (_, None) => {}
        }

        // the channel is the only copy of the history until a transcript exists
        if let ArchiveStatus::Failed { error } = &archive {
            report.record(
                "delete ticket channel",
                format!("channel kept: transcript export failed ({})", error),
            );
        } else if let Err(e) = self.transport.delete_channel(channel_id).await {
            report.record("delete ticket channel", e);
        }

        Ok(CloseOutcome {
            record,
            archive,
            summary_posted,
            report,
        })
    }

    async fn archive(&self, record: &TicketRecord) -> ArchiveStatus {
        let mut history = match self
            .transport
            .fetch_messages(&record.channel_id, TRANSCRIPT_FETCH_LIMIT)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!("Transcript fetch failed for {}: {}", record.channel_id, e);
                return ArchiveStatus::Failed {
                    error: e.to_string(),
                };
            }
        };
        // chronological order
        history.reverse();

        match self.exporter.export(&history, record).await {
            Ok(handle) => {
                info!("Transcript for {} written to {}", record.channel_id, handle.path.display());
                ArchiveStatus::Exported {
                    file_name: handle.file_name,
                    path: handle.path,
                }
            }
            Err(e) => {
                warn!("Transcript export failed for {}: {}", record.channel_id, e);
                ArchiveStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn apply_overwrites(&self, channel_id: &str, planned: &[Overwrite], report: &mut SideEffectReport) {
        for ow in planned {
            if let Err(e) = self
                .transport
                .edit_overwrite(channel_id, &ow.target, ow.patch)
                .await
            {
                report.record(format!("edit overwrite for {}", ow.target), e);
            }
        }
    }

    async fn relabel_toggle(&self, channel_id: &str, claimed: bool, report: &mut SideEffectReport) {
        let recent = match self
            .transport
            .fetch_messages(channel_id, messages::TICKET_MESSAGE_SEARCH_DEPTH)
            .await
        {
            Ok(recent) => recent,
            Err(e) => {
                report.record("fetch ticket message", e);
                return;
            }
        };
        let Some(ticket_message) = messages::find_ticket_message(&recent) else {
            debug!("No ticket message found in {}", channel_id);
            return;
        };
        if let Err(e) = self
            .transport
            .edit_message(channel_id, &ticket_message.id, messages::toggle_edit(claimed))
            .await
        {
            report.record("relabel claim toggle", e);
        }
    }

    /// Opportunistic panel re-render; failures are only logged
    pub async fn sync_panel(&self) {
        match self.panel.update().await {
            Ok(result) => debug!("Panel synced: {:?}", result),
            Err(TicketError::PanelMissing(reason)) => debug!("Panel not synced: {}", reason),
            Err(e) => warn!("Panel sync failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_transport::{MemoryTransport, Operation};
    use crate::transcript::HtmlTranscriptExporter;
    use tempfile::{tempdir, TempDir};
    use ticket_common::{StaffRoles, TicketConfig};

    struct Fixture {
        _dir: TempDir,
        transport: Arc<MemoryTransport>,
        engine: TicketLifecycleEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let container = transport.add_container();
        let mut config = TicketConfig::default();
        config.channels.ticket_category = Some(container);
        config.ticket_categories[0].staff_roles = StaffRoles {
            access: vec!["A".into()],
            claim: vec!["S".into()],
            close: vec!["C".into()],
            persistent: vec![],
            ping: Some(vec![]),
        };
        let engine = TicketLifecycleEngine::new(
            Arc::new(ConfigStore::in_memory(config)),
            Arc::new(TicketRegistry::new()),
            transport.clone(),
            Arc::new(HtmlTranscriptExporter::new(dir.path())),
        );
        Fixture {
            _dir: dir,
            transport,
            engine,
        }
    }

    #[tokio::test]
    async fn test_create_checks_category_first() {
        let f = fixture();
        let user = Actor::new("10", "una");
        let err = f.engine.create(&user, "Nope").await.unwrap_err();
        assert!(matches!(err, TicketError::CategoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_requires_storage() {
        let f = fixture();
        f.engine
            .config()
            .update_channels(|c| c.ticket_category = None)
            .unwrap();
        let err = f
            .engine
            .create(&Actor::new("10", "una"), "Billing")
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::StorageNotConfigured));

        f.engine
            .config()
            .update_channels(|c| c.ticket_category = Some("gone".into()))
            .unwrap();
        let err = f
            .engine
            .create(&Actor::new("10", "una"), "Billing")
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::StorageUnavailable { .. }));
        assert!(f.engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_claim_requires_capability() {
        let f = fixture();
        let user = Actor::new("10", "una");
        let created = f.engine.create(&user, "General Support").await.unwrap();
        let channel = created.record.channel_id;

        let err = f
            .engine
            .claim(&Actor::new("30", "tom").with_roles(["A"]), &channel)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::Forbidden { capability: Capability::Claim }));
        assert!(f.engine.registry().claimant(&channel).is_none());
    }

    #[tokio::test]
    async fn test_toggle_flips_claim() {
        let f = fixture();
        let created = f
            .engine
            .create(&Actor::new("10", "una"), "General Support")
            .await
            .unwrap();
        let channel = created.record.channel_id;
        let staff = Actor::new("20", "sam").with_roles(["S"]);

        let first = f.engine.toggle_claim(&staff, &channel).await.unwrap();
        assert!(matches!(first, ToggleOutcome::Claimed(_)));
        let second = f.engine.toggle_claim(&staff, &channel).await.unwrap();
        assert!(matches!(second, ToggleOutcome::Unclaimed(_)));
        assert!(f.engine.registry().claimant(&channel).is_none());
    }

    #[tokio::test]
    async fn test_overwrite_failure_is_partial_success() {
        let f = fixture();
        let created = f
            .engine
            .create(&Actor::new("10", "una"), "General Support")
            .await
            .unwrap();
        let channel = created.record.channel_id;

        f.transport
            .fail_on(Operation::EditOverwrite, TransportError::Rejected("missing access".into()));
        let staff = Actor::new("20", "sam").with_roles(["S"]);
        let outcome = f.engine.claim(&staff, &channel).await.unwrap();

        assert!(!outcome.report.is_clean());
        // the claim stays committed
        assert_eq!(f.engine.registry().claimant(&channel).as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn test_archive_failure_keeps_close_committed() {
        let f = fixture();
        let transcripts = f.transport.add_text_channel("transcripts");
        f.engine
            .config()
            .update_channels(|c| c.transcript_channel = Some(transcripts.clone()))
            .unwrap();
        let created = f
            .engine
            .create(&Actor::new("10", "una"), "General Support")
            .await
            .unwrap();
        let channel = created.record.channel_id;

        f.transport
            .fail_on(Operation::FetchMessages, TransportError::Unavailable("timeout".into()));
        let outcome = f
            .engine
            .close(&Actor::new("1", "root").admin(), &channel, None)
            .await
            .unwrap();

        assert!(matches!(outcome.archive, ArchiveStatus::Failed { .. }));
        assert!(!outcome.summary_posted);
        assert!(f.transport.messages(&transcripts).is_empty());
        assert!(f.engine.registry().lookup(&channel).is_none());
    }

    #[tokio::test]
    async fn test_archive_failure_keeps_channel() {
        let f = fixture();
        let created = f
            .engine
            .create(&Actor::new("10", "una"), "General Support")
            .await
            .unwrap();
        let channel = created.record.channel_id;

        f.transport
            .fail_on(Operation::FetchMessages, TransportError::Unavailable("timeout".into()));
        let outcome = f
            .engine
            .close(&Actor::new("1", "root").admin(), &channel, None)
            .await
            .unwrap();

        assert!(matches!(outcome.archive, ArchiveStatus::Failed { .. }));
        assert!(f.transport.channel_info(&channel).is_some());
        assert_eq!(outcome.report.failures.len(), 1);
        assert!(outcome.report.failures[0].error.starts_with("channel kept"));
        assert!(f.engine.registry().lookup(&channel).is_none());
    }
}
