//! Administrative surface: categories, staff roles, legacy roles,
//! channel wiring, settings and the panel.
//!
//! Every operation requires an administrator. Category and staff-role
//! changes re-render the panel afterwards; the outcome of that is
//! returned as a note and never fails the change itself.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use ticket_common::ipc::{ChannelTarget, SettingKey};
use ticket_common::{
    Actor, Capability, CapabilityScope, Category, CategoryPatch, ConfigStore, LegacyRoleKind,
    MessageId, Settings, TicketError, TicketResult,
};

use crate::panel::{PanelSynchronizer, PanelUpdate};
use crate::transport::Transport;

/// Result of an administrative change plus the panel sync note
#[derive(Debug, Clone, Serialize)]
pub struct AdminOutcome<T> {
    pub value: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_note: Option<String>,
}

impl<T> AdminOutcome<T> {
    fn plain(value: T) -> Self {
        Self {
            value,
            panel_note: None,
        }
    }
}

/// Which capability sets a grant or revoke changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChange {
    pub category: String,
    pub role: String,
    pub changed: Vec<Capability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelAssignment {
    pub target: ChannelTarget,
    pub channel_id: String,
    /// Set when the panel was (re)created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_message: Option<MessageId>,
}

pub struct AdminService {
    config: Arc<ConfigStore>,
    panel: Arc<PanelSynchronizer>,
    transport: Arc<dyn Transport>,
}

fn require_admin(actor: &Actor) -> TicketResult<()> {
    if actor.is_admin {
        Ok(())
    } else {
        debug!("{} attempted an administrative action", actor.id);
        Err(TicketError::AdminRequired)
    }
}

impl AdminService {
    pub fn new(config: Arc<ConfigStore>, panel: Arc<PanelSynchronizer>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            panel,
            transport,
        }
    }

    async fn with_panel_sync<T>(&self, value: T) -> AdminOutcome<T> {
        let note = match self.panel.update().await {
            Ok(PanelUpdate::Updated { categories }) => {
                format!("Panel updated with {} categories.", categories)
            }
            Ok(PanelUpdate::Placeholder) => "Panel updated - no categories available.".to_string(),
            Err(e) => format!("Panel not updated: {}", e),
        };
        AdminOutcome {
            value,
            panel_note: Some(note),
        }
    }

    pub async fn add_category(
        &self,
        actor: &Actor,
        name: &str,
        description: &str,
        color: Option<&str>,
        emoji: Option<&str>,
    ) -> TicketResult<AdminOutcome<Category>> {
        require_admin(actor)?;
        let mut category = Category::new(name.trim(), description);
        if let Some(color) = color {
            category = category.with_color(color);
        }
        if let Some(emoji) = emoji {
            category = category.with_emoji(emoji);
        }
        self.config.add_category(category.clone())?;
        info!("Category \"{}\" added by {}", category.name, actor.id);
        Ok(self.with_panel_sync(category).await)
    }

    pub async fn remove_category(&self, actor: &Actor, name: &str) -> TicketResult<AdminOutcome<Category>> {
        require_admin(actor)?;
        let removed = self.config.remove_category(name)?;
        info!("Category \"{}\" removed by {}", name, actor.id);
        Ok(self.with_panel_sync(removed).await)
    }

    pub async fn edit_category(
        &self,
        actor: &Actor,
        name: &str,
        patch: CategoryPatch,
    ) -> TicketResult<AdminOutcome<Category>> {
        require_admin(actor)?;
        if patch.is_empty() {
            return Err(TicketError::InvalidInput(
                "Please provide at least one field to update.".to_string(),
            ));
        }
        if patch.name.as_deref().map(|n| n.trim().is_empty()).unwrap_or(false) {
            return Err(TicketError::InvalidInput(
                "Category name must not be empty.".to_string(),
            ));
        }
        let updated = self.config.update_category(name, patch)?;
        info!("Category \"{}\" edited by {}", name, actor.id);
        Ok(self.with_panel_sync(updated).await)
    }

    pub fn list_categories(&self, actor: &Actor) -> TicketResult<Vec<Category>> {
        require_admin(actor)?;
        Ok(self.config.categories())
    }

    pub fn category_info(&self, actor: &Actor, name: &str) -> TicketResult<Category> {
        require_admin(actor)?;
        self.config
            .category(name)
            .ok_or_else(|| TicketError::CategoryNotFound(name.to_string()))
    }

    pub async fn grant_staff_role(
        &self,
        actor: &Actor,
        category: &str,
        role: &str,
        scope: CapabilityScope,
    ) -> TicketResult<AdminOutcome<RoleChange>> {
        self.change_staff_role(actor, category, role, scope, true).await
    }

    pub async fn revoke_staff_role(
        &self,
        actor: &Actor,
        category: &str,
        role: &str,
        scope: CapabilityScope,
    ) -> TicketResult<AdminOutcome<RoleChange>> {
        self.change_staff_role(actor, category, role, scope, false).await
    }

    async fn change_staff_role(
        &self,
        actor: &Actor,
        category: &str,
        role: &str,
        scope: CapabilityScope,
        grant: bool,
    ) -> TicketResult<AdminOutcome<RoleChange>> {
        require_admin(actor)?;
        let changed = self.config.modify_category(category, |c| {
            scope
                .capabilities()
                .into_iter()
                .filter(|cap| {
                    if grant {
                        c.staff_roles.grant(*cap, role)
                    } else {
                        c.staff_roles.revoke(*cap, role)
                    }
                })
                .collect::<Vec<_>>()
        })?;
        let verb = if grant { "granted" } else { "revoked" };
        if changed.is_empty() {
            debug!("Staff role {} already {} on \"{}\" ({})", role, verb, category, scope);
        } else {
            info!(
                "Staff role {} {} on \"{}\" ({}) by {}",
                role, verb, category, scope, actor.id
            );
        }
        let change = RoleChange {
            category: category.to_string(),
            role: role.to_string(),
            changed,
        };
        Ok(self.with_panel_sync(change).await)
    }

    pub fn grant_legacy_role(&self, actor: &Actor, kind: LegacyRoleKind, role: &str) -> TicketResult<AdminOutcome<bool>> {
        require_admin(actor)?;
        let changed = self.config.update_permissions(|p| p.grant(kind, role))?;
        if changed {
            info!("Legacy {} role {} added by {}", kind, role, actor.id);
        }
        Ok(AdminOutcome::plain(changed))
    }

    pub fn revoke_legacy_role(&self, actor: &Actor, kind: LegacyRoleKind, role: &str) -> TicketResult<AdminOutcome<bool>> {
        require_admin(actor)?;
        let changed = self.config.update_permissions(|p| p.revoke(kind, role))?;
        if changed {
            info!("Legacy {} role {} removed by {}", kind, role, actor.id);
        }
        Ok(AdminOutcome::plain(changed))
    }

    pub async fn set_channel(
        &self,
        actor: &Actor,
        target: ChannelTarget,
        channel_id: &str,
    ) -> TicketResult<AdminOutcome<ChannelAssignment>> {
        require_admin(actor)?;
        let exists = match target {
            ChannelTarget::TicketCategory => self.transport.container_exists(channel_id).await?,
            ChannelTarget::Transcript | ChannelTarget::Panel => {
                self.transport.channel_exists(channel_id).await?
            }
        };
        if !exists {
            return Err(TicketError::InvalidInput(format!(
                "Channel {} was not found.",
                channel_id
            )));
        }

        let channel = channel_id.to_string();
        let panel_message = match target {
            ChannelTarget::TicketCategory => {
                self.config
                    .update_channels(|c| c.ticket_category = Some(channel))?;
                None
            }
            ChannelTarget::Transcript => {
                self.config
                    .update_channels(|c| c.transcript_channel = Some(channel))?;
                None
            }
            ChannelTarget::Panel => Some(self.panel.relocate(channel_id).await?),
        };
        info!("Channel {:?} set to {} by {}", target, channel_id, actor.id);

        Ok(AdminOutcome::plain(ChannelAssignment {
            target,
            channel_id: channel_id.to_string(),
            panel_message,
        }))
    }

    pub fn set_setting(&self, actor: &Actor, key: SettingKey, value: &str) -> TicketResult<AdminOutcome<Settings>> {
        require_admin(actor)?;
        let settings = match key {
            SettingKey::TicketPrefix => {
                if value.trim().is_empty() {
                    return Err(TicketError::InvalidInput(
                        "Ticket prefix must not be empty.".to_string(),
                    ));
                }
                let prefix = value.to_string();
                self.config.update_settings(|s| {
                    s.ticket_prefix = prefix;
                    s.clone()
                })?
            }
            SettingKey::MaxTicketsPerUser => {
                let max = value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|max| *max >= 1)
                    .ok_or_else(|| {
                        TicketError::InvalidInput(
                            "Max tickets per user must be a whole number of at least 1.".to_string(),
                        )
                    })?;
                self.config.update_settings(|s| {
                    s.max_tickets_per_user = max;
                    s.clone()
                })?
            }
        };
        info!("Setting {} set to {} by {}", key, value, actor.id);
        Ok(AdminOutcome::plain(settings))
    }

    pub async fn refresh_panel(&self, actor: &Actor) -> TicketResult<AdminOutcome<MessageId>> {
        require_admin(actor)?;
        let message = self.panel.refresh().await?;
        Ok(AdminOutcome::plain(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_transport::MemoryTransport;
    use ticket_common::TicketConfig;

    fn service(config: TicketConfig) -> (Arc<MemoryTransport>, AdminService, Arc<ConfigStore>) {
        let transport = Arc::new(MemoryTransport::new());
        let store = Arc::new(ConfigStore::in_memory(config));
        let panel = Arc::new(PanelSynchronizer::new(store.clone(), transport.clone()));
        let admin = AdminService::new(store.clone(), panel, transport.clone());
        (transport, admin, store)
    }

    fn admin() -> Actor {
        Actor::new("1", "root").admin()
    }

    #[tokio::test]
    async fn test_non_admin_is_refused() {
        let (_, service, store) = service(TicketConfig::default());
        let user = Actor::new("5", "una");
        let err = service
            .add_category(&user, "Sales", "buy things", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::AdminRequired));
        assert_eq!(err.class(), ticket_common::ErrorClass::Authorization);
        assert_eq!(store.categories().len(), 3);
    }

    #[tokio::test]
    async fn test_add_category_defaults() {
        let (_, service, _) = service(TicketConfig::empty());
        let outcome = service
            .add_category(&admin(), "Sales", "buy things", None, None)
            .await
            .unwrap();
        assert_eq!(outcome.value.color, "#7289da");
        assert_eq!(outcome.value.emoji, "🎫");
        // no panel recorded yet
        assert!(outcome.panel_note.unwrap().starts_with("Panel not updated"));
    }

    #[tokio::test]
    async fn test_grant_all_loops_over_capabilities() {
        let (_, service, store) = service(TicketConfig::default());
        let outcome = service
            .grant_staff_role(&admin(), "Billing", "R", CapabilityScope::All)
            .await
            .unwrap();
        assert_eq!(outcome.value.changed, Capability::ALL.to_vec());

        let again = service
            .grant_staff_role(&admin(), "Billing", "R", CapabilityScope::One(Capability::Claim))
            .await
            .unwrap();
        assert!(again.value.changed.is_empty());

        service
            .revoke_staff_role(&admin(), "Billing", "R", CapabilityScope::One(Capability::Ping))
            .await
            .unwrap();
        let staff = store.category("Billing").unwrap().staff_roles;
        assert!(staff.contains(Capability::Persistent, "R"));
        assert!(!staff.contains(Capability::Ping, "R"));
        assert!(staff.ping_defined());
    }

    #[tokio::test]
    async fn test_revoking_unheld_role_changes_nothing() {
        let (_, service, store) = service(TicketConfig::default());
        let before = store.category("Billing").unwrap();
        let outcome = service
            .revoke_staff_role(&admin(), "Billing", "ghost", CapabilityScope::One(Capability::Claim))
            .await
            .unwrap();
        assert!(outcome.value.changed.is_empty());
        assert_eq!(store.category("Billing").unwrap(), before);

        let legacy = service
            .revoke_legacy_role(&admin(), LegacyRoleKind::TicketAccess, "ghost")
            .unwrap();
        assert!(!legacy.value);
    }

    #[tokio::test]
    async fn test_staff_role_on_missing_category() {
        let (_, service, _) = service(TicketConfig::default());
        let err = service
            .grant_staff_role(&admin(), "Ghost", "R", CapabilityScope::All)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::CategoryNotFound(_)));
    }

    #[test]
    fn test_settings_validation() {
        let (_, service, store) = service(TicketConfig::default());
        for bad in ["0", "-1", "abc", ""] {
            let err = service
                .set_setting(&admin(), SettingKey::MaxTicketsPerUser, bad)
                .unwrap_err();
            assert!(matches!(err, TicketError::InvalidInput(_)), "{}", bad);
        }
        assert!(service.set_setting(&admin(), SettingKey::TicketPrefix, "  ").is_err());

        let outcome = service
            .set_setting(&admin(), SettingKey::MaxTicketsPerUser, "5")
            .unwrap();
        assert_eq!(outcome.value.max_tickets_per_user, 5);
        assert_eq!(store.settings().max_tickets_per_user, 5);
    }

    #[tokio::test]
    async fn test_panel_channel_moves_panel() {
        let (transport, service, store) = service(TicketConfig::default());
        let first = transport.add_text_channel("support");
        let second = transport.add_text_channel("help");

        service.set_channel(&admin(), ChannelTarget::Panel, &first).await.unwrap();
        assert_eq!(transport.messages(&first).len(), 1);

        let outcome = service.set_channel(&admin(), ChannelTarget::Panel, &second).await.unwrap();
        assert!(transport.messages(&first).is_empty());
        assert_eq!(transport.messages(&second).len(), 1);
        assert_eq!(store.channels().ticket_panel_message, outcome.value.panel_message);
    }

    #[tokio::test]
    async fn test_panel_channel_requires_categories() {
        let (transport, service, _) = service(TicketConfig::empty());
        let channel = transport.add_text_channel("support");
        let err = service
            .set_channel(&admin(), ChannelTarget::Panel, &channel)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::NoCategories));
    }

    #[tokio::test]
    async fn test_category_change_updates_panel() {
        let (transport, service, _) = service(TicketConfig::default());
        let channel = transport.add_text_channel("support");
        service.set_channel(&admin(), ChannelTarget::Panel, &channel).await.unwrap();

        let outcome = service.remove_category(&admin(), "Billing").await.unwrap();
        assert_eq!(outcome.panel_note.as_deref(), Some("Panel updated with 2 categories."));
    }

    #[tokio::test]
    async fn test_unknown_storage_container_rejected() {
        let (_, service, store) = service(TicketConfig::default());
        let err = service
            .set_channel(&admin(), ChannelTarget::TicketCategory, "nowhere")
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::InvalidInput(_)));
        assert!(store.channels().ticket_category.is_none());
    }
}
