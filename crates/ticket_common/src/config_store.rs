//! Persisted ticket configuration: categories, legacy role grants,
//! channel wiring and numeric settings.
//!
//! The file is JSON with camelCase keys. Each mutation is written
//! immediately (temp file + rename). Callers read snapshots; nothing
//! outside this module holds a reference into the live configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

use crate::category::{Category, CategoryPatch, StaffRoles, StaffRolesShape};
use crate::error::{ConfigError, TicketError, TicketResult};
use crate::{ChannelId, RoleId};

/// Default channel-name prefix for tickets
pub const DEFAULT_TICKET_PREFIX: &str = "ticket-";

/// Default per-user open ticket limit
pub const DEFAULT_MAX_TICKETS_PER_USER: u32 = 3;

/// Legacy, non-category-scoped role grants
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPermissions {
    #[serde(default)]
    pub ticket_access_roles: Vec<RoleId>,
    #[serde(default)]
    pub claim_roles: Vec<RoleId>,
    #[serde(default)]
    pub close_roles: Vec<RoleId>,
}

/// Which legacy role list an administrative change targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyRoleKind {
    TicketAccess,
    Claim,
    Close,
}

impl std::fmt::Display for LegacyRoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TicketAccess => write!(f, "ticket_access"),
            Self::Claim => write!(f, "claim"),
            Self::Close => write!(f, "close"),
        }
    }
}

impl FromStr for LegacyRoleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket_access" | "access" => Ok(Self::TicketAccess),
            "claim" => Ok(Self::Claim),
            "close" => Ok(Self::Close),
            other => Err(format!("unknown legacy role type: {}", other)),
        }
    }
}

impl LegacyPermissions {
    pub fn roles(&self, kind: LegacyRoleKind) -> &[RoleId] {
        match kind {
            LegacyRoleKind::TicketAccess => &self.ticket_access_roles,
            LegacyRoleKind::Claim => &self.claim_roles,
            LegacyRoleKind::Close => &self.close_roles,
        }
    }

    fn roles_mut(&mut self, kind: LegacyRoleKind) -> &mut Vec<RoleId> {
        match kind {
            LegacyRoleKind::TicketAccess => &mut self.ticket_access_roles,
            LegacyRoleKind::Claim => &mut self.claim_roles,
            LegacyRoleKind::Close => &mut self.close_roles,
        }
    }

    pub fn grant(&mut self, kind: LegacyRoleKind, role: &str) -> bool {
        let roles = self.roles_mut(kind);
        if roles.iter().any(|r| r == role) {
            return false;
        }
        roles.push(role.to_string());
        true
    }

    pub fn revoke(&mut self, kind: LegacyRoleKind, role: &str) -> bool {
        let roles = self.roles_mut(kind);
        let before = roles.len();
        roles.retain(|r| r != role);
        roles.len() != before
    }
}

/// Platform locations the engine writes to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Container new ticket channels are created under
    #[serde(default)]
    pub ticket_category: Option<ChannelId>,
    /// Archive destination for close summaries
    #[serde(default)]
    pub transcript_channel: Option<ChannelId>,
    #[serde(default)]
    pub ticket_panel_channel: Option<ChannelId>,
    #[serde(default)]
    pub ticket_panel_message: Option<String>,
}

fn default_ticket_prefix() -> String {
    DEFAULT_TICKET_PREFIX.to_string()
}

fn default_max_tickets() -> u32 {
    DEFAULT_MAX_TICKETS_PER_USER
}

fn default_inactive_timeout() -> u32 {
    168 // hours
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_ticket_prefix")]
    pub ticket_prefix: String,
    #[serde(default = "default_max_tickets")]
    pub max_tickets_per_user: u32,
    #[serde(default)]
    pub auto_close_inactive: bool,
    #[serde(default = "default_inactive_timeout")]
    pub inactive_timeout: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ticket_prefix: default_ticket_prefix(),
            max_tickets_per_user: default_max_tickets(),
            auto_close_inactive: false,
            inactive_timeout: default_inactive_timeout(),
        }
    }
}

/// Full ticket configuration, as seen by one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketConfig {
    #[serde(default)]
    pub ticket_categories: Vec<Category>,
    #[serde(default)]
    pub permissions: LegacyPermissions,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub settings: Settings,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            ticket_categories: vec![
                Category::new("General Support", "General questions and support")
                    .with_color("#00ff00")
                    .with_emoji("🎫"),
                Category::new("Technical Issues", "Technical problems and bugs")
                    .with_color("#ff0000")
                    .with_emoji("🔧"),
                Category::new("Billing", "Payment and billing questions")
                    .with_color("#0000ff")
                    .with_emoji("💰"),
            ],
            permissions: LegacyPermissions::default(),
            channels: ChannelConfig::default(),
            settings: Settings::default(),
        }
    }
}

impl TicketConfig {
    /// A configuration with no categories at all
    pub fn empty() -> Self {
        Self {
            ticket_categories: Vec::new(),
            ..Self::default()
        }
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.ticket_categories.iter().find(|c| c.name == name)
    }

    /// Parse a configuration file body, normalising legacy staff-role
    /// shapes. Returns the configuration and whether anything was migrated.
    pub fn from_json(body: &str) -> Result<(Self, bool), ConfigError> {
        let raw: RawTicketConfig = serde_json::from_str(body)?;
        Ok(raw.normalize())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCategory {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    emoji: Option<String>,
    #[serde(default)]
    staff_roles: Option<StaffRolesShape>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicketConfig {
    #[serde(default)]
    ticket_categories: Vec<RawCategory>,
    #[serde(default)]
    permissions: LegacyPermissions,
    #[serde(default)]
    channels: ChannelConfig,
    #[serde(default)]
    settings: Settings,
}

impl RawTicketConfig {
    fn normalize(self) -> (TicketConfig, bool) {
        let mut migrated = false;
        let ticket_categories = self
            .ticket_categories
            .into_iter()
            .map(|raw| {
                let staff_roles = match raw.staff_roles {
                    Some(shape) => {
                        if shape.is_legacy() {
                            info!("Migrating flat staff roles of category \"{}\"", raw.name);
                            migrated = true;
                        }
                        shape.normalize()
                    }
                    None => StaffRoles::default(),
                };
                let mut category = Category::new(raw.name, raw.description)
                    .with_staff_roles(staff_roles);
                if let Some(color) = raw.color {
                    category.color = color;
                }
                if let Some(emoji) = raw.emoji {
                    category.emoji = emoji;
                }
                category
            })
            .collect();

        let config = TicketConfig {
            ticket_categories,
            permissions: self.permissions,
            channels: self.channels,
            settings: self.settings,
        };
        (config, migrated)
    }
}

/// Shared handle to the ticket configuration
pub struct ConfigStore {
    path: Option<PathBuf>,
    inner: RwLock<TicketConfig>,
}

impl ConfigStore {
    /// Load the configuration file, creating it with defaults if absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();

        let config = if path.exists() {
            let body = fs::read_to_string(&path)?;
            let (config, migrated) = TicketConfig::from_json(&body)?;
            if migrated {
                write_atomic(&path, &config)?;
                info!("Rewrote {} with migrated staff roles", path.display());
            }
            config
        } else {
            let config = TicketConfig::default();
            write_atomic(&path, &config)?;
            info!("Created default ticket configuration at {}", path.display());
            config
        };

        Ok(Self {
            path: Some(path),
            inner: RwLock::new(config),
        })
    }

    /// A store that never touches disk
    pub fn in_memory(config: TicketConfig) -> Self {
        Self {
            path: None,
            inner: RwLock::new(config),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the whole configuration
    pub fn snapshot(&self) -> TicketConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.snapshot().ticket_categories
    }

    pub fn category(&self, name: &str) -> Option<Category> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .category(name)
            .cloned()
    }

    pub fn channels(&self) -> ChannelConfig {
        self.snapshot().channels
    }

    pub fn settings(&self) -> Settings {
        self.snapshot().settings
    }

    pub fn legacy_permissions(&self) -> LegacyPermissions {
        self.snapshot().permissions
    }

    pub fn add_category(&self, category: Category) -> TicketResult<()> {
        if category.name.trim().is_empty() {
            return Err(TicketError::InvalidInput(
                "Category name must not be empty.".to_string(),
            ));
        }
        self.mutate(|config| {
            if config.category(&category.name).is_some() {
                return Err(TicketError::InvalidInput(format!(
                    "Category \"{}\" already exists.",
                    category.name
                )));
            }
            config.ticket_categories.push(category);
            Ok(())
        })
    }

    pub fn remove_category(&self, name: &str) -> TicketResult<Category> {
        self.mutate(|config| {
            let index = config
                .ticket_categories
                .iter()
                .position(|c| c.name == name)
                .ok_or_else(|| TicketError::CategoryNotFound(name.to_string()))?;
            Ok(config.ticket_categories.remove(index))
        })
    }

    pub fn update_category(&self, name: &str, patch: CategoryPatch) -> TicketResult<Category> {
        self.mutate(|config| {
            if let Some(new_name) = patch.name.as_deref() {
                if new_name != name && config.category(new_name).is_some() {
                    return Err(TicketError::InvalidInput(format!(
                        "Category \"{}\" already exists.",
                        new_name
                    )));
                }
            }
            let category = config
                .ticket_categories
                .iter_mut()
                .find(|c| c.name == name)
                .ok_or_else(|| TicketError::CategoryNotFound(name.to_string()))?;
            category.apply(patch);
            Ok(category.clone())
        })
    }

    /// Run `f` against one category and persist the result
    pub fn modify_category<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Category) -> R,
    ) -> TicketResult<R> {
        self.mutate(|config| {
            let category = config
                .ticket_categories
                .iter_mut()
                .find(|c| c.name == name)
                .ok_or_else(|| TicketError::CategoryNotFound(name.to_string()))?;
            Ok(f(category))
        })
    }

    pub fn update_channels<R>(&self, f: impl FnOnce(&mut ChannelConfig) -> R) -> TicketResult<R> {
        self.mutate(|config| Ok(f(&mut config.channels)))
    }

    pub fn update_settings<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> TicketResult<R> {
        self.mutate(|config| Ok(f(&mut config.settings)))
    }

    pub fn update_permissions<R>(
        &self,
        f: impl FnOnce(&mut LegacyPermissions) -> R,
    ) -> TicketResult<R> {
        self.mutate(|config| Ok(f(&mut config.permissions)))
    }

    /// Apply a change to a copy, persist it, then publish it. A failed
    /// write leaves the live configuration untouched.
    fn mutate<R>(&self, f: impl FnOnce(&mut TicketConfig) -> TicketResult<R>) -> TicketResult<R> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if next != *guard {
            if let Some(path) = &self.path {
                if let Err(e) = write_atomic(path, &next) {
                    warn!("Failed to save ticket configuration: {}", e);
                    return Err(e.into());
                }
            }
            *guard = next;
        }
        Ok(out)
    }
}

fn write_atomic(path: &Path, config: &TicketConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
