//! IPC protocol between ticketctl and ticketd.
//!
//! Newline-delimited JSON over a Unix socket: one `Request` per line in,
//! one `Response` per line out.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::category::{CapabilityScope, CategoryPatch};
use crate::config_store::LegacyRoleKind;
use crate::error::{ErrorClass, TicketError};
use crate::ticket::Actor;
use crate::{ChannelId, RoleId};

/// Socket the daemon listens on unless configured otherwise
pub const DEFAULT_SOCKET_PATH: &str = "/run/ticketd/ticketd.sock";

/// Environment variable the CLI reads the socket path from
pub const SOCKET_ENV: &str = "TICKETD_SOCKET";

/// Which configured location a channel assignment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelTarget {
    /// Container new tickets are created under
    TicketCategory,
    /// Archive destination for close summaries
    Transcript,
    /// Where the category picker lives
    Panel,
}

impl FromStr for ChannelTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket_category" | "ticket-category" | "storage" => Ok(Self::TicketCategory),
            "transcript" => Ok(Self::Transcript),
            "panel" => Ok(Self::Panel),
            other => Err(format!("unknown channel type: {}", other)),
        }
    }
}

/// Numeric/text settings an administrator may change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    TicketPrefix,
    MaxTicketsPerUser,
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TicketPrefix => write!(f, "ticket_prefix"),
            Self::MaxTicketsPerUser => write!(f, "max_tickets_per_user"),
        }
    }
}

impl FromStr for SettingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket_prefix" | "ticket-prefix" => Ok(Self::TicketPrefix),
            "max_tickets_per_user" | "max-tickets-per-user" => Ok(Self::MaxTicketsPerUser),
            other => Err(format!("unknown setting: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,

    // Ticket intents
    Create {
        actor: Actor,
        category: String,
    },
    /// Category chosen from a panel message
    SelectCategory {
        actor: Actor,
        category: String,
        panel_channel: ChannelId,
        panel_message: String,
    },
    Claim {
        actor: Actor,
        channel_id: ChannelId,
    },
    Unclaim {
        actor: Actor,
        channel_id: ChannelId,
    },
    ToggleClaim {
        actor: Actor,
        channel_id: ChannelId,
    },
    Close {
        actor: Actor,
        channel_id: ChannelId,
        #[serde(default)]
        reason: Option<String>,
    },
    Tickets,

    // Administration
    CategoryAdd {
        actor: Actor,
        name: String,
        description: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        emoji: Option<String>,
    },
    CategoryRemove {
        actor: Actor,
        name: String,
    },
    CategoryEdit {
        actor: Actor,
        name: String,
        patch: CategoryPatch,
    },
    CategoryList {
        actor: Actor,
    },
    CategoryInfo {
        actor: Actor,
        name: String,
    },
    StaffRoleGrant {
        actor: Actor,
        category: String,
        role: RoleId,
        scope: CapabilityScope,
    },
    StaffRoleRevoke {
        actor: Actor,
        category: String,
        role: RoleId,
        scope: CapabilityScope,
    },
    LegacyRoleGrant {
        actor: Actor,
        kind: LegacyRoleKind,
        role: RoleId,
    },
    LegacyRoleRevoke {
        actor: Actor,
        kind: LegacyRoleKind,
        role: RoleId,
    },
    ChannelSet {
        actor: Actor,
        target: ChannelTarget,
        channel_id: ChannelId,
    },
    SettingSet {
        actor: Actor,
        setting: SettingKey,
        value: String,
    },
    RefreshPanel {
        actor: Actor,
    },
}

impl Request {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Create { .. } => "create",
            Request::SelectCategory { .. } => "select_category",
            Request::Claim { .. } => "claim",
            Request::Unclaim { .. } => "unclaim",
            Request::ToggleClaim { .. } => "toggle_claim",
            Request::Close { .. } => "close",
            Request::Tickets => "tickets",
            Request::CategoryAdd { .. } => "category_add",
            Request::CategoryRemove { .. } => "category_remove",
            Request::CategoryEdit { .. } => "category_edit",
            Request::CategoryList { .. } => "category_list",
            Request::CategoryInfo { .. } => "category_info",
            Request::StaffRoleGrant { .. } => "staff_role_grant",
            Request::StaffRoleRevoke { .. } => "staff_role_revoke",
            Request::LegacyRoleGrant { .. } => "legacy_role_grant",
            Request::LegacyRoleRevoke { .. } => "legacy_role_revoke",
            Request::ChannelSet { .. } => "channel_set",
            Request::SettingSet { .. } => "setting_set",
            Request::RefreshPanel { .. } => "refresh_panel",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Success {
        data: serde_json::Value,
    },
    Error {
        message: String,
        code: i32,
        class: ErrorClass,
    },
}

impl Response {
    pub fn success(data: serde_json::Value) -> Self {
        Response::Success { data }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}

impl From<&TicketError> for Response {
    fn from(err: &TicketError) -> Self {
        Response::Error {
            message: err.to_string(),
            code: err.code(),
            class: err.class(),
        }
    }
}
