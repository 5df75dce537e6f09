//! Ticket records and the actors that act on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChannelId, RoleId, UserId};

/// Reason recorded when a close request carries none
pub const DEFAULT_CLOSE_REASON: &str = "No reason provided";

/// Topic string written on a ticket channel
pub fn ticket_topic(creator_tag: &str, creator_id: &str, category: &str) -> String {
    format!(
        "Ticket created by {} ({}) - Category: {}",
        creator_tag, creator_id, category
    )
}

/// Whoever issued an intent, with the role memberships it was issued under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    /// Account name, used for channel names
    pub name: String,
    /// Display tag, used in topics, notices and transcripts
    pub tag: String,
    #[serde(default)]
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub is_admin: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        Self {
            tag: name.clone(),
            id,
            name,
            roles: Vec::new(),
            is_admin: false,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Close metadata stamped onto a record as it leaves the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    pub closed_by: UserId,
    pub closed_by_tag: String,
    pub closed_at: DateTime<Utc>,
    pub reason: String,
}

impl Closure {
    pub fn by(actor: &Actor, reason: Option<&str>) -> Self {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_CLOSE_REASON);
        Self {
            closed_by: actor.id.clone(),
            closed_by_tag: actor.tag.clone(),
            closed_at: Utc::now(),
            reason: reason.to_string(),
        }
    }
}

/// One open ticket, keyed by the identity of its channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub channel_id: ChannelId,
    pub channel_name: String,
    /// Name of the category; may dangle if the category is later removed
    pub category: String,
    pub created_by: UserId,
    pub created_by_tag: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
}

impl TicketRecord {
    pub fn open(
        channel_id: impl Into<String>,
        channel_name: impl Into<String>,
        category: impl Into<String>,
        creator: &Actor,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            channel_name: channel_name.into(),
            category: category.into(),
            created_by: creator.id.clone(),
            created_by_tag: creator.tag.clone(),
            created_at: Utc::now(),
            closed_by: None,
            closed_by_tag: None,
            closed_at: None,
            close_reason: None,
        }
    }

    pub fn stamp(&mut self, closure: Closure) {
        self.closed_by = Some(closure.closed_by);
        self.closed_by_tag = Some(closure.closed_by_tag);
        self.closed_at = Some(closure.closed_at);
        self.close_reason = Some(closure.reason);
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Topic string written on the ticket channel
    pub fn topic(&self) -> String {
        ticket_topic(&self.created_by_tag, &self.created_by, &self.category)
    }
}

/// A record together with its current claimant, as listed to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketView {
    pub record: TicketRecord,
    pub claimed_by: Option<UserId>,
}
