//! Chat-platform transport boundary.
//!
//! The engine never talks to a platform directly. It computes channel
//! specs, overwrite patches and outgoing messages, and hands them to a
//! `Transport`. Platform adapters implement the trait; `MemoryTransport`
//! implements it in-process for tests and sandbox runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use ticket_common::{ChannelId, MessageId, RoleId, TransportError, UserId};

/// Who a permission overwrite applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OverwriteTarget {
    /// The server-wide default role
    Everyone,
    Role(RoleId),
    Member(UserId),
}

impl std::fmt::Display for OverwriteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverwriteTarget::Everyone => write!(f, "@everyone"),
            OverwriteTarget::Role(id) => write!(f, "role {}", id),
            OverwriteTarget::Member(id) => write!(f, "member {}", id),
        }
    }
}

/// Tri-state permission edit. `None` leaves the current value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPatch {
    pub view: Option<bool>,
    pub send: Option<bool>,
    pub read_history: Option<bool>,
}

impl PermissionPatch {
    /// View, send and read history
    pub fn participant() -> Self {
        Self {
            view: Some(true),
            send: Some(true),
            read_history: Some(true),
        }
    }

    pub fn hidden() -> Self {
        Self {
            view: Some(false),
            ..Self::default()
        }
    }

    pub fn send(allowed: bool) -> Self {
        Self {
            send: Some(allowed),
            ..Self::default()
        }
    }

    /// Layer `other` on top of `self`
    pub fn merge(self, other: PermissionPatch) -> Self {
        Self {
            view: other.view.or(self.view),
            send: other.send.or(self.send),
            read_history: other.read_history.or(self.read_history),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub patch: PermissionPatch,
}

impl Overwrite {
    pub fn new(target: OverwriteTarget, patch: PermissionPatch) -> Self {
        Self { target, patch }
    }
}

/// Everything needed to open a ticket channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub topic: String,
    /// Container the channel is created under
    pub parent: ChannelId,
    pub overwrites: Vec<Overwrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub topic: Option<String>,
    pub parent: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    pub description: String,
    pub emoji: Option<String>,
}

/// Interactive control attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    Button {
        custom_id: String,
        label: String,
        style: ButtonStyle,
        emoji: Option<String>,
    },
    Select {
        custom_id: String,
        placeholder: String,
        options: Vec<SelectOption>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// Message content handed to the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub components: Vec<Component>,
    /// Local files to upload alongside the message
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl OutgoingMessage {
    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }
}

/// A message as observed on the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn first_embed_title(&self) -> Option<&str> {
        self.embeds.first().and_then(|e| e.title.as_deref())
    }
}

/// Operations the engine needs from a chat platform
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether a channel container (storage location) exists
    async fn container_exists(&self, container: &str) -> Result<bool, TransportError>;

    async fn channel_exists(&self, channel: &str) -> Result<bool, TransportError>;

    /// Create a text channel with its initial overwrites
    async fn create_channel(&self, spec: ChannelSpec) -> Result<ChannelInfo, TransportError>;

    async fn edit_overwrite(
        &self,
        channel: &str,
        target: &OverwriteTarget,
        patch: PermissionPatch,
    ) -> Result<(), TransportError>;

    async fn send_message(
        &self,
        channel: &str,
        message: OutgoingMessage,
    ) -> Result<MessageId, TransportError>;

    /// Replace the content of an existing message
    async fn edit_message(
        &self,
        channel: &str,
        message_id: &str,
        message: OutgoingMessage,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<(), TransportError>;

    async fn fetch_message(&self, channel: &str, message_id: &str) -> Result<Message, TransportError>;

    /// Most recent messages, newest first
    async fn fetch_messages(&self, channel: &str, limit: usize) -> Result<Vec<Message>, TransportError>;

    /// Channels under a container
    async fn list_channels(&self, container: &str) -> Result<Vec<ChannelInfo>, TransportError>;

    async fn delete_channel(&self, channel: &str) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_merge_prefers_later() {
        let merged = PermissionPatch::participant().merge(PermissionPatch::send(false));
        assert_eq!(merged.view, Some(true));
        assert_eq!(merged.send, Some(false));
        assert_eq!(merged.read_history, Some(true));
    }

    #[test]
    fn test_hidden_only_touches_view() {
        let patch = PermissionPatch::hidden();
        assert_eq!(patch.view, Some(false));
        assert!(patch.send.is_none());
        assert!(patch.read_history.is_none());
    }

    #[test]
    fn test_overwrite_target_display() {
        assert_eq!(OverwriteTarget::Role("7".into()).to_string(), "role 7");
        assert_eq!(OverwriteTarget::Everyone.to_string(), "@everyone");
    }
}
