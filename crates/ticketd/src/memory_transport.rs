//! In-process transport over a simulated guild.
//!
//! Keeps containers, channels (topic, overwrites, messages) and a journal
//! of every applied call. Failures can be injected per operation kind.
//! Used by the test suites and by `ticketd --sandbox`.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use ticket_common::{ChannelId, MessageId, TransportError, UserId};

use crate::transport::{
    ChannelInfo, ChannelSpec, Message, OutgoingMessage, OverwriteTarget, PermissionPatch,
    Transport,
};

/// Kinds of transport call, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ContainerExists,
    ChannelExists,
    CreateChannel,
    EditOverwrite,
    SendMessage,
    EditMessage,
    DeleteMessage,
    FetchMessage,
    FetchMessages,
    ListChannels,
    DeleteChannel,
}

/// One applied (successful) mutating call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum JournalEntry {
    ChannelCreated {
        channel: ChannelId,
        name: String,
    },
    OverwriteEdited {
        channel: ChannelId,
        target: OverwriteTarget,
        patch: PermissionPatch,
    },
    MessageSent {
        channel: ChannelId,
        message: MessageId,
    },
    MessageEdited {
        channel: ChannelId,
        message: MessageId,
    },
    MessageDeleted {
        channel: ChannelId,
        message: MessageId,
    },
    ChannelDeleted {
        channel: ChannelId,
    },
}

struct MemoryChannel {
    info: ChannelInfo,
    overwrites: HashMap<OverwriteTarget, PermissionPatch>,
    messages: Vec<Message>,
}

struct Guild {
    next_id: u64,
    containers: HashSet<ChannelId>,
    channels: HashMap<ChannelId, MemoryChannel>,
    journal: Vec<JournalEntry>,
    failures: HashMap<Operation, TransportError>,
}

impl Guild {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn check(&self, op: Operation) -> Result<(), TransportError> {
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn channel_mut(&mut self, id: &str) -> Result<&mut MemoryChannel, TransportError> {
        self.channels
            .get_mut(id)
            .ok_or_else(|| TransportError::NotFound(format!("channel {}", id)))
    }

    fn channel(&self, id: &str) -> Result<&MemoryChannel, TransportError> {
        self.channels
            .get(id)
            .ok_or_else(|| TransportError::NotFound(format!("channel {}", id)))
    }
}

pub struct MemoryTransport {
    bot_id: UserId,
    guild: Mutex<Guild>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            bot_id: "1".to_string(),
            guild: Mutex::new(Guild {
                next_id: 1000,
                containers: HashSet::new(),
                channels: HashMap::new(),
                journal: Vec::new(),
                failures: HashMap::new(),
            }),
        }
    }

    fn guild(&self) -> MutexGuard<'_, Guild> {
        self.guild.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identity messages sent through this transport are authored by
    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Add a channel container and return its id
    pub fn add_container(&self) -> ChannelId {
        let mut guild = self.guild();
        let id = guild.next_id();
        guild.containers.insert(id.clone());
        id
    }

    /// Add a container under a known id, such as the one already recorded
    /// in the ticket configuration
    pub fn add_container_with_id(&self, id: &str) {
        let mut guild = self.guild();
        if let Ok(n) = id.parse::<u64>() {
            guild.next_id = guild.next_id.max(n);
        }
        guild.containers.insert(id.to_string());
    }

    /// Add a plain text channel (panel or transcript destination)
    pub fn add_text_channel(&self, name: &str) -> ChannelId {
        self.insert_channel(name, None, None)
    }

    /// Add a channel as if it had been created before the daemon started
    pub fn add_existing_channel(&self, container: &str, name: &str, topic: Option<&str>) -> ChannelId {
        self.insert_channel(name, topic.map(str::to_string), Some(container.to_string()))
    }

    fn insert_channel(&self, name: &str, topic: Option<String>, parent: Option<ChannelId>) -> ChannelId {
        let mut guild = self.guild();
        let id = guild.next_id();
        guild.channels.insert(
            id.clone(),
            MemoryChannel {
                info: ChannelInfo {
                    id: id.clone(),
                    name: name.to_string(),
                    topic,
                    parent,
                },
                overwrites: HashMap::new(),
                messages: Vec::new(),
            },
        );
        id
    }

    /// Post a message authored by a user rather than the bot
    pub fn post_as(
        &self,
        channel: &str,
        author_id: &str,
        author_name: &str,
        content: &str,
    ) -> Result<MessageId, TransportError> {
        let mut guild = self.guild();
        let id = guild.next_id();
        let target = guild.channel_mut(channel)?;
        target.messages.push(Message {
            id: id.clone(),
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            content: content.to_string(),
            embeds: Vec::new(),
            components: Vec::new(),
            attachments: Vec::new(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    /// Make every call of `op` fail with `err` until `recover` is called
    pub fn fail_on(&self, op: Operation, err: TransportError) {
        self.guild().failures.insert(op, err);
    }

    pub fn recover(&self, op: Operation) {
        self.guild().failures.remove(&op);
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.guild().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.guild().journal.clear();
    }

    pub fn channel_info(&self, channel: &str) -> Option<ChannelInfo> {
        self.guild().channels.get(channel).map(|c| c.info.clone())
    }

    /// Current overwrite for one target on a channel
    pub fn overwrite(&self, channel: &str, target: &OverwriteTarget) -> Option<PermissionPatch> {
        self.guild()
            .channels
            .get(channel)
            .and_then(|c| c.overwrites.get(target).copied())
    }

    /// All messages of a channel, oldest first
    pub fn messages(&self, channel: &str) -> Vec<Message> {
        self.guild()
            .channels
            .get(channel)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.guild().channels.len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn container_exists(&self, container: &str) -> Result<bool, TransportError> {
        let guild = self.guild();
        guild.check(Operation::ContainerExists)?;
        Ok(guild.containers.contains(container))
    }

    async fn channel_exists(&self, channel: &str) -> Result<bool, TransportError> {
        let guild = self.guild();
        guild.check(Operation::ChannelExists)?;
        Ok(guild.channels.contains_key(channel))
    }

    async fn create_channel(&self, spec: ChannelSpec) -> Result<ChannelInfo, TransportError> {
        let mut guild = self.guild();
        guild.check(Operation::CreateChannel)?;
        if !guild.containers.contains(&spec.parent) {
            return Err(TransportError::NotFound(format!("container {}", spec.parent)));
        }

        let id = guild.next_id();
        let info = ChannelInfo {
            id: id.clone(),
            name: spec.name.clone(),
            topic: Some(spec.topic),
            parent: Some(spec.parent),
        };
        let mut overwrites: HashMap<OverwriteTarget, PermissionPatch> = HashMap::new();
        for ow in spec.overwrites {
            let current = overwrites.remove(&ow.target).unwrap_or_default();
            overwrites.insert(ow.target, current.merge(ow.patch));
        }
        guild.channels.insert(
            id.clone(),
            MemoryChannel {
                info: info.clone(),
                overwrites,
                messages: Vec::new(),
            },
        );
        guild.journal.push(JournalEntry::ChannelCreated {
            channel: id,
            name: spec.name,
        });
        debug!("memory transport: created channel {}", info.id);
        Ok(info)
    }

    async fn edit_overwrite(
        &self,
        channel: &str,
        target: &OverwriteTarget,
        patch: PermissionPatch,
    ) -> Result<(), TransportError> {
        let mut guild = self.guild();
        guild.check(Operation::EditOverwrite)?;
        let ch = guild.channel_mut(channel)?;
        let current = ch.overwrites.get(target).copied().unwrap_or_default();
        ch.overwrites.insert(target.clone(), current.merge(patch));
        guild.journal.push(JournalEntry::OverwriteEdited {
            channel: channel.to_string(),
            target: target.clone(),
            patch,
        });
        Ok(())
    }

    async fn send_message(
        &self,
        channel: &str,
        message: OutgoingMessage,
    ) -> Result<MessageId, TransportError> {
        let mut guild = self.guild();
        guild.check(Operation::SendMessage)?;
        let id = guild.next_id();
        let bot_id = self.bot_id.clone();
        let ch = guild.channel_mut(channel)?;
        ch.messages.push(Message {
            id: id.clone(),
            author_id: bot_id,
            author_name: "Ticket Desk".to_string(),
            content: message.content.unwrap_or_default(),
            embeds: message.embeds,
            components: message.components,
            attachments: message
                .files
                .iter()
                .map(|path| crate::transport::Attachment {
                    name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    url: format!("file://{}", path.display()),
                })
                .collect(),
            created_at: Utc::now(),
        });
        guild.journal.push(JournalEntry::MessageSent {
            channel: channel.to_string(),
            message: id.clone(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: &str,
        message_id: &str,
        message: OutgoingMessage,
    ) -> Result<(), TransportError> {
        let mut guild = self.guild();
        guild.check(Operation::EditMessage)?;
        let ch = guild.channel_mut(channel)?;
        let existing = ch
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| TransportError::NotFound(format!("message {}", message_id)))?;
        if let Some(content) = message.content {
            existing.content = content;
        }
        if !message.embeds.is_empty() {
            existing.embeds = message.embeds;
        }
        existing.components = message.components;
        guild.journal.push(JournalEntry::MessageEdited {
            channel: channel.to_string(),
            message: message_id.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<(), TransportError> {
        let mut guild = self.guild();
        guild.check(Operation::DeleteMessage)?;
        let ch = guild.channel_mut(channel)?;
        let before = ch.messages.len();
        ch.messages.retain(|m| m.id != message_id);
        if ch.messages.len() == before {
            return Err(TransportError::NotFound(format!("message {}", message_id)));
        }
        guild.journal.push(JournalEntry::MessageDeleted {
            channel: channel.to_string(),
            message: message_id.to_string(),
        });
        Ok(())
    }

    async fn fetch_message(&self, channel: &str, message_id: &str) -> Result<Message, TransportError> {
        let guild = self.guild();
        guild.check(Operation::FetchMessage)?;
        guild
            .channel(channel)?
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("message {}", message_id)))
    }

    async fn fetch_messages(&self, channel: &str, limit: usize) -> Result<Vec<Message>, TransportError> {
        let guild = self.guild();
        guild.check(Operation::FetchMessages)?;
        Ok(guild
            .channel(channel)?
            .messages
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_channels(&self, container: &str) -> Result<Vec<ChannelInfo>, TransportError> {
        let guild = self.guild();
        guild.check(Operation::ListChannels)?;
        if !guild.containers.contains(container) {
            return Err(TransportError::NotFound(format!("container {}", container)));
        }
        let mut channels: Vec<ChannelInfo> = guild
            .channels
            .values()
            .filter(|c| c.info.parent.as_deref() == Some(container))
            .map(|c| c.info.clone())
            .collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(channels)
    }

    async fn delete_channel(&self, channel: &str) -> Result<(), TransportError> {
        let mut guild = self.guild();
        guild.check(Operation::DeleteChannel)?;
        if guild.channels.remove(channel).is_none() {
            return Err(TransportError::NotFound(format!("channel {}", channel)));
        }
        guild.journal.push(JournalEntry::ChannelDeleted {
            channel: channel.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Embed, Overwrite};

    #[tokio::test]
    async fn test_create_channel_requires_container() {
        let transport = MemoryTransport::new();
        let spec = ChannelSpec {
            name: "ticket-a".into(),
            topic: "t".into(),
            parent: "missing".into(),
            overwrites: vec![],
        };
        let err = transport.create_channel(spec).await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_container_with_known_id_keeps_ids_unique() {
        let transport = MemoryTransport::new();
        transport.add_container_with_id("7");
        assert!(transport.container_exists("7").await.unwrap());

        let channel = transport.add_existing_channel("7", "ticket-una", None);
        assert_eq!(channel, "8");
        assert_eq!(transport.add_container(), "9");
    }

    #[tokio::test]
    async fn test_overwrites_merge_per_target() {
        let transport = MemoryTransport::new();
        let container = transport.add_container();
        let info = transport
            .create_channel(ChannelSpec {
                name: "ticket-a".into(),
                topic: "t".into(),
                parent: container,
                overwrites: vec![Overwrite::new(
                    OverwriteTarget::Role("R".into()),
                    PermissionPatch::participant(),
                )],
            })
            .await
            .unwrap();

        let role = OverwriteTarget::Role("R".into());
        transport
            .edit_overwrite(&info.id, &role, PermissionPatch::send(false))
            .await
            .unwrap();
        let current = transport.overwrite(&info.id, &role).unwrap();
        assert_eq!(current.view, Some(true));
        assert_eq!(current.send, Some(false));
    }

    #[tokio::test]
    async fn test_fetch_messages_newest_first() {
        let transport = MemoryTransport::new();
        let channel = transport.add_text_channel("general");
        transport.post_as(&channel, "9", "una", "first").unwrap();
        transport
            .send_message(&channel, OutgoingMessage::embed(Embed::titled("second")))
            .await
            .unwrap();
        let messages = transport.fetch_messages(&channel, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].first_embed_title(), Some("second"));
        assert_eq!(messages[1].content, "first");
    }

    #[tokio::test]
    async fn test_injected_failure_until_recovered() {
        let transport = MemoryTransport::new();
        let channel = transport.add_text_channel("general");
        transport.fail_on(Operation::SendMessage, TransportError::Unavailable("down".into()));
        assert!(transport
            .send_message(&channel, OutgoingMessage::default())
            .await
            .is_err());
        transport.recover(Operation::SendMessage);
        assert!(transport
            .send_message(&channel, OutgoingMessage::default())
            .await
            .is_ok());
        assert_eq!(transport.journal().len(), 1);
    }
}
