//! Panel synchronizer: the single category-picker message.
//!
//! Rendering is a pure function of the category list, so `update()` can be
//! called after any configuration change without tracking what changed.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ticket_common::category::DEFAULT_COLOR;
use ticket_common::{Category, ChannelId, ConfigStore, MessageId, TicketError, TicketResult, TransportError};

use crate::transport::{Component, Embed, Message, OutgoingMessage, SelectOption, Transport};

pub const PANEL_TITLE: &str = "🎫 Support Tickets";
pub const PANEL_PROMPT: &str =
    "Select a category below to create a support ticket. Our staff will assist you as soon as possible.";
pub const PANEL_EMPTY: &str = "No ticket categories configured. Please set up categories first.";
pub const PANEL_SELECT_ID: &str = "ticket_category_select";

const PANEL_EMPTY_COLOR: &str = "#ff0000";

/// Result of an in-place panel update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "panel", rename_all = "snake_case")]
pub enum PanelUpdate {
    /// Rendered with one option per category
    Updated { categories: usize },
    /// Rendered the "no categories" placeholder
    Placeholder,
}

/// Canonical panel content for `categories`
pub fn render(categories: &[Category]) -> OutgoingMessage {
    if categories.is_empty() {
        return OutgoingMessage {
            embeds: vec![Embed::titled(PANEL_TITLE)
                .description(PANEL_EMPTY)
                .color(PANEL_EMPTY_COLOR)],
            ..OutgoingMessage::default()
        };
    }

    let options = categories
        .iter()
        .map(|c| SelectOption {
            label: c.name.clone(),
            value: c.name.clone(),
            description: c.description.clone(),
            emoji: Some(c.emoji.clone()),
        })
        .collect();

    OutgoingMessage {
        content: None,
        embeds: vec![Embed::titled(PANEL_TITLE)
            .description(PANEL_PROMPT)
            .color(DEFAULT_COLOR)],
        components: vec![Component::Select {
            custom_id: PANEL_SELECT_ID.to_string(),
            placeholder: "Choose a ticket category...".to_string(),
            options,
        }],
        files: Vec::new(),
    }
}

pub struct PanelSynchronizer {
    config: Arc<ConfigStore>,
    transport: Arc<dyn Transport>,
}

impl PanelSynchronizer {
    pub fn new(config: Arc<ConfigStore>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Post a fresh panel to `destination` and record its identity
    pub async fn create(&self, destination: &str) -> TicketResult<MessageId> {
        let categories = self.config.categories();
        if categories.is_empty() {
            return Err(TicketError::NoCategories);
        }

        let message_id = self
            .transport
            .send_message(destination, render(&categories))
            .await?;
        let channel: ChannelId = destination.to_string();
        let recorded = message_id.clone();
        self.config.update_channels(move |c| {
            c.ticket_panel_channel = Some(channel);
            c.ticket_panel_message = Some(recorded);
        })?;
        info!("Panel created in {} as message {}", destination, message_id);
        Ok(message_id)
    }

    /// Re-render the recorded panel in place
    pub async fn update(&self) -> TicketResult<PanelUpdate> {
        let config = self.config.snapshot();
        let (Some(channel), Some(message)) = (
            config.channels.ticket_panel_channel.as_deref(),
            config.channels.ticket_panel_message.as_deref(),
        ) else {
            return Err(TicketError::PanelMissing("is not set up.".to_string()));
        };

        let categories = &config.ticket_categories;
        match self
            .transport
            .edit_message(channel, message, render(categories))
            .await
        {
            Ok(()) => {}
            Err(TransportError::NotFound(what)) => {
                warn!("Panel message {} is gone: {}", message, what);
                return Err(TicketError::PanelMissing(format!("message {} was not found.", message)));
            }
            Err(e) => return Err(e.into()),
        }

        debug!("Panel {} updated with {} categories", message, categories.len());
        if categories.is_empty() {
            Ok(PanelUpdate::Placeholder)
        } else {
            Ok(PanelUpdate::Updated {
                categories: categories.len(),
            })
        }
    }

    /// Delete the recorded panel (best effort) and post a new one in the
    /// configured panel channel
    pub async fn refresh(&self) -> TicketResult<MessageId> {
        let channels = self.config.channels();
        let Some(channel) = channels.ticket_panel_channel else {
            return Err(TicketError::PanelMissing("channel is not configured.".to_string()));
        };
        if let Some(old) = channels.ticket_panel_message.as_deref() {
            self.discard(&channel, old).await;
        }
        self.create(&channel).await
    }

    /// Move the panel to `destination`, removing the old one
    pub async fn relocate(&self, destination: &str) -> TicketResult<MessageId> {
        if self.config.categories().is_empty() {
            return Err(TicketError::NoCategories);
        }
        let channels = self.config.channels();
        if let (Some(channel), Some(message)) = (
            channels.ticket_panel_channel.as_deref(),
            channels.ticket_panel_message.as_deref(),
        ) {
            self.discard(channel, message).await;
        }
        self.create(destination).await
    }

    async fn discard(&self, channel: &str, message: &str) {
        if let Err(e) = self.transport.delete_message(channel, message).await {
            debug!("Old panel message {} not deleted: {}", message, e);
        }
    }

    /// Whether `message` is our panel: recorded identity first, then the
    /// fixed title and prompt for panels whose identity was lost
    pub fn is_panel(&self, message: &Message) -> bool {
        let channels = self.config.channels();
        if channels.ticket_panel_message.as_deref() == Some(message.id.as_str()) {
            return true;
        }
        match message.embeds.first() {
            Some(embed) => {
                embed.title.as_deref() == Some(PANEL_TITLE)
                    && embed
                        .description
                        .as_deref()
                        .map(|d| d.contains("Select a category below to create a support ticket"))
                        .unwrap_or(false)
            }
            None => false,
        }
    }
}
