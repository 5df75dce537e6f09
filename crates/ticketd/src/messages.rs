//! Notification content posted by the engine.

use chrono::Utc;
use std::path::Path;

use ticket_common::category::DEFAULT_COLOR;
use ticket_common::{Actor, Category, RoleId, TicketRecord};

use crate::transport::{ButtonStyle, Component, Embed, Message, OutgoingMessage};

/// Custom id of the claim toggle on a ticket's welcome message
pub const CLAIM_TOGGLE_ID: &str = "claim_ticket";

/// Marker in the welcome embed title, used to find the message again
pub const TICKET_TITLE_MARKER: &str = "Ticket:";

/// How many recent messages are searched for the welcome message
pub const TICKET_MESSAGE_SEARCH_DEPTH: usize = 10;

const CLAIMED_COLOR: &str = "#00ff00";
const UNCLAIMED_COLOR: &str = "#ff9900";
const TRANSCRIPT_COLOR: &str = "#ff0000";

pub fn claim_toggle(claimed: bool) -> Component {
    let (label, style) = if claimed {
        ("Unclaim Ticket", ButtonStyle::Secondary)
    } else {
        ("Claim Ticket", ButtonStyle::Primary)
    };
    Component::Button {
        custom_id: CLAIM_TOGGLE_ID.to_string(),
        label: label.to_string(),
        style,
        emoji: Some("👤".to_string()),
    }
}

/// Role mentions followed by the welcome line
pub fn welcome_text(pings: &[RoleId], creator: &Actor) -> String {
    let mentions: Vec<String> = pings.iter().map(|id| format!("<@&{}>", id)).collect();
    format!(
        "{}\nWelcome {}! A staff member will be with you shortly.",
        mentions.join(" "),
        creator.mention()
    )
}

/// First message of a new ticket channel
pub fn welcome(record: &TicketRecord, category: &Category, creator: &Actor, pings: &[RoleId]) -> OutgoingMessage {
    let color = if category.color.is_empty() {
        DEFAULT_COLOR
    } else {
        category.color.as_str()
    };
    let embed = Embed::titled(format!("🎫 Ticket: {}", category.name))
        .description(format!(
            "**Category:** {}\n**Description:** {}\n**Created by:** {}",
            category.name, category.description, creator.tag
        ))
        .color(color)
        .footer(format!("Ticket ID: {}", record.channel_id))
        .timestamp(record.created_at);

    OutgoingMessage {
        content: Some(welcome_text(pings, creator)),
        embeds: vec![embed],
        components: vec![claim_toggle(false)],
        files: Vec::new(),
    }
}

/// Toggle-only edit of the welcome message
pub fn toggle_edit(claimed: bool) -> OutgoingMessage {
    OutgoingMessage {
        components: vec![claim_toggle(claimed)],
        ..OutgoingMessage::default()
    }
}

pub fn claimed_notice(claimant: &Actor) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::titled("✅ Ticket Claimed")
            .description(format!("This ticket has been claimed by {}", claimant.tag))
            .color(CLAIMED_COLOR)
            .timestamp(Utc::now()),
    )
}

pub fn unclaimed_notice(actor: &Actor) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::titled("❌ Ticket Unclaimed")
            .description(format!("This ticket has been unclaimed by {}", actor.tag))
            .color(UNCLAIMED_COLOR)
            .timestamp(Utc::now()),
    )
}

/// Summary posted to the archive destination, with the transcript attached
pub fn transcript_summary(record: &TicketRecord, artifact: &Path) -> OutgoingMessage {
    let description = format!(
        "**Channel:** {}\n**Category:** {}\n**Created by:** {}\n**Closed by:** {}\n**Reason:** {}",
        record.channel_name,
        record.category,
        record.created_by_tag,
        record.closed_by_tag.as_deref().unwrap_or("unknown"),
        record.close_reason.as_deref().unwrap_or(ticket_common::ticket::DEFAULT_CLOSE_REASON),
    );
    OutgoingMessage {
        content: None,
        embeds: vec![Embed::titled("📄 Ticket Transcript")
            .description(description)
            .color(TRANSCRIPT_COLOR)
            .timestamp(Utc::now())],
        components: Vec::new(),
        files: vec![artifact.to_path_buf()],
    }
}

/// Find the welcome message among recent messages (newest first)
pub fn find_ticket_message(recent: &[Message]) -> Option<&Message> {
    recent.iter().find(|m| {
        m.first_embed_title()
            .map(|t| t.contains(TICKET_TITLE_MARKER))
            .unwrap_or(false)
    })
}
