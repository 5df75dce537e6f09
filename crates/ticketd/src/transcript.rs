//! Transcript export for closed tickets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use ticket_common::{ArchiveError, TicketRecord};

use crate::transport::Message;

/// Reference to an exported transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    pub path: PathBuf,
    pub file_name: String,
}

#[async_trait]
pub trait TranscriptExporter: Send + Sync {
    /// Export `messages` (oldest first) together with the closed record
    async fn export(&self, messages: &[Message], record: &TicketRecord) -> Result<ArchiveHandle, ArchiveError>;
}

/// Writes one self-contained HTML file per closed ticket
pub struct HtmlTranscriptExporter {
    dir: PathBuf,
}

impl HtmlTranscriptExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete exported transcripts last modified more than `max_age` ago.
    /// Returns how many files were removed.
    pub fn cleanup_older_than(&self, max_age: Duration) -> Result<usize, ArchiveError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!("Cleaned up old transcript: {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl TranscriptExporter for HtmlTranscriptExporter {
    async fn export(&self, messages: &[Message], record: &TicketRecord) -> Result<ArchiveHandle, ArchiveError> {
        let html = render_html(messages, record, Utc::now());
        let file_name = format!(
            "transcript-{}-{}.html",
            file_safe(&record.channel_name),
            Utc::now().timestamp_millis()
        );
        let path = self.dir.join(&file_name);

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, html).await?;
        Ok(ArchiveHandle { path, file_name })
    }
}

/// Channel names come from user display names; keep only `[A-Za-z0-9._-]`
/// so the name can never leave the transcripts directory.
pub fn file_safe(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match safe.trim_start_matches('.') {
        "" => "ticket".to_string(),
        _ => safe,
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

fn stamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

const STYLE: &str = r#"
body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 0; padding: 20px; background-color: #36393f; color: #dcddde; }
.header, .messages, .footer { background-color: #2f3136; padding: 20px; border-radius: 8px; margin-bottom: 20px; }
.header { border-left: 4px solid #7289da; }
.ticket-info { display: grid; grid-template-columns: 1fr 1fr; gap: 10px; }
.info-item { background-color: #40444b; padding: 10px; border-radius: 4px; }
.info-label { font-weight: bold; color: #7289da; font-size: 0.9em; }
.message { margin-bottom: 15px; padding: 10px; background-color: #40444b; border-radius: 4px; border-left: 3px solid #7289da; }
.username { font-weight: bold; color: #7289da; }
.timestamp { color: #72767d; font-size: 0.8em; margin-left: 10px; }
.embed, .attachment { background-color: #2f3136; padding: 10px; margin: 10px 0; border-radius: 4px; }
.embed { border-left: 4px solid #7289da; }
.embed-title, .attachment-name { font-weight: bold; color: #7289da; }
.footer { text-align: center; color: #72767d; }
"#;

fn info_item(html: &mut String, label: &str, value: &str) {
    let _ = write!(
        html,
        "<div class=\"info-item\"><div class=\"info-label\">{}</div><div class=\"info-value\">{}</div></div>",
        label,
        escape_html(value)
    );
}

/// Render the transcript document
pub fn render_html(messages: &[Message], record: &TicketRecord, generated_at: DateTime<Utc>) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<title>Ticket Transcript - {}</title>\n<style>{}</style>\n</head>\n<body>\n",
        escape_html(&record.channel_name),
        STYLE
    );

    html.push_str("<div class=\"header\">\n<h1>Ticket Transcript</h1>\n<div class=\"ticket-info\">");
    info_item(&mut html, "Channel Name", &record.channel_name);
    info_item(&mut html, "Category", &record.category);
    info_item(
        &mut html,
        "Created By",
        &format!("{} ({})", record.created_by_tag, record.created_by),
    );
    info_item(&mut html, "Closed By", record.closed_by_tag.as_deref().unwrap_or("N/A"));
    info_item(&mut html, "Created At", &stamp(&record.created_at));
    info_item(
        &mut html,
        "Closed At",
        &record.closed_at.as_ref().map(stamp).unwrap_or_else(|| "N/A".to_string()),
    );
    info_item(&mut html, "Reason", record.close_reason.as_deref().unwrap_or("N/A"));
    html.push_str("</div>\n</div>\n<div class=\"messages\">\n<h2>Messages</h2>\n");

    for message in messages {
        let _ = write!(
            html,
            "<div class=\"message\"><div class=\"message-header\"><span class=\"username\">{}</span><span class=\"timestamp\">{}</span></div><div class=\"message-content\">",
            escape_html(&message.author_name),
            stamp(&message.created_at)
        );
        if !message.content.is_empty() {
            let _ = write!(html, "<div>{}</div>", escape_html(&message.content));
        }
        for embed in &message.embeds {
            html.push_str("<div class=\"embed\">");
            if let Some(title) = &embed.title {
                let _ = write!(html, "<div class=\"embed-title\">{}</div>", escape_html(title));
            }
            if let Some(description) = &embed.description {
                let _ = write!(
                    html,
                    "<div class=\"embed-description\">{}</div>",
                    escape_html(description)
                );
            }
            html.push_str("</div>");
        }
        for attachment in &message.attachments {
            let _ = write!(
                html,
                "<div class=\"attachment\"><div class=\"attachment-name\">📎 {}</div><div>{}</div></div>",
                escape_html(&attachment.name),
                escape_html(&attachment.url)
            );
        }
        html.push_str("</div></div>\n");
    }

    let _ = write!(
        html,
        "</div>\n<div class=\"footer\"><p>Transcript generated on {}</p></div>\n</body>\n</html>\n",
        stamp(&generated_at)
    );
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Attachment, Embed};
    use tempfile::tempdir;
    use ticket_common::{Actor, Closure};

    fn closed_record() -> TicketRecord {
        let mut record = TicketRecord::open("c1", "ticket-una", "Billing", &Actor::new("1", "una"));
        record.stamp(Closure::by(&Actor::new("2", "sam").with_tag("sam#2"), Some("fixed")));
        record
    }

    fn message(content: &str) -> Message {
        Message {
            id: "m1".into(),
            author_id: "1".into(),
            author_name: "una".into(),
            content: content.into(),
            embeds: vec![Embed::titled("🎫 Ticket: Billing").description("desc")],
            components: vec![],
            attachments: vec![Attachment {
                name: "log.txt".into(),
                url: "https://cdn/log.txt".into(),
            }],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#039;y&#039;&lt;/b&gt;");
    }

    #[test]
    fn test_render_includes_metadata_and_messages() {
        let html = render_html(&[message("<script>hi</script>")], &closed_record(), Utc::now());
        assert!(html.contains("ticket-una"));
        assert!(html.contains("sam#2"));
        assert!(html.contains("fixed"));
        assert!(html.contains("&lt;script&gt;hi&lt;/script&gt;"));
        assert!(!html.contains("<script>hi"));
        assert!(html.contains("📎 log.txt"));
        assert!(html.contains("🎫 Ticket: Billing"));
    }

    #[tokio::test]
    async fn test_export_writes_named_file() {
        let dir = tempdir().unwrap();
        let exporter = HtmlTranscriptExporter::new(dir.path().join("transcripts"));
        let handle = exporter.export(&[message("hello")], &closed_record()).await.unwrap();
        assert!(handle.file_name.starts_with("transcript-ticket-una-"));
        assert!(handle.file_name.ends_with(".html"));
        let body = fs::read_to_string(&handle.path).unwrap();
        assert!(body.contains("hello"));
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("ticket-una/ops"), "ticket-una_ops");
        assert_eq!(file_safe("ticket-ünä ok"), "ticket-_n__ok");
        assert_eq!(file_safe(".."), "ticket");
    }

    #[tokio::test]
    async fn test_export_with_slash_in_channel_name() {
        let dir = tempdir().unwrap();
        let transcripts = dir.path().join("transcripts");
        let exporter = HtmlTranscriptExporter::new(&transcripts);
        let record = TicketRecord::open("c2", "ticket-una/ops", "Billing", &Actor::new("10", "una/ops"));

        let handle = exporter.export(&[message("hello")], &record).await.unwrap();
        assert!(handle.file_name.starts_with("transcript-ticket-una_ops-"));
        assert_eq!(handle.path.parent(), Some(transcripts.as_path()));
        assert!(handle.path.exists());
    }

    #[test]
    fn test_cleanup_keeps_recent_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("transcript-a-1.html"), "x").unwrap();
        let exporter = HtmlTranscriptExporter::new(dir.path());
        assert_eq!(exporter.cleanup_older_than(Duration::from_secs(3600)).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(exporter.cleanup_older_than(Duration::ZERO).unwrap(), 1);
    }
}
