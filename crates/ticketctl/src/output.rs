//! Output formatting for daemon responses

use owo_colors::OwoColorize;
use serde_json::Value;
use ticket_common::ipc::{Request, Response};

/// Render a response for the terminal. Returns false for error responses.
pub fn display(request: &Request, response: &Response) -> bool {
    match response {
        Response::Error { message, class, .. } => {
            eprintln!("{} {}", format!("[{}]", class).bright_red(), message);
            false
        }
        Response::Success { data } => {
            for line in summarize(request, data) {
                println!("{}", line);
            }
            for warning in warnings(data) {
                println!("{} {}", "[PARTIAL]".yellow(), warning);
            }
            if let Some(note) = data.get("panel_note").and_then(Value::as_str) {
                println!("{}", note.dimmed());
            }
            true
        }
    }
}

fn text(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string()
}

/// Side effects that failed after the state change committed
pub fn warnings(data: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let reports = [data.pointer("/report/failures"), data.pointer("/value/report/failures")];
    for failures in reports.into_iter().flatten() {
        for failure in failures.as_array().into_iter().flatten() {
            out.push(format!(
                "{} failed: {}",
                text(failure, "/action"),
                text(failure, "/error")
            ));
        }
    }
    if data.pointer("/archive/status").and_then(Value::as_str) == Some("failed") {
        out.push(format!("transcript export failed: {}", text(data, "/archive/error")));
    }
    out
}

/// Human summary of a successful response
pub fn summarize(request: &Request, data: &Value) -> Vec<String> {
    match request {
        Request::Ping => vec![format!(
            "{} ticketd {} ({} open tickets)",
            "[OK]".bright_green(),
            text(data, "/version"),
            data.get("open_tickets").and_then(Value::as_u64).unwrap_or(0)
        )],
        Request::Create { .. } | Request::SelectCategory { .. } => vec![format!(
            "{} Ticket created: {} ({}) in {}",
            "[OK]".bright_green(),
            text(data, "/record/channelName"),
            text(data, "/record/channelId").cyan(),
            text(data, "/record/category")
        )],
        Request::Claim { channel_id, .. } => {
            vec![format!("{} Claimed ticket {}", "[OK]".bright_green(), channel_id)]
        }
        Request::Unclaim { channel_id, .. } => {
            vec![format!("{} Unclaimed ticket {}", "[OK]".bright_green(), channel_id)]
        }
        Request::ToggleClaim { channel_id, .. } => {
            let action = text(data, "/action");
            vec![format!("{} Ticket {} {}", "[OK]".bright_green(), channel_id, action)]
        }
        Request::Close { .. } => {
            let mut lines = vec![format!(
                "{} Closed {} ({})",
                "[OK]".bright_green(),
                text(data, "/record/channelName"),
                text(data, "/record/closeReason")
            )];
            if data.pointer("/archive/status").and_then(Value::as_str) == Some("exported") {
                lines.push(format!("  Transcript: {}", text(data, "/archive/path")));
            }
            lines
        }
        Request::Tickets => tickets_table(data),
        Request::CategoryList { .. } => categories_table(data),
        Request::CategoryInfo { .. } => category_detail(data),
        _ => vec![format!("{} {}", "[OK]".bright_green(), request.name())],
    }
}

fn tickets_table(data: &Value) -> Vec<String> {
    let views = data.as_array().cloned().unwrap_or_default();
    if views.is_empty() {
        return vec!["No open tickets.".dimmed().to_string()];
    }
    let mut lines = vec![format!(
        "{:<20} {:<24} {:<20} {:<20} {}",
        "CHANNEL", "NAME", "CATEGORY", "CREATED BY", "CLAIMED BY"
    )
    .bold()
    .to_string()];
    for view in &views {
        let claimed = view
            .get("claimed_by")
            .and_then(Value::as_str)
            .unwrap_or("-");
        lines.push(format!(
            "{:<20} {:<24} {:<20} {:<20} {}",
            text(view, "/record/channelId"),
            text(view, "/record/channelName"),
            text(view, "/record/category"),
            text(view, "/record/createdByTag"),
            claimed
        ));
    }
    lines
}

fn categories_table(data: &Value) -> Vec<String> {
    let categories = data.as_array().cloned().unwrap_or_default();
    if categories.is_empty() {
        return vec!["No categories configured.".dimmed().to_string()];
    }
    categories
        .iter()
        .map(|c| {
            format!(
                "{} {} - {}",
                text(c, "/emoji"),
                text(c, "/name").bold(),
                text(c, "/description")
            )
        })
        .collect()
}

fn category_detail(data: &Value) -> Vec<String> {
    let mut lines = vec![
        format!("{} {}", text(data, "/emoji"), text(data, "/name").bold()),
        format!("  Description: {}", text(data, "/description")),
        format!("  Color: {}", text(data, "/color")),
    ];
    for set in ["access", "claim", "close", "persistent", "ping"] {
        let roles = data
            .pointer(&format!("/staffRoles/{}", set))
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            });
        let shown = match roles {
            Some(r) if r.is_empty() => "(none)".to_string(),
            Some(r) => r,
            None => "(unset)".to_string(),
        };
        lines.push(format!("  {:<11} {}", format!("{}:", set), shown));
    }
    lines
}
