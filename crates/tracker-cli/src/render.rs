//! Plain-text rendering of the dashboard view

use chrono::{DateTime, Local, Utc};
use std::fmt::Write;
use tracker_core::{DashboardView, Message, NotificationKind};

const TITLE: &str = "Charlie Oakes Tracker";
const SUBTITLE: &str = "Communication Dashboard";

/// Format a timestamp in local time
fn format_time(received_at: &DateTime<Utc>) -> String {
    received_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// One list entry
pub fn render_message(message: &Message) -> String {
    let mut out = String::new();
    let marker = if message.is_read { " " } else { "*" };

    let _ = writeln!(
        out,
        "{} [{}] {}  ({})",
        marker,
        message.source.badge(),
        message.subject,
        message.id
    );
    let _ = writeln!(
        out,
        "    {}  {}",
        message.sender_display(),
        format_time(&message.received_at)
    );

    let preview = message.preview();
    if !preview.is_empty() {
        let _ = writeln!(out, "    {}", preview.replace('\n', " "));
    }
    let _ = writeln!(out, "    -> {}", message.toggle_label());
    out
}

/// The whole screen
pub fn render_view(view: &DashboardView) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{} - {}", TITLE, SUBTITLE);
    let _ = writeln!(
        out,
        "Status: {} | Source: {} | Search: {:?} | {} of {} shown, {} unread",
        view.filter.status.label(),
        view.filter.source.label(),
        view.filter.query,
        view.messages.len(),
        view.total,
        view.unread
    );
    if let Some(connection) = view.connection {
        let _ = writeln!(out, "Realtime: {}", connection);
    }
    let _ = writeln!(out);

    match view.placeholder() {
        Some(text) => {
            let _ = writeln!(out, "{}", text);
        }
        None => {
            for message in &view.messages {
                out.push_str(&render_message(message));
            }
        }
    }

    if !view.notifications.is_empty() {
        let _ = writeln!(out);
        for notification in &view.notifications {
            let tag = match notification.kind {
                NotificationKind::Info => "info",
                NotificationKind::Error => "ERROR",
            };
            let _ = writeln!(out, "[#{} {}] {}", notification.id, tag, notification.message);
        }
    }

    out
}
