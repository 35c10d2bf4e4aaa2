//! Notification rendering and transport-specific text helpers.

use crate::{domain::AlertKind, feed::FeedRecord};

pub const NO_DESCRIPTION: &str = "No description available";
pub const NO_DATE: &str = "N/A";
pub const NO_REFERENCES: &str = "No references available";

/// Render a record as a chat notification.
///
/// Bold spans use `**…**`; Discord renders these natively, the Telegram
/// adapter converts them with [`markdown_bold_to_html`].
pub fn render(record: &FeedRecord, kind: AlertKind) -> String {
    let description = record.description.as_deref().unwrap_or(NO_DESCRIPTION);
    let published = record.published_at.as_deref().unwrap_or(NO_DATE);
    let references = if record.references.is_empty() {
        NO_REFERENCES.to_string()
    } else {
        record.references.join("\n")
    };

    format!(
        "🚨 **{title}**\n\n\
         **ID:** {id}\n\
         **Description:** {description}\n\
         **Published Date:** {published}\n\
         **References:**\n\
         {references}\n\n\
         Stay vigilant! 🔒",
        title = kind.title(),
        id = record.id,
    )
}

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape `text` and turn `**bold**` spans into `<b>bold</b>`.
///
/// Works per line; an unmatched `**` is left as-is.
pub fn markdown_bold_to_html(text: &str) -> String {
    escape_html(text)
        .split('\n')
        .map(|line| replace_delimited(line, "**", "<b>", "</b>"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn replace_delimited(line: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        let Some(start) = rest.find(delim) else {
            out.push_str(rest);
            break;
        };
        let after = &rest[start + delim.len()..];
        let Some(end) = after.find(delim) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(open);
        out.push_str(&after[..end]);
        out.push_str(close);
        rest = &after[end + delim.len()..];
    }
    out
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_message(text: &str, max_chars: usize) -> String {
    const MARK: &str = "\n…";
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(MARK.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(MARK);
    out
}
