use serde::Serialize;
use thiserror::Error;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::archive::{ArchivedMessage, Channel};
use crate::engine::ChannelRunSummary;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Copy)]
pub enum JsonFormat {
    Pretty,
    Compact,
}

pub fn resolve_json_format(compact: bool) -> JsonFormat {
    if compact {
        JsonFormat::Compact
    } else {
        JsonFormat::Pretty
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelListItem {
    pub channel: Channel,
    pub display_name: String,
    pub message_count: Option<usize>,
    pub deleted_count: u64,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelListOutput {
    pub channels: Vec<ChannelListItem>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListItem {
    pub message: ArchivedMessage,
    pub deleted: bool,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListOutput {
    pub channel_id: String,
    pub channel_name: String,
    pub items: Vec<MessageListItem>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatsOutput {
    pub ledger_path: String,
    pub channel_id: Option<String>,
    pub deleted: u64,
}

pub fn json_string<T: Serialize + ?Sized>(value: &T, format: JsonFormat) -> Result<String, OutputError> {
    let payload = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(value)?,
        JsonFormat::Compact => serde_json::to_string(value)?,
    };
    Ok(payload)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T, format: JsonFormat) -> Result<(), OutputError> {
    let payload = json_string(value, format)?;
    println!("{payload}");
    Ok(())
}

pub fn print_channels(
    output: &ChannelListOutput,
    json: bool,
    json_format: JsonFormat,
) -> Result<(), OutputError> {
    if json {
        return print_json(output, json_format);
    }

    let mut id_width = display_width("id");
    let mut name_width = display_width("name");
    for item in &output.channels {
        id_width = id_width.max(display_width(&item.channel.id));
        name_width = name_width.max(display_width(&item.display_name));
    }
    name_width = name_width.min(48);

    println!(
        "{}  {}  {}  {}",
        pad_left("id", id_width),
        pad_right("name", name_width),
        pad_left("messages", 8),
        pad_left("deleted", 7),
    );
    for item in &output.channels {
        let count = item
            .message_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {}  {}",
            pad_left(&item.channel.id, id_width),
            pad_right(&truncate_display(&item.display_name, name_width), name_width),
            pad_left(&count, 8),
            pad_left(&item.deleted_count.to_string(), 7),
        );
    }
    Ok(())
}

pub fn print_messages(
    output: &MessageListOutput,
    json: bool,
    json_format: JsonFormat,
) -> Result<(), OutputError> {
    if json {
        return print_json(output, json_format);
    }

    println!("Messages for {} ({})", output.channel_name, output.channel_id);

    let mut id_width = display_width("id");
    let mut when_width = display_width("when");
    for item in &output.items {
        id_width = id_width.max(display_width(&item.message.id));
        when_width = when_width.max(display_width(&item.message.timestamp));
    }
    when_width = when_width.min(19);

    println!(
        "{}  {}  {}  {}",
        pad_left("id", id_width),
        pad_right("when", when_width),
        pad_right("deleted", 7),
        pad_right("text", 72),
    );
    for item in &output.items {
        println!(
            "{}  {}  {}  {}",
            pad_left(&item.message.id, id_width),
            pad_right(&truncate_display(&item.message.timestamp, when_width), when_width),
            pad_right(if item.deleted { "yes" } else { "no" }, 7),
            pad_right(&truncate_display(&message_preview(&item.message), 72), 72),
        );
    }
    Ok(())
}

pub fn print_run_summary(
    summary: &ChannelRunSummary,
    json: bool,
    json_format: JsonFormat,
) -> Result<(), OutputError> {
    if json {
        return print_json(summary, json_format);
    }

    println!(
        "Channel {}: {} deleted, {} skipped, {} failed.",
        summary.channel_id,
        summary.succeeded.len(),
        summary.skipped.len(),
        summary.failed.len(),
    );
    if summary.failed.is_empty() {
        return Ok(());
    }

    let mut id_width = display_width("id");
    for failed in &summary.failed {
        id_width = id_width.max(display_width(&failed.message_id));
    }
    println!("{}  {}", pad_left("id", id_width), "reason");
    for failed in &summary.failed {
        println!(
            "{}  {}",
            pad_left(&failed.message_id, id_width),
            truncate_display(&failed.reason.to_string(), 96),
        );
    }
    Ok(())
}

pub fn print_ledger_stats(
    output: &LedgerStatsOutput,
    json: bool,
    json_format: JsonFormat,
) -> Result<(), OutputError> {
    if json {
        return print_json(output, json_format);
    }
    match &output.channel_id {
        Some(channel_id) => println!(
            "{} messages recorded as deleted in channel {} ({}).",
            output.deleted, channel_id, output.ledger_path
        ),
        None => println!(
            "{} messages recorded as deleted ({}).",
            output.deleted, output.ledger_path
        ),
    }
    Ok(())
}

/// One-line rendering of a message for tables and pickers.
pub fn message_preview(message: &ArchivedMessage) -> String {
    let text = message.contents.split_whitespace().collect::<Vec<_>>().join(" ");
    match (text.is_empty(), message.attachments.trim().is_empty()) {
        (false, _) => text,
        (true, false) => "<attachment>".to_string(),
        (true, true) => "<empty>".to_string(),
    }
}

pub fn display_width(value: &str) -> usize {
    UnicodeWidthStr::width(value)
}

pub fn truncate_display(value: &str, max_width: usize) -> String {
    if display_width(value) <= max_width {
        return value.to_string();
    }
    let ellipsis = "...";
    let mut width = 0usize;
    let mut output = String::new();
    for ch in value.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width + ellipsis.len() > max_width {
            break;
        }
        output.push(ch);
        width += ch_width;
    }
    output.push_str(ellipsis);
    output
}

fn pad_right(value: &str, width: usize) -> String {
    let mut output = value.to_string();
    let current = display_width(value);
    if current < width {
        output.push_str(&" ".repeat(width - current));
    }
    output
}

fn pad_left(value: &str, width: usize) -> String {
    let current = display_width(value);
    if current >= width {
        return value.to_string();
    }
    let mut output = " ".repeat(width - current);
    output.push_str(value);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(contents: &str, attachments: &str) -> ArchivedMessage {
        ArchivedMessage {
            id: "1".to_string(),
            timestamp: String::new(),
            contents: contents.to_string(),
            attachments: attachments.to_string(),
        }
    }

    #[test]
    fn preview_collapses_whitespace() {
        assert_eq!(message_preview(&message("a\n  b\tc", "")), "a b c");
        assert_eq!(message_preview(&message("", "https://cdn/x.png")), "<attachment>");
        assert_eq!(message_preview(&message("  ", "")), "<empty>");
    }

    #[test]
    fn truncation_respects_wide_characters() {
        assert_eq!(truncate_display("short", 10), "short");
        assert_eq!(truncate_display("abcdefghijkl", 8), "abcde...");
        let wide = truncate_display("日本語のテキスト", 9);
        assert!(display_width(&wide) <= 9);
        assert!(wide.ends_with("..."));
    }

    #[test]
    fn padding_uses_display_width() {
        assert_eq!(pad_left("7", 3), "  7");
        assert_eq!(pad_right("日", 4), "日  ");
    }
}
