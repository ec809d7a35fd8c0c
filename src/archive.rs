//! Reader for the `messages/` tree of a Discord data package.
//!
//! ```text
//! messages/
//!   index.json          {"<channel id>": "<name>" | null, ...}
//!   c<channel id>/
//!     channel.json      optional metadata
//!     messages.json     or messages.csv (ID,Timestamp,Contents,Attachments)
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

pub const UNKNOWN_CHANNEL_NAME: &str = "NOT FOUND IN INDEX";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("index.json not found in the specified directory ({0})")]
    MissingIndex(PathBuf),
    #[error("no messages.json or messages.csv in {0}")]
    MissingMessages(PathBuf),
    #[error("channel {0} not found in archive")]
    UnknownChannel(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub dir_name: String,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub guild_name: Option<String>,
    pub recipients: Vec<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl Channel {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_CHANNEL_NAME)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedMessage {
    pub id: String,
    pub timestamp: String,
    pub contents: String,
    pub attachments: String,
}

pub struct Archive {
    messages_dir: PathBuf,
    index: HashMap<String, Option<String>>,
}

impl Archive {
    /// Accepts either the package root or its `messages/` directory.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let messages_dir = if path.join("messages").join("index.json").is_file() {
            path.join("messages")
        } else if path.join("index.json").is_file() {
            path.to_path_buf()
        } else {
            return Err(ArchiveError::MissingIndex(path.to_path_buf()));
        };

        let contents = fs::read_to_string(messages_dir.join("index.json"))?;
        let index: HashMap<String, Option<String>> = serde_json::from_str(&contents)?;
        Ok(Self { messages_dir, index })
    }

    pub fn channels(&self) -> Result<Vec<Channel>, ArchiveError> {
        let mut channels = Vec::new();
        for entry in WalkDir::new(&self.messages_dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let Some(dir_name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(id) = dir_name.strip_prefix('c') else {
                continue;
            };
            channels.push(self.load_channel(id, dir_name, entry.path()));
        }
        channels.sort_by(|a, b| a.dir_name.cmp(&b.dir_name));
        Ok(channels)
    }

    pub fn find_channel(&self, id: &str) -> Result<Channel, ArchiveError> {
        let id = id.trim();
        let id = id.strip_prefix('c').unwrap_or(id);
        let dir_name = format!("c{id}");
        let path = self.messages_dir.join(&dir_name);
        if !path.is_dir() {
            return Err(ArchiveError::UnknownChannel(id.to_string()));
        }
        Ok(self.load_channel(id, &dir_name, &path))
    }

    pub fn messages(&self, channel: &Channel) -> Result<Vec<ArchivedMessage>, ArchiveError> {
        let json_path = channel.path.join("messages.json");
        if json_path.is_file() {
            let contents = fs::read_to_string(&json_path)?;
            let rows: Vec<JsonMessageRow> = serde_json::from_str(&contents)?;
            return Ok(rows.into_iter().map(ArchivedMessage::from).collect());
        }

        let csv_path = channel.path.join("messages.csv");
        if csv_path.is_file() {
            return read_csv_messages(&csv_path);
        }

        Err(ArchiveError::MissingMessages(channel.path.clone()))
    }

    pub fn message_ids(&self, channel: &Channel) -> Result<Vec<String>, ArchiveError> {
        Ok(self
            .messages(channel)?
            .into_iter()
            .map(|message| message.id)
            .collect())
    }

    fn load_channel(&self, id: &str, dir_name: &str, path: &Path) -> Channel {
        let metadata = read_channel_metadata(path);
        let indexed_name = self.index.get(id).cloned().flatten();
        let name = indexed_name.or_else(|| metadata.as_ref().and_then(|meta| meta.name.clone()));

        Channel {
            id: id.to_string(),
            dir_name: dir_name.to_string(),
            name,
            kind: metadata.as_ref().and_then(|meta| meta.kind.as_ref().map(channel_kind_label)),
            guild_name: metadata
                .as_ref()
                .and_then(|meta| meta.guild.as_ref())
                .and_then(|guild| guild.name.clone()),
            recipients: metadata.map(|meta| meta.recipients).unwrap_or_default(),
            path: path.to_path_buf(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelMetadata {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<serde_json::Value>,
    guild: Option<GuildMetadata>,
    #[serde(default)]
    recipients: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GuildMetadata {
    name: Option<String>,
}

fn read_channel_metadata(dir: &Path) -> Option<ChannelMetadata> {
    let contents = fs::read_to_string(dir.join("channel.json")).ok()?;
    match serde_json::from_str(&contents) {
        Ok(metadata) => Some(metadata),
        Err(error) => {
            tracing::debug!(dir = %dir.display(), %error, "ignoring unreadable channel.json");
            None
        }
    }
}

fn channel_kind_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Number(number) => match number.as_u64() {
            Some(0) => "GUILD_TEXT".to_string(),
            Some(1) => "DM".to_string(),
            Some(2) => "GUILD_VOICE".to_string(),
            Some(3) => "GROUP_DM".to_string(),
            Some(5) => "GUILD_ANNOUNCEMENT".to_string(),
            Some(11) => "PUBLIC_THREAD".to_string(),
            Some(12) => "PRIVATE_THREAD".to_string(),
            _ => number.to_string(),
        },
        serde_json::Value::String(label) => label.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Snowflake {
    Number(u64),
    Text(String),
}

impl Snowflake {
    fn into_string(self) -> String {
        match self {
            Snowflake::Number(value) => value.to_string(),
            Snowflake::Text(value) => value.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonMessageRow {
    #[serde(rename = "ID")]
    id: Snowflake,
    #[serde(rename = "Timestamp", default)]
    timestamp: String,
    #[serde(rename = "Contents", default)]
    contents: String,
    #[serde(rename = "Attachments", default)]
    attachments: String,
}

impl From<JsonMessageRow> for ArchivedMessage {
    fn from(row: JsonMessageRow) -> Self {
        Self {
            id: row.id.into_string(),
            timestamp: row.timestamp,
            contents: row.contents,
            attachments: row.attachments,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvMessageRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Timestamp", default)]
    timestamp: String,
    #[serde(rename = "Contents", default)]
    contents: String,
    #[serde(rename = "Attachments", default)]
    attachments: String,
}

fn read_csv_messages(path: &Path) -> Result<Vec<ArchivedMessage>, ArchiveError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut messages = Vec::new();
    for row in reader.deserialize::<CsvMessageRow>() {
        let row = row?;
        let id = row.id.trim().to_string();
        if id.is_empty() {
            continue;
        }
        messages.push(ArchivedMessage {
            id,
            timestamp: row.timestamp,
            contents: row.contents,
            attachments: row.attachments,
        });
    }
    Ok(messages)
}
