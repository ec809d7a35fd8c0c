mod api;
mod archive;
mod auth;
mod browse;
mod config;
mod engine;
mod ledger;
mod logging;
mod output;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};

use crate::api::ApiClient;
use crate::archive::{Archive, Channel};
use crate::auth::AuthStore;
use crate::browse::{Browser, progress_line};
use crate::config::Config;
use crate::engine::{DeletionEngine, RunContext};
use crate::ledger::{DeletionLedger, SqliteLedger};
use crate::output::{
    ChannelListItem, ChannelListOutput, LedgerStatsOutput, MessageListItem, MessageListOutput,
};

#[derive(Parser)]
#[command(
    name = "scrubber",
    version,
    about = "Delete your messages using a Discord data package",
    after_help = "Examples:\n  scrubber browse --archive ./package\n  scrubber channels --archive ./package\n  scrubber messages --archive ./package --channel 123\n  scrubber delete --archive ./package --channel 123 --all\n  scrubber delete --archive ./package --channel 123 --message-id 456 --message-id 789 --yes\n  scrubber ledger stats --channel 123"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, help = "Output JSON instead of a table")]
    json: bool,

    #[arg(long, global = true, help = "Print JSON on a single line")]
    compact: bool,

    #[arg(short, long, global = true, help = "Log progress to stderr")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Pick a channel and messages interactively, then delete them")]
    Browse(BrowseArgs),
    #[command(about = "List channels in the data package")]
    Channels(ArchiveArgs),
    #[command(about = "List a channel's messages and whether they are deleted")]
    Messages(ChannelArgs),
    #[command(about = "Delete messages from a channel")]
    Delete(DeleteArgs),
    #[command(about = "Inspect the local deletion ledger")]
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
    #[command(about = "Manage the saved Discord token")]
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    #[command(about = "Print the resolved configuration")]
    Doctor,
}

#[derive(Args)]
struct BrowseArgs {
    #[arg(long, value_name = "PATH", help = "Data package directory (prompted if omitted)")]
    archive: Option<PathBuf>,

    #[arg(long, help = "Discord token (overrides the saved token)")]
    token: Option<String>,
}

#[derive(Args)]
struct ArchiveArgs {
    #[arg(long, value_name = "PATH", help = "Data package directory")]
    archive: PathBuf,
}

#[derive(Args)]
struct ChannelArgs {
    #[arg(long, value_name = "PATH", help = "Data package directory")]
    archive: PathBuf,

    #[arg(long, help = "Channel id (with or without the c prefix)")]
    channel: String,
}

#[derive(Args)]
struct DeleteArgs {
    #[arg(long, value_name = "PATH", help = "Data package directory")]
    archive: PathBuf,

    #[arg(long, help = "Channel id (with or without the c prefix)")]
    channel: String,

    #[arg(long = "message-id", value_name = "ID", help = "Message id to delete (repeatable)")]
    message_ids: Vec<String>,

    #[arg(long, conflicts_with = "message_ids", help = "Delete every message in the channel")]
    all: bool,

    #[arg(long, short, help = "Skip the confirmation prompt")]
    yes: bool,

    #[arg(long, help = "Discord token (overrides the saved token)")]
    token: Option<String>,
}

#[derive(Subcommand)]
enum LedgerCommand {
    #[command(about = "Count recorded deletions")]
    Stats(LedgerStatsArgs),
}

#[derive(Args)]
struct LedgerStatsArgs {
    #[arg(long, help = "Only count this channel")]
    channel: Option<String>,
}

#[derive(Subcommand)]
enum AuthCommand {
    #[command(about = "Save a Discord token for later runs")]
    Login,
    #[command(about = "Clear the saved token")]
    Logout,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = Config::load();
    let auth_store = AuthStore::new(config.secrets_path.clone());
    let json_format = output::resolve_json_format(cli.compact);

    match cli.command {
        Command::Browse(args) => {
            let archive_path = match args.archive {
                Some(path) => path,
                None => prompt_archive_path()?,
            };
            let archive = Archive::open(&archive_path)?;
            let ledger = SqliteLedger::open(&config.ledger_path)?;
            let token = require_token(&auth_store, args.token.as_deref(), true)?;
            let api = ApiClient::new(config.api_base_url.clone(), config.http_timeout())?;
            let browser = Browser::new(&archive, &ledger, &api, RunContext::new(token), config.engine_settings());
            browser.run().await?;
        }
        Command::Channels(args) => {
            let archive = Archive::open(&args.archive)?;
            let ledger = SqliteLedger::open(&config.ledger_path)?;
            let mut channels = Vec::new();
            for channel in archive.channels()? {
                let message_count = message_count(&archive, &channel);
                channels.push(ChannelListItem {
                    display_name: channel.display_name().to_string(),
                    deleted_count: ledger.deleted_count(&channel.id)?,
                    message_count,
                    channel,
                });
            }
            output::print_channels(&ChannelListOutput { channels }, cli.json, json_format)?;
        }
        Command::Messages(args) => {
            let archive = Archive::open(&args.archive)?;
            let ledger = SqliteLedger::open(&config.ledger_path)?;
            let channel = archive.find_channel(&args.channel)?;
            let mut items = Vec::new();
            for message in archive.messages(&channel)? {
                items.push(MessageListItem {
                    deleted: ledger.has_been_deleted(&channel.id, &message.id)?,
                    message,
                });
            }
            let output = MessageListOutput {
                channel_id: channel.id.clone(),
                channel_name: channel.display_name().to_string(),
                items,
            };
            output::print_messages(&output, cli.json, json_format)?;
        }
        Command::Delete(args) => {
            let archive = Archive::open(&args.archive)?;
            let channel = archive.find_channel(&args.channel)?;
            let message_ids = select_message_ids(&archive.message_ids(&channel)?, &args.message_ids, args.all)?;
            if message_ids.is_empty() {
                if args.all {
                    println!("Channel {} has no messages.", channel.id);
                    return Ok(());
                }
                return Err("Provide --message-id or --all".into());
            }

            let ledger = SqliteLedger::open(&config.ledger_path)?;
            let token = require_token(&auth_store, args.token.as_deref(), !args.yes)?;
            if !args.yes {
                let proceed = Confirm::new()
                    .with_prompt(format!(
                        "Delete {} messages from {}? This cannot be undone.",
                        message_ids.len(),
                        channel.display_name()
                    ))
                    .default(false)
                    .interact()?;
                if !proceed {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let api = ApiClient::new(config.api_base_url.clone(), config.http_timeout())?;
            let engine = DeletionEngine::new(&ledger, &api, RunContext::new(token), config.engine_settings());
            let total = message_ids.len();
            let mut done = 0usize;
            let quiet = cli.json;
            let summary = engine
                .run_channel_with_progress(&channel.id, &message_ids, |task| {
                    done += 1;
                    if !quiet {
                        println!("[{done}/{total}] {}", progress_line(task));
                    }
                })
                .await;
            output::print_run_summary(&summary, cli.json, json_format)?;
            if summary.has_failures() {
                return Err(format!("{} messages could not be deleted", summary.failed.len()).into());
            }
        }
        Command::Ledger { command } => match command {
            LedgerCommand::Stats(args) => {
                let ledger = SqliteLedger::open(&config.ledger_path)?;
                let channel_id = args
                    .channel
                    .map(|channel| channel.trim().trim_start_matches('c').to_string());
                let deleted = match channel_id.as_deref() {
                    Some(channel_id) => ledger.deleted_count(channel_id)?,
                    None => ledger.total_count()?,
                };
                let output = LedgerStatsOutput {
                    ledger_path: config.ledger_path.display().to_string(),
                    channel_id,
                    deleted,
                };
                output::print_ledger_stats(&output, cli.json, json_format)?;
            }
        },
        Command::Auth { command } => match command {
            AuthCommand::Login => {
                let token = prompt_token()?;
                auth_store.store_token(&token)?;
                println!("Token saved to {}.", config.secrets_path.display());
            }
            AuthCommand::Logout => {
                auth_store.clear_token()?;
                println!("Logged out.");
            }
        },
        Command::Doctor => {
            output::print_json(&serde_json::json!({ "cfg": &config }), json_format)?;
        }
    }

    Ok(())
}

/// `None` when the channel's message file cannot be read; the table shows `-`.
fn message_count(archive: &Archive, channel: &Channel) -> Option<usize> {
    match archive.messages(channel) {
        Ok(messages) => Some(messages.len()),
        Err(error) => {
            tracing::warn!(channel_id = %channel.id, %error, "could not read channel messages");
            None
        }
    }
}

fn require_token(
    auth_store: &AuthStore,
    explicit: Option<&str>,
    interactive: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(token) = auth_store.resolve_token(explicit)? {
        return Ok(token);
    }
    if interactive {
        return prompt_token();
    }
    Err("No Discord token. Set SCRUBBER_TOKEN, pass --token, or run `scrubber auth login`.".into())
}

fn prompt_token() -> Result<String, Box<dyn std::error::Error>> {
    let token = Password::new().with_prompt("Discord token").interact()?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err("token is empty".into());
    }
    Ok(token)
}

fn prompt_archive_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path: String = Input::new()
        .with_prompt("Path to Discord data dump?")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Path cannot be empty!")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(expand_home(path.trim()))
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Keeps archive order. Requested ids that are not in the archive are an error.
fn select_message_ids(
    archived: &[String],
    requested: &[String],
    all: bool,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    if all {
        return Ok(archived.to_vec());
    }

    let requested: HashSet<&str> = requested.iter().map(|id| id.trim()).collect();
    let known: HashSet<&str> = archived.iter().map(String::as_str).collect();
    let mut missing: Vec<&str> = requested.iter().copied().filter(|id| !known.contains(id)).collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(format!("Message ids not found in channel: {}", missing.join(", ")).into());
    }

    Ok(archived
        .iter()
        .filter(|id| requested.contains(id.as_str()))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn all_keeps_archive_order() {
        let archived = ids(&["3", "1", "2"]);
        assert_eq!(select_message_ids(&archived, &[], true).unwrap(), archived);
    }

    #[test]
    fn requested_ids_follow_archive_order() {
        let archived = ids(&["3", "1", "2"]);
        let selected = select_message_ids(&archived, &ids(&["2", "3"]), false).unwrap();
        assert_eq!(selected, ids(&["3", "2"]));
    }

    #[test]
    fn unknown_requested_ids_are_rejected() {
        let archived = ids(&["1"]);
        let error = select_message_ids(&archived, &ids(&["9", "1"]), false).unwrap_err();
        assert!(error.to_string().contains('9'));
    }

    #[test]
    fn unreadable_messages_count_as_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let messages = dir.path().join("messages");
        std::fs::create_dir_all(messages.join("c1")).expect("mkdir");
        std::fs::create_dir_all(messages.join("c2")).expect("mkdir");
        std::fs::write(messages.join("index.json"), r#"{"1": "broken", "2": "fine"}"#).expect("write");
        std::fs::write(messages.join("c1").join("messages.json"), "[{not json").expect("write");
        std::fs::write(messages.join("c2").join("messages.json"), r#"[{"ID": 5, "Contents": "hi"}]"#)
            .expect("write");

        let archive = Archive::open(dir.path()).expect("open");
        let broken = archive.find_channel("1").expect("channel 1");
        let fine = archive.find_channel("2").expect("channel 2");
        assert_eq!(message_count(&archive, &broken), None);
        assert_eq!(message_count(&archive, &fine), Some(1));
    }

    #[test]
    fn home_is_expanded() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_home("~/dump"), Path::new(&home).join("dump"));
        }
        assert_eq!(expand_home("/tmp/dump"), PathBuf::from("/tmp/dump"));
    }
}
