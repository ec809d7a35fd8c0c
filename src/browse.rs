use dialoguer::{Confirm, MultiSelect, Select};

use crate::api::ApiClient;
use crate::archive::{Archive, ArchivedMessage, Channel};
use crate::engine::{DeletionEngine, DeletionTask, EngineSettings, RunContext, TaskOutcome};
use crate::ledger::{DeletionLedger, SqliteLedger};
use crate::output::{self, JsonFormat, message_preview, truncate_display};

const CHOICE_TEXT_WIDTH: usize = 80;

pub enum BrowseState {
    ChannelList,
    MessageList(Channel),
    Confirm {
        channel: Channel,
        message_ids: Vec<String>,
    },
    Run {
        channel: Channel,
        message_ids: Vec<String>,
    },
    Exit,
}

#[derive(Debug, PartialEq, Eq)]
pub struct MessageChoice {
    pub id: String,
    pub label: String,
}

/// Messages still eligible for deletion, plus how many the ledger already covers.
pub fn message_choices(
    ledger: &impl DeletionLedger,
    channel_id: &str,
    messages: &[ArchivedMessage],
) -> (Vec<MessageChoice>, usize) {
    let mut choices = Vec::with_capacity(messages.len());
    let mut deleted = 0usize;
    for message in messages {
        // Unknown ledger state counts as deleted, same as the engine.
        if ledger.has_been_deleted(channel_id, &message.id).unwrap_or(true) {
            deleted += 1;
            continue;
        }
        let label = format!(
            "{}  {}",
            message.timestamp,
            truncate_display(&message_preview(message), CHOICE_TEXT_WIDTH)
        );
        choices.push(MessageChoice {
            id: message.id.clone(),
            label,
        });
    }
    (choices, deleted)
}

pub struct Browser<'a> {
    archive: &'a Archive,
    ledger: &'a SqliteLedger,
    api: &'a ApiClient,
    context: RunContext,
    settings: EngineSettings,
}

impl<'a> Browser<'a> {
    pub fn new(
        archive: &'a Archive,
        ledger: &'a SqliteLedger,
        api: &'a ApiClient,
        context: RunContext,
        settings: EngineSettings,
    ) -> Self {
        Self {
            archive,
            ledger,
            api,
            context,
            settings,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut state = BrowseState::ChannelList;
        loop {
            state = match state {
                BrowseState::ChannelList => self.select_channel()?,
                BrowseState::MessageList(channel) => self.select_messages(channel)?,
                BrowseState::Confirm {
                    channel,
                    message_ids,
                } => self.confirm(channel, message_ids)?,
                BrowseState::Run {
                    channel,
                    message_ids,
                } => {
                    self.run_deletion(&channel, &message_ids).await?;
                    BrowseState::ChannelList
                }
                BrowseState::Exit => return Ok(()),
            };
        }
    }

    fn select_channel(&self) -> Result<BrowseState, Box<dyn std::error::Error>> {
        let mut channels = self.archive.channels()?;
        if channels.is_empty() {
            println!("No channel directories found in this archive.");
            return Ok(BrowseState::Exit);
        }

        let mut items: Vec<String> = channels
            .iter()
            .map(|channel| format!("{}: {}", channel.dir_name, channel.display_name()))
            .collect();
        items.push("Exit".to_string());

        let selection = Select::new()
            .with_prompt("Select a channel")
            .items(&items)
            .default(0)
            .max_length(20)
            .interact()?;

        if selection >= channels.len() {
            return Ok(BrowseState::Exit);
        }
        Ok(BrowseState::MessageList(channels.swap_remove(selection)))
    }

    fn select_messages(&self, channel: Channel) -> Result<BrowseState, Box<dyn std::error::Error>> {
        let messages = self.archive.messages(&channel)?;
        let (choices, deleted) = message_choices(self.ledger, &channel.id, &messages);
        println!(
            "{} ({}): {} messages, {} already deleted.",
            channel.display_name(),
            channel.id,
            messages.len(),
            deleted
        );
        if choices.is_empty() {
            println!("Nothing left to delete in this channel.");
            return Ok(BrowseState::ChannelList);
        }

        let actions = [
            format!("Delete all {} remaining messages", choices.len()),
            "Pick messages".to_string(),
            "Back".to_string(),
        ];
        let action = Select::new()
            .with_prompt("What now?")
            .items(&actions)
            .default(1)
            .interact()?;

        let message_ids: Vec<String> = match action {
            0 => choices.into_iter().map(|choice| choice.id).collect(),
            1 => {
                let labels: Vec<&str> = choices.iter().map(|choice| choice.label.as_str()).collect();
                let picked = MultiSelect::new()
                    .with_prompt("Space to select, enter to confirm")
                    .items(&labels)
                    .max_length(20)
                    .interact()?;
                picked.into_iter().map(|index| choices[index].id.clone()).collect()
            }
            _ => return Ok(BrowseState::ChannelList),
        };

        if message_ids.is_empty() {
            println!("No messages selected.");
            return Ok(BrowseState::MessageList(channel));
        }
        Ok(BrowseState::Confirm {
            channel,
            message_ids,
        })
    }

    fn confirm(&self, channel: Channel, message_ids: Vec<String>) -> Result<BrowseState, Box<dyn std::error::Error>> {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Delete {} messages from {}? This cannot be undone.",
                message_ids.len(),
                channel.display_name()
            ))
            .default(false)
            .interact()?;

        if proceed {
            Ok(BrowseState::Run {
                channel,
                message_ids,
            })
        } else {
            Ok(BrowseState::MessageList(channel))
        }
    }

    async fn run_deletion(&self, channel: &Channel, message_ids: &[String]) -> Result<(), Box<dyn std::error::Error>> {
        let engine = DeletionEngine::new(self.ledger, self.api, self.context.clone(), self.settings.clone());
        let total = message_ids.len();
        let mut done = 0usize;
        let summary = engine
            .run_channel_with_progress(&channel.id, message_ids, |task| {
                done += 1;
                println!("[{done}/{total}] {}", progress_line(task));
            })
            .await;
        output::print_run_summary(&summary, false, JsonFormat::Pretty)?;
        Ok(())
    }
}

pub fn progress_line(task: &DeletionTask) -> String {
    match &task.outcome {
        TaskOutcome::Succeeded => format!("deleted {}", task.message_id),
        TaskOutcome::Skipped(_) => format!("skipped {} (already deleted)", task.message_id),
        TaskOutcome::Failed(reason) => format!("failed {}: {reason}", task.message_id),
        TaskOutcome::Pending => format!("pending {}", task.message_id),
    }
}
