use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::metadata::{GameStatus, MetadataService};
use crate::platform::ChatEvent;
use crate::raffle::{RaffleMachine, RaffleOutcome};

/// Name and tokens of one command line, e.g. `!raffle giveaway`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    pub name: String,
    /// Whitespace-split tokens of the whole line, the prefixed name included
    pub tokens: Vec<String>,
}

impl CommandInvocation {
    /// Parse `text` as a command if it starts with `prefix`.
    pub fn parse(text: &str, prefix: char) -> Option<Self> {
        let body = text.strip_prefix(prefix)?;
        let name = body
            .split(char::is_whitespace)
            .next()
            .unwrap_or_default()
            .to_string();
        let tokens = text.split_whitespace().map(str::to_string).collect();
        Some(Self { name, tokens })
    }

    /// Tokens after the command name.
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }
}

enum Command {
    Game,
    Title,
    Shoutout,
    Raffle,
    Unknown,
}

impl FromStr for Command {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "game" => Ok(Command::Game),
            "title" => Ok(Command::Title),
            "shoutout" => Ok(Command::Shoutout),
            "raffle" => Ok(Command::Raffle),
            _ => Ok(Command::Unknown),
        }
    }
}

/// What a handler wants done after processing one chat line
#[derive(Debug)]
pub enum Reply {
    Say(String),
    Silent,
    Failed(anyhow::Error),
}

impl From<Result<String>> for Reply {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(text) => Reply::Say(text),
            Err(e) => Reply::Failed(e),
        }
    }
}

/// Routes chat lines to command handlers or the raffle.
pub struct Dispatcher {
    metadata: Arc<dyn MetadataService>,
    raffle: RaffleMachine,
    prefix: char,
    /// Channel login; its owner is the only one allowed to run raffles
    owner: String,
    channel_id: String,
}

impl Dispatcher {
    pub fn new(
        metadata: Arc<dyn MetadataService>,
        raffle: RaffleMachine,
        prefix: char,
        owner: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            raffle,
            prefix,
            owner: owner.into(),
            channel_id: channel_id.into(),
        }
    }

    #[cfg(test)]
    pub fn raffle(&self) -> &RaffleMachine {
        &self.raffle
    }

    /// Handle one chat line to completion.
    pub async fn dispatch(&mut self, event: &ChatEvent) -> Reply {
        let Some(invocation) = CommandInvocation::parse(&event.text, self.prefix) else {
            self.raffle.on_chat_line(&event.speaker, &event.text);
            return Reply::Silent;
        };

        info!("Received command: {}", invocation.name);
        self.run_command(&event.speaker, &invocation).await
    }

    async fn run_command(&mut self, speaker: &str, invocation: &CommandInvocation) -> Reply {
        let command = Command::from_str(&invocation.name).unwrap_or(Command::Unknown);
        match command {
            Command::Game => self.game(speaker).await.into(),
            Command::Title => self.title(speaker).await.into(),
            Command::Shoutout => shoutout(invocation).into(),
            Command::Raffle => {
                let is_owner = speaker == self.owner;
                let outcome = self.raffle.start_or_stop(is_owner, invocation.args());
                match &outcome {
                    RaffleOutcome::Ignored => debug!("Ignoring raffle command from {}", speaker),
                    RaffleOutcome::Started { keyword } => {
                        info!("Raffle has begun, keyword '{}'", keyword)
                    }
                    RaffleOutcome::MissingKeyword => info!("No keyword given"),
                    RaffleOutcome::Winner(_) | RaffleOutcome::NoEntrants => {}
                }
                match outcome.announcement() {
                    Some(text) => Reply::Say(text),
                    None => Reply::Silent,
                }
            }
            Command::Unknown => {
                warn!("Did not understand command: {}", invocation.name);
                Reply::Say(format!(
                    "{} Did not understand command: {}",
                    speaker, invocation.name
                ))
            }
        }
    }

    async fn game(&self, speaker: &str) -> Result<String> {
        let status = self
            .metadata
            .current_game(&self.channel_id)
            .await
            .context("Failed to fetch current game")?;

        Ok(match status {
            GameStatus::Playing(game) => format!("{} Currently playing {}", speaker, game),
            GameStatus::NoGame => format!("{} No current game", speaker),
        })
    }

    async fn title(&self, speaker: &str) -> Result<String> {
        let title = self
            .metadata
            .channel_title(&self.channel_id)
            .await
            .context("Failed to fetch channel title")?;
        Ok(format!("{} Channel title is currently {}", speaker, title))
    }
}

fn shoutout(invocation: &CommandInvocation) -> Result<String> {
    let target = invocation
        .args()
        .first()
        .context("shoutout needs a target user")?;
    Ok(format!(
        "Please follow and support {} at twitch.tv/{}",
        target, target
    ))
}
