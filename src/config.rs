use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const USAGE: &str = "Usage: rafflebot <username> <client id> <token> <channel>";

/// The four required positional startup parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupArgs {
    pub username: String,
    pub client_id: String,
    pub token: String,
    /// Channel login, lowercased and without the leading `#`
    pub channel: String,
}

impl StartupArgs {
    /// Parse the arguments that follow the program name.
    /// Returns `None` unless there are exactly four non-empty values.
    pub fn from_args(args: &[String]) -> Option<Self> {
        let [username, client_id, token, channel] = args else {
            return None;
        };

        let channel = channel.trim_start_matches('#').to_lowercase();
        let values = [username.as_str(), client_id.as_str(), token.as_str(), channel.as_str()];
        if values.iter().any(|value| value.trim().is_empty()) {
            return None;
        }

        Some(Self {
            username: username.clone(),
            client_id: client_id.clone(),
            token: token.clone(),
            channel,
        })
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IrcConfig {
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Consecutive failed connections tolerated before giving up (0 = retry forever)
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnects: default_max_reconnects(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_secs: default_api_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommandsConfig {
    #[serde(default = "default_prefix")]
    pub prefix: char,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

/// How a chat line is compared against the active raffle keyword.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct KeywordMatch {
    /// Ignore leading/trailing whitespace on the chat line
    #[serde(default)]
    pub trim: bool,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl KeywordMatch {
    pub fn matches(&self, keyword: &str, text: &str) -> bool {
        let text = if self.trim { text.trim() } else { text };
        if self.case_insensitive {
            text.to_lowercase() == keyword.to_lowercase()
        } else {
            text == keyword
        }
    }
}

/// Tunables loaded from the optional settings file.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub irc: IrcConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub raffle: KeywordMatch,
}

fn default_server() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_port() -> u16 {
    6667
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_max_reconnects() -> u32 {
    5
}

fn default_api_base_url() -> String {
    "https://api.twitch.tv/kraken".to_string()
}

fn default_api_timeout() -> u64 {
    10
}

fn default_prefix() -> char {
    '!'
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.commands.prefix.is_whitespace() {
            anyhow::bail!("Command prefix must not be whitespace");
        }

        Ok(config)
    }

    /// Load `explicit` if given (it must exist), otherwise `fallback` when it
    /// exists, otherwise built-in defaults.
    pub fn load_or_default(explicit: Option<&Path>, fallback: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if fallback.exists() => Self::load(fallback),
            None => Ok(Self::default()),
        }
    }
}
