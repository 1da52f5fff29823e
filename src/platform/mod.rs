pub mod irc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A chat line received from the channel
#[derive(Debug, Clone)]
pub struct ChatEvent {
    /// Login name of the user who spoke
    pub speaker: String,
    /// The message text
    pub text: String,
    /// Arrival order within one connection
    pub seq: u64,
    pub received_at: DateTime<Utc>,
}

impl ChatEvent {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, seq: u64) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            seq,
            received_at: Utc::now(),
        }
    }
}

/// Lifecycle and chat events delivered by a transport, one at a time.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Server accepted the registration
    Welcome,
    ChatLine(ChatEvent),
    Disconnected,
}

/// Outbound side of a chat connection.
#[async_trait]
pub trait Transport: Send {
    async fn request_capabilities(&mut self, names: &[&str]) -> Result<()>;
    async fn join(&mut self, channel: &str) -> Result<()>;
    async fn send(&mut self, channel: &str, text: &str) -> Result<()>;
    fn is_connected(&self) -> bool;
}
