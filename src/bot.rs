use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::commands::{Dispatcher, Reply};
use crate::platform::{ChatEvent, Transport, TransportEvent};

const CAPABILITIES: [&str; 3] = [
    "twitch.tv/membership",
    "twitch.tv/tags",
    "twitch.tv/commands",
];

/// Bot identity and the channel it serves. Fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub username: String,
    pub token: String,
    /// Channel login without the leading `#`
    pub channel: String,
    pub channel_id: String,
}

impl ChannelConfig {
    pub fn irc_channel(&self) -> String {
        format!("#{}", self.channel)
    }
}

/// Why a session run returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The transport lost its connection
    Disconnected,
    /// The event stream closed without a disconnect notice
    StreamClosed,
}

/// Counts consecutive connection attempts that never reached the welcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBudget {
    /// 0 = unlimited
    max_failures: u32,
    failures: u32,
}

impl ReconnectBudget {
    pub fn new(max_failures: u32) -> Self {
        Self {
            max_failures,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record one finished attempt. Returns false once the budget is spent.
    pub fn record(&mut self, welcomed: bool) -> bool {
        if welcomed {
            self.failures = 0;
        } else {
            self.failures = self.failures.saturating_add(1);
        }
        self.max_failures == 0 || self.failures < self.max_failures
    }
}

/// Owns the dispatcher (and with it the raffle) across reconnects.
pub struct Session {
    channel: ChannelConfig,
    dispatcher: Dispatcher,
    /// Chat lines handled on the current connection
    handled: u64,
    welcomed: bool,
}

impl Session {
    pub fn new(channel: ChannelConfig, dispatcher: Dispatcher) -> Self {
        Self {
            channel,
            dispatcher,
            handled: 0,
            welcomed: false,
        }
    }

    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }

    /// Whether the last run got as far as the server welcome.
    pub fn was_welcomed(&self) -> bool {
        self.welcomed
    }

    #[cfg(test)]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Consume transport events one at a time until the connection ends.
    pub async fn run<T: Transport>(
        &mut self,
        transport: &mut T,
        events: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<SessionEnd> {
        self.handled = 0;
        self.welcomed = false;

        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Welcome => self.on_welcome(transport).await?,
                TransportEvent::ChatLine(chat) => self.on_chat_line(transport, &chat).await,
                TransportEvent::Disconnected => {
                    warn!(
                        "Disconnected from {} after {} chat line(s)",
                        self.channel.irc_channel(),
                        self.handled
                    );
                    return Ok(SessionEnd::Disconnected);
                }
            }
        }

        Ok(SessionEnd::StreamClosed)
    }

    async fn on_welcome<T: Transport>(&mut self, transport: &mut T) -> Result<()> {
        let channel = self.channel.irc_channel();
        info!("Joining {}...", channel);
        self.welcomed = true;

        transport.request_capabilities(&CAPABILITIES).await?;
        transport.join(&channel).await?;

        if transport.is_connected() {
            info!("Connected, listening for commands...");
        } else {
            error!("Connection failed");
        }
        Ok(())
    }

    async fn on_chat_line<T: Transport>(&mut self, transport: &mut T, chat: &ChatEvent) {
        self.handled += 1;
        debug!(
            "#{} [{}] {}: {}",
            chat.seq,
            chat.received_at.format("%H:%M:%S"),
            chat.speaker,
            chat.text
        );

        match self.dispatcher.dispatch(chat).await {
            Reply::Say(text) => {
                if let Err(e) = transport.send(&self.channel.irc_channel(), &text).await {
                    error!("Failed to send reply: {:#}", e);
                }
            }
            Reply::Silent => {}
            Reply::Failed(e) => {
                warn!("Command from {} failed: {:#}", chat.speaker, e);
            }
        }
    }
}
