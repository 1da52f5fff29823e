mod bot;
mod commands;
mod config;
mod metadata;
mod platform;
mod raffle;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::{ChannelConfig, ReconnectBudget, Session};
use crate::commands::Dispatcher;
use crate::config::{Config, IrcConfig, StartupArgs, USAGE};
use crate::metadata::MetadataClient;
use crate::platform::irc::IrcTransport;
use crate::platform::{Transport, TransportEvent};
use crate::raffle::RaffleMachine;

const DEFAULT_CONFIG: &str = "rafflebot.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rafflebot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(startup) = StartupArgs::from_args(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    let config_path = std::env::var_os("RAFFLEBOT_CONFIG").map(PathBuf::from);
    let config = Config::load_or_default(config_path.as_deref(), Path::new(DEFAULT_CONFIG))
        .context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Server: {}:{}", config.irc.server, config.irc.port);
    info!("  API: {}", config.api.base_url);
    info!("  Command prefix: {}", config.commands.prefix);
    info!("  Keyword matching: {:?}", config.raffle);

    let metadata = Arc::new(MetadataClient::new(&config.api, &startup.client_id)?);

    // Every channel-scoped API call needs the numeric id
    let channel_id = metadata
        .resolve_channel_id(&startup.channel)
        .await
        .with_context(|| format!("Failed to resolve channel id for '{}'", startup.channel))?;
    info!("Channel {} has id {}", startup.channel, channel_id);

    let channel = ChannelConfig {
        username: startup.username,
        token: startup.token,
        channel: startup.channel,
        channel_id,
    };

    let dispatcher = Dispatcher::new(
        metadata,
        RaffleMachine::new(config.raffle),
        config.commands.prefix,
        channel.channel.clone(),
        channel.channel_id.clone(),
    );
    let mut session = Session::new(channel, dispatcher);

    let irc = &config.irc;
    let identity = session.channel().clone();
    let (nick, token) = (identity.username.as_str(), identity.token.as_str());

    info!("Bot is starting...");
    run_with_reconnect(&mut session, irc, || {
        IrcTransport::connect(irc, nick, token)
    })
    .await
}

/// Connect and run the session, reconnecting after connection loss until
/// `max_reconnects` consecutive attempts fail to reach the welcome.
async fn run_with_reconnect<T, F, Fut>(
    session: &mut Session,
    irc: &IrcConfig,
    mut connect: F,
) -> Result<()>
where
    T: Transport,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(T, mpsc::Receiver<TransportEvent>)>>,
{
    let mut budget = ReconnectBudget::new(irc.max_reconnects);

    loop {
        let welcomed = match connect().await {
            Ok((mut transport, mut events)) => {
                match session.run(&mut transport, &mut events).await {
                    Ok(end) => info!("Session ended: {:?}", end),
                    Err(e) => error!("Session error: {:#}", e),
                }
                session.was_welcomed()
            }
            Err(e) => {
                error!("Connection attempt failed: {:#}", e);
                false
            }
        };

        if !budget.record(welcomed) {
            anyhow::bail!(
                "Giving up after {} failed connection attempt(s)",
                budget.failures()
            );
        }

        warn!("Reconnecting in {}s...", irc.reconnect_delay_secs);
        tokio::time::sleep(Duration::from_secs(irc.reconnect_delay_secs)).await;
    }
}
