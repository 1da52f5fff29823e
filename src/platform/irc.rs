use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::IrcConfig;
use crate::platform::{ChatEvent, Transport, TransportEvent};

const EVENT_BUFFER: usize = 256;

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// One parsed IRC protocol line, borrowing from the raw text.
///
/// `@tags :nick!user@host COMMAND param param :trailing text`
#[derive(Debug, PartialEq)]
pub struct IrcMessage<'a> {
    pub tags: Option<&'a str>,
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    /// Middle params followed by the trailing param, if any
    pub params: Vec<&'a str>,
}

impl<'a> IrcMessage<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let mut tags = None;
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, remainder) = stripped.split_once(' ')?;
            tags = Some(raw_tags);
            rest = remainder.trim_start();
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw_prefix, remainder) = stripped.split_once(' ')?;
            prefix = Some(raw_prefix);
            rest = remainder.trim_start();
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut parts = head.split_whitespace();
        let command = parts.next()?;
        let mut params: Vec<&str> = parts.collect();
        params.extend(trailing);

        Some(Self {
            tags,
            prefix,
            command,
            params,
        })
    }

    /// Nick portion of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&'a str> {
        let prefix = self.prefix?;
        Some(prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    pub fn tag(&self, key: &str) -> Option<&'a str> {
        self.tags?
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// Write one protocol line; CR/LF inside `line` are flattened to spaces.
async fn write_line(writer: &SharedWriter, line: &str) -> Result<()> {
    let mut sanitized = line.replace(['\r', '\n'], " ");
    sanitized.push_str("\r\n");

    let mut guard = writer.lock().await;
    guard
        .write_all(sanitized.as_bytes())
        .await
        .context("Failed to write to IRC connection")?;
    guard.flush().await.context("Failed to flush IRC connection")?;
    Ok(())
}

/// IRC transport over plain TCP. Dropping it closes the socket.
pub struct IrcTransport {
    writer: SharedWriter,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl IrcTransport {
    /// Connect, register with `nick`/`token`, and start the reader task.
    /// Inbound events arrive on the returned receiver.
    pub async fn connect(
        config: &IrcConfig,
        nick: &str,
        token: &str,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        info!("Connecting to {} on port {}...", config.server, config.port);

        let stream = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            TcpStream::connect((config.server.as_str(), config.port)),
        )
        .await
        .with_context(|| format!("Timed out connecting to {}", config.server))?
        .with_context(|| format!("Failed to connect to {}:{}", config.server, config.port))?;

        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(write_half));
        let connected = Arc::new(AtomicBool::new(true));

        let password = if token.starts_with("oauth:") {
            token.to_string()
        } else {
            format!("oauth:{}", token)
        };
        write_line(&writer, &format!("PASS {}", password)).await?;
        write_line(&writer, &format!("NICK {}", nick)).await?;
        write_line(&writer, &format!("USER {} 0 * :{}", nick, nick)).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_loop(read_half, writer.clone(), connected.clone(), tx));

        Ok((
            Self {
                writer,
                connected,
                reader,
            },
            rx,
        ))
    }
}

impl Drop for IrcTransport {
    fn drop(&mut self) {
        // The reader holds the read half and a writer handle
        self.reader.abort();
    }
}

async fn read_loop(
    read_half: OwnedReadHalf,
    writer: SharedWriter,
    connected: Arc<AtomicBool>,
    tx: mpsc::Sender<TransportEvent>,
) {
    let mut lines = BufReader::new(read_half).lines();
    let mut seq = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                error!("Failed to read from IRC connection: {}", e);
                break;
            }
        };

        let Some(msg) = IrcMessage::parse(&line) else {
            debug!("Ignoring unparsable line: {}", line);
            continue;
        };

        let event = match msg.command {
            "PING" => {
                let token = msg.params.first().copied().unwrap_or_default();
                if let Err(e) = write_line(&writer, &format!("PONG :{}", token)).await {
                    warn!("Failed to answer PING: {:#}", e);
                    break;
                }
                continue;
            }
            "001" => TransportEvent::Welcome,
            "PRIVMSG" => {
                let (Some(speaker), Some(text)) = (msg.nick(), msg.params.get(1)) else {
                    debug!("Ignoring malformed PRIVMSG: {}", line);
                    continue;
                };
                seq += 1;
                if let Some(display_name) = msg.tag("display-name").filter(|n| !n.is_empty()) {
                    debug!("#{} {} ({}): {}", seq, display_name, speaker, text);
                }
                TransportEvent::ChatLine(ChatEvent::new(speaker, *text, seq))
            }
            "NOTICE" => {
                warn!("Server notice: {}", msg.params.last().unwrap_or(&""));
                continue;
            }
            "RECONNECT" => {
                info!("Server requested a reconnect");
                break;
            }
            _ => {
                debug!("<< {}", line);
                continue;
            }
        };

        if tx.send(event).await.is_err() {
            debug!("Event receiver dropped, stopping reader");
            break;
        }
    }

    connected.store(false, Ordering::SeqCst);
    tx.send(TransportEvent::Disconnected).await.ok();
}

#[async_trait]
impl Transport for IrcTransport {
    async fn request_capabilities(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            write_line(&self.writer, &format!("CAP REQ :{}", name)).await?;
        }
        Ok(())
    }

    async fn join(&mut self, channel: &str) -> Result<()> {
        write_line(&self.writer, &format!("JOIN {}", channel)).await
    }

    async fn send(&mut self, channel: &str, text: &str) -> Result<()> {
        write_line(&self.writer, &format!("PRIVMSG {} :{}", channel, text)).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
