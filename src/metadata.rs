use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use tracing::debug;

use crate::config::ApiConfig;

/// What the channel is currently playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStatus {
    Playing(String),
    NoGame,
}

/// Read-only channel metadata lookups used by command handlers.
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn current_game(&self, channel_id: &str) -> Result<GameStatus>;
    async fn channel_title(&self, channel_id: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    #[serde(alias = "_id")]
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    /// Kept loose: the platform sends a string or null here
    game: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChannelStatusResponse {
    status: String,
}

pub struct MetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(config: &ApiConfig, client_id: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Client-ID",
            HeaderValue::from_str(client_id).context("Client id is not a valid header value")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.twitchtv.v5+json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching metadata: {}", url);

        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Metadata API error ({}): {}", status, error_body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// Look up the numeric id of the channel with the given login name.
    pub async fn resolve_channel_id(&self, login: &str) -> Result<String> {
        let response: UsersResponse = self.get_json("/users", &[("login", login)]).await?;

        let user = response
            .users
            .into_iter()
            .next()
            .with_context(|| format!("No user found for login '{}'", login))?;

        match user.id {
            serde_json::Value::String(id) => Ok(id),
            serde_json::Value::Number(id) => Ok(id.to_string()),
            other => anyhow::bail!("Unexpected user id format: {}", other),
        }
    }
}

#[async_trait]
impl MetadataService for MetadataClient {
    async fn current_game(&self, channel_id: &str) -> Result<GameStatus> {
        let response: ChannelResponse = self
            .get_json(&format!("/channels/{}", channel_id), &[])
            .await?;

        Ok(match response.game {
            serde_json::Value::String(game) => GameStatus::Playing(game),
            _ => GameStatus::NoGame,
        })
    }

    async fn channel_title(&self, channel_id: &str) -> Result<String> {
        let response: ChannelStatusResponse = self
            .get_json(&format!("/channels/{}", channel_id), &[])
            .await?;
        Ok(response.status)
    }
}
