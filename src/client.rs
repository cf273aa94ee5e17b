use crate::api::ByteStream;
use crate::config::StoreConfig;
use crate::models::ChatTurn;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const FALLBACK_ERROR: &str = "Failed to get AI response";

// Trait for whatever carries the chat history to the relay
#[async_trait]
pub trait ChatRelay: Send + Sync {
    /// Posts the history and returns the raw event-stream body. A non-2xx
    /// reply is an error carrying the relay's message.
    async fn open_stream(&self, turns: &[ChatTurn]) -> Result<ByteStream>;
}

#[derive(Serialize)]
struct RelayBody<'a> {
    messages: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct RelayErrorBody {
    error: Option<String>,
}

/// Talks to the relay endpoint over HTTP.
pub struct HttpRelayClient {
    client: Client,
    url: String,
    public_key: String,
}

impl HttpRelayClient {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.relay_url.clone(),
            public_key: config.public_key.clone(),
        }
    }
}

#[async_trait]
impl ChatRelay for HttpRelayClient {
    async fn open_stream(&self, turns: &[ChatTurn]) -> Result<ByteStream> {
        log::info!("Requesting completion for {} turns from {}", turns.len(), self.url);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.public_key)
            .json(&RelayBody { messages: turns })
            .send()
            .await
            .context("Failed to reach the chat relay")?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<RelayErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| FALLBACK_ERROR.to_string());
            log::error!("Relay responded with status {}: {}", status, message);
            return Err(anyhow::anyhow!(message));
        }

        let body = response
            .bytes_stream()
            .map_err(|e| anyhow::Error::from(e).context("Error reading relay stream"));
        Ok(Box::pin(body))
    }
}
