use crate::models::ChatTurn;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use std::pin::Pin;

// Alias for the raw event-stream body handed between the relay and its callers
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// What the relay asks the upstream provider for.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub turns: Vec<ChatTurn>,
}

/// Outcome of opening an upstream stream. Non-2xx replies are not errors at
/// this level: the relay decides how each status is reported to the caller.
pub enum UpstreamReply {
    Streaming(ByteStream),
    Rejected { status: u16, body: String },
}

// Trait defining the interface for hosted completion providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Issues a single streaming request. Transport failures are `Err`.
    async fn open_stream(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<UpstreamReply>;
}

// --- OpenAI Compatible Provider Implementation ---

#[derive(Serialize, Debug)]
struct OpenAIRequestBody<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn request_body(request: &CompletionRequest) -> OpenAIRequestBody<'_> {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    messages.push(OpenAIMessage {
        role: "system",
        content: &request.system_prompt,
    });
    messages.extend(request.turns.iter().map(|turn| OpenAIMessage {
        role: turn.role.as_str(),
        content: &turn.content,
    }));

    OpenAIRequestBody {
        model: &request.model,
        messages,
        stream: true,
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompatibleProvider {
    async fn open_stream(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<UpstreamReply> {
        let request_url = self.completions_url();
        log::info!(
            "Sending stream request to {} using model {} ({} turns)",
            request_url,
            request.model,
            request.turns.len()
        );

        let response = self
            .client
            .post(&request_url)
            .bearer_auth(api_key)
            .json(&request_body(request))
            .send()
            .await
            .context("Failed to send stream request to the AI gateway")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<Failed to read error body>".to_string());
            return Ok(UpstreamReply::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map_err(|e| anyhow::Error::from(e).context("Error reading upstream stream"));
        Ok(UpstreamReply::Streaming(Box::pin(body)))
    }
}
