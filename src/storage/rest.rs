use super::ChatStore;
use crate::config::StoreConfig;
use crate::models::{Conversation, Message, Role};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

/// Client for the hosted database's REST interface (`/rest/v1/<table>`).
///
/// Filtering and ordering are expressed as query parameters
/// (`conversation_id=eq.<id>`, `order=created_at.asc`); inserts ask for the
/// stored row back with `Prefer: return=representation`.
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.public_key.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    async fn expect_success(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<Failed to read error body>".to_string());
        log::error!("Store request '{}' failed with status {}: {}", what, status, body);
        Err(anyhow::anyhow!("{} failed with status {}: {}", what, status, body))
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<Vec<T>> {
        let response = self
            .authorized(request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;
        Self::expect_success(response, what)
            .await?
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("Failed to decode {} response", what))
    }

    async fn insert_returning<T: DeserializeOwned>(
        &self,
        table: &str,
        row: serde_json::Value,
        what: &str,
    ) -> Result<T> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row);
        self.fetch_rows::<T>(request, what)
            .await?
            .into_iter()
            .next()
            .with_context(|| format!("{} returned no row", what))
    }
}

#[async_trait]
impl ChatStore for RestStore {
    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let user_filter = format!("eq.{}", user_id);
        let request = self.client.get(self.table_url("conversations")).query(&[
            ("select", "*"),
            ("user_id", user_filter.as_str()),
            ("order", "updated_at.desc"),
        ]);
        self.fetch_rows(request, "list conversations").await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let conversation_filter = format!("eq.{}", conversation_id);
        let request = self.client.get(self.table_url("messages")).query(&[
            ("select", "*"),
            ("conversation_id", conversation_filter.as_str()),
            ("order", "created_at.asc"),
        ]);
        self.fetch_rows(request, "list messages").await
    }

    async fn create_conversation(&self, user_id: Uuid) -> Result<Conversation> {
        self.insert_returning("conversations", json!({ "user_id": user_id }), "create conversation")
            .await
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<()> {
        let id_filter = format!("eq.{}", conversation_id);
        let request = self
            .client
            .delete(self.table_url("conversations"))
            .query(&[("id", id_filter.as_str())]);
        let response = self
            .authorized(request)
            .send()
            .await
            .context("Failed to send delete conversation request")?;
        Self::expect_success(response, "delete conversation").await?;
        Ok(())
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<Message> {
        let row = json!({
            "conversation_id": conversation_id,
            "role": role,
            "content": content,
        });
        self.insert_returning("messages", row, "insert message").await
    }
}
