//! Conversation store abstraction.
//!
//! The controller only talks to [`ChatStore`]. [`SqliteStore`] keeps
//! everything in a local database file, [`RestStore`] talks to the hosted
//! database's REST interface.

pub mod rest;
pub mod sqlite;

use crate::models::{Conversation, Message, Role};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Conversations owned by `user_id`, most recently updated first.
    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    /// Messages of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    async fn create_conversation(&self, user_id: Uuid) -> Result<Conversation>;

    /// Deletes a conversation together with its messages.
    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<()>;

    /// Persists a message and returns the stored record with its id.
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<Message>;
}
