use super::ChatStore;
use crate::models::{Conversation, Message, Role};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum number of characters of the first user message used as title.
const TITLE_MAX_CHARS: usize = 60;

// Schema, applied statement by statement on connect
const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY NOT NULL, -- UUID
        user_id TEXT NOT NULL, -- UUID of the owner
        title TEXT, -- NULL until the first user message
        created_at INTEGER NOT NULL, -- Unix Timestamp (milliseconds)
        updated_at INTEGER NOT NULL -- Unix Timestamp (milliseconds)
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY NOT NULL, -- UUID
        conversation_id TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL, -- Unix Timestamp (milliseconds)
        FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_conversations_user_id ON conversations(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id)",
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `db_path` and runs migrations.
    pub async fn open(db_path: &Path) -> Result<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        log::info!("Connecting to database: {}", db_path.display());
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// A private in-memory database. A single connection is kept alive for the
    /// lifetime of the pool, otherwise the database would vanish.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory database URL")?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        log::info!("Running database migrations...");
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(pool)
                .await
                .context("Failed to run database migrations")?;
        }
        log::info!("Database migrations completed.");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).context("Invalid timestamp")
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    Ok(Conversation {
        id: Uuid::parse_str(row.try_get("id")?).context("Failed to parse conversation ID")?,
        user_id: Uuid::parse_str(row.try_get("user_id")?).context("Failed to parse user ID")?,
        title: row.try_get("title")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let role: String = row.try_get("role")?;
    Ok(Message {
        id: Uuid::parse_str(row.try_get("id")?).context("Failed to parse message ID")?,
        conversation_id: Uuid::parse_str(row.try_get("conversation_id")?)
            .context("Failed to parse conversation ID for message")?,
        role: Role::parse(&role).with_context(|| format!("Unknown message role '{}'", role))?,
        content: row.try_get("content")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

fn title_from(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(TITLE_MAX_CHARS).collect())
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        log::debug!("Fetching conversations for user {}", user_id);
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, created_at, updated_at
            FROM conversations
            WHERE user_id = ?
            ORDER BY updated_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch conversations from database")?;

        let conversations = rows
            .iter()
            .map(conversation_from_row)
            .collect::<Result<Vec<_>>>()?;
        log::info!("Fetched {} conversations", conversations.len());
        Ok(conversations)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        log::debug!("Fetching messages for conversation ID: {}", conversation_id);
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages from database")?;

        let messages = rows.iter().map(message_from_row).collect::<Result<Vec<_>>>()?;
        log::info!("Fetched {} messages for conversation {}", messages.len(), conversation_id);
        Ok(messages)
    }

    async fn create_conversation(&self, user_id: Uuid) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            title: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, title, created_at, updated_at)
            VALUES (?, ?, NULL, ?, ?)
            "#,
        )
        .bind(conversation.id.to_string())
        .bind(user_id.to_string())
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert new conversation into database")?;

        log::info!("Created conversation {} for user {}", conversation.id, user_id);
        Ok(conversation)
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<()> {
        log::warn!("Deleting conversation with ID: {}", conversation_id);
        // Messages go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete conversation from database")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to delete non-existent conversation: {}", conversation_id);
        }
        Ok(())
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let conversation_id_text = conversation_id.to_string();
        let created_at_ms = message.created_at.timestamp_millis();

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id.to_string())
        .bind(conversation_id_text.as_str())
        .bind(role.as_str())
        .bind(message.content.as_str())
        .bind(created_at_ms)
        .execute(&mut *tx)
        .await
        .context("Failed to insert message into database")?;

        // Bump the conversation and name it after its first user message.
        let title = match role {
            Role::User => title_from(content),
            Role::Assistant => None,
        };
        sqlx::query(
            r#"
            UPDATE conversations
            SET updated_at = MAX(updated_at, ?), title = COALESCE(title, ?)
            WHERE id = ?
            "#,
        )
        .bind(created_at_ms)
        .bind(title)
        .bind(conversation_id_text.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to update conversation updated_at timestamp")?;

        tx.commit().await.context("Failed to commit message")?;

        log::debug!("Saved {} message {} to conversation {}", role, message.id, conversation_id);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let conversation = store.create_conversation(Uuid::new_v4()).await.unwrap();

        let turns = [(Role::User, "one"), (Role::Assistant, "two"), (Role::User, "three")];
        for (role, content) in turns {
            store.insert_message(conversation.id, role, content).await.unwrap();
        }

        let messages = store.list_messages(conversation.id).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(messages.iter().all(|m| m.conversation_id == conversation.id));
    }

    #[tokio::test]
    async fn conversations_are_scoped_to_user_and_newest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let first = store.create_conversation(alice).await.unwrap();
        tick().await;
        let second = store.create_conversation(alice).await.unwrap();
        store.create_conversation(bob).await.unwrap();

        let listed = store.list_conversations(alice).await.unwrap();
        assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), [second.id, first.id]);

        tick().await;
        store.insert_message(first.id, Role::User, "bump").await.unwrap();
        let listed = store.list_conversations(alice).await.unwrap();
        assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), [first.id, second.id]);
    }

    #[tokio::test]
    async fn first_user_message_names_the_conversation() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let conversation = store.create_conversation(user).await.unwrap();

        store.insert_message(conversation.id, Role::Assistant, "greeting").await.unwrap();
        let long = "x".repeat(100);
        store.insert_message(conversation.id, Role::User, &format!("  {}  ", long)).await.unwrap();
        store.insert_message(conversation.id, Role::User, "second question").await.unwrap();

        let listed = store.list_conversations(user).await.unwrap();
        assert_eq!(listed[0].title.as_deref(), Some("x".repeat(TITLE_MAX_CHARS).as_str()));
    }

    #[tokio::test]
    async fn delete_cascades_to_messages() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let conversation = store.create_conversation(user).await.unwrap();
        store.insert_message(conversation.id, Role::User, "hello").await.unwrap();

        store.delete_conversation(conversation.id).await.unwrap();

        assert!(store.list_conversations(user).await.unwrap().is_empty());
        assert!(store.list_messages(conversation.id).await.unwrap().is_empty());
        // Deleting again is not an error.
        store.delete_conversation(conversation.id).await.unwrap();
    }

    #[tokio::test]
    async fn message_for_unknown_conversation_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.insert_message(Uuid::new_v4(), Role::User, "orphan").await.is_err());
    }

    #[tokio::test]
    async fn open_creates_missing_directories() {
        let dir = std::env::temp_dir().join(format!("streamchat-{}", Uuid::new_v4()));
        let path = dir.join("nested").join("chat.sqlite");

        let store = SqliteStore::open(&path).await.unwrap();
        let conversation = store.create_conversation(Uuid::new_v4()).await.unwrap();
        store.insert_message(conversation.id, Role::User, "persisted").await.unwrap();
        assert!(path.exists());

        store.pool().close().await;
        let _ = std::fs::remove_dir_all(dir);
    }
}
