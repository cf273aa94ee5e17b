use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Title shown for a conversation that has not been named yet.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Author of a message. Callers can only ever speak as `user` or `assistant`;
/// the system persona is injected by the relay.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// A persisted message. The id is assigned by the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

// Conversation thread metadata, owned by a single user
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    // The hosted table has no created_at column
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE)
    }
}

/// One role/content pair of the model context sent to the relay.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// An entry of the message view for the active conversation.
///
/// `Streaming` is the in-flight assistant reply: it has no id because nothing
/// has been persisted yet, and it is dropped once the thread is reloaded from
/// the store.
#[derive(Clone, Debug, PartialEq)]
pub enum ThreadEntry {
    Persisted(Message),
    Streaming {
        content: String,
        started_at: DateTime<Utc>,
    },
}

impl ThreadEntry {
    pub fn role(&self) -> Role {
        match self {
            ThreadEntry::Persisted(message) => message.role,
            ThreadEntry::Streaming { .. } => Role::Assistant,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ThreadEntry::Persisted(message) => &message.content,
            ThreadEntry::Streaming { content, .. } => content,
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            ThreadEntry::Persisted(message) => Some(message.id),
            ThreadEntry::Streaming { .. } => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ThreadEntry::Streaming { .. })
    }
}
