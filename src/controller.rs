//! Client-side chat controller.
//!
//! Owns the [`ChatState`] and funnels every change through the operations
//! below. Read failures are logged and leave the previous state in place;
//! failed writes and failed sends are reported to the user as a [`Notice`].

use crate::auth::{AuthSession, UserSession};
use crate::client::ChatRelay;
use crate::events::{ChatEvent, Notice};
use crate::models::{Conversation, Role, ThreadEntry};
use crate::sse::DeltaDecoder;
use crate::state::ChatState;
use crate::storage::ChatStore;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub struct ChatController {
    store: Arc<dyn ChatStore>,
    relay: Arc<dyn ChatRelay>,
    auth: AuthSession,
    state: ChatState,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatController {
    /// Creates a controller and the event receiver for the presentation layer.
    pub fn new(
        store: Arc<dyn ChatStore>,
        relay: Arc<dyn ChatRelay>,
        auth: AuthSession,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            store,
            relay,
            auth,
            state: ChatState::default(),
            events,
        };
        (controller, receiver)
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    fn emit(&self, event: ChatEvent) {
        if let Err(e) = self.events.send(event) {
            log::debug!("No listener for chat event: {:?}", e.0);
        }
    }

    fn notify(&self, notice: Notice) {
        self.emit(ChatEvent::Notice(notice));
    }

    fn set_awaiting(&mut self, awaiting: bool) {
        self.state.set_awaiting(awaiting);
        self.emit(ChatEvent::AwaitingResponse { awaiting });
    }

    /// Reloads the signed-in user's conversations, newest update first.
    pub async fn list_conversations(&mut self) -> &[Conversation] {
        let Some(user_id) = self.auth.current_user() else {
            log::debug!("No session, not loading conversations");
            return self.state.conversations();
        };

        match self.store.list_conversations(user_id).await {
            Ok(conversations) => self.state.set_conversations(conversations),
            Err(e) => log::error!("Error loading conversations: {:?}", e),
        }
        self.state.conversations()
    }

    /// Reloads the thread for `conversation_id`, oldest message first.
    pub async fn list_messages(&mut self, conversation_id: Uuid) -> &[ThreadEntry] {
        match self.store.list_messages(conversation_id).await {
            Ok(messages) => self.state.set_messages(messages),
            Err(e) => log::error!("Error loading messages for {}: {:?}", conversation_id, e),
        }
        self.state.thread()
    }

    pub async fn create_conversation(&mut self) -> Option<Uuid> {
        let user_id = self.auth.current_user()?;

        match self.store.create_conversation(user_id).await {
            Ok(conversation) => {
                self.list_conversations().await;
                Some(conversation.id)
            }
            Err(e) => {
                log::error!("Error creating conversation: {:?}", e);
                self.notify(Notice::error("Failed to create a new chat"));
                None
            }
        }
    }

    pub async fn delete_conversation(&mut self, conversation_id: Uuid) {
        if let Err(e) = self.store.delete_conversation(conversation_id).await {
            log::error!("Error deleting conversation {}: {:?}", conversation_id, e);
            self.notify(Notice::error("Failed to delete chat"));
            return;
        }

        if self.state.active_conversation() == Some(conversation_id) {
            self.state.set_active(None);
            self.state.clear_thread();
        }

        self.list_conversations().await;
        self.notify(Notice::info("Done", "Chat deleted"));
    }

    pub async fn select_conversation(&mut self, conversation_id: Uuid) {
        self.state.set_active(Some(conversation_id));
        self.list_messages(conversation_id).await;
    }

    /// Creates a conversation and makes it the active one.
    pub async fn new_chat(&mut self) -> Option<Uuid> {
        let conversation_id = self.create_conversation().await?;
        self.select_conversation(conversation_id).await;
        Some(conversation_id)
    }

    /// Entry point for the composer: trims the input, ignores empty text and
    /// input while a reply is streaming, and starts a conversation if none is
    /// active.
    pub async fn submit(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.state.awaiting_response() {
            return;
        }

        let conversation_id = match self.state.active_conversation() {
            Some(id) => id,
            None => match self.new_chat().await {
                Some(id) => id,
                None => return,
            },
        };
        self.send_message(conversation_id, text).await;
    }

    /// Persists the user's message, streams the assistant reply into the
    /// thread and persists it once the stream closes.
    pub async fn send_message(&mut self, conversation_id: Uuid, text: &str) {
        self.set_awaiting(true);

        if let Err(e) = self.exchange(conversation_id, text).await {
            log::error!("Error sending message to {}: {:?}", conversation_id, e);
            self.notify(Notice::error(e.to_string()));
        }

        // Reload regardless of outcome so the thread shows what was stored.
        if self.state.active_conversation() == Some(conversation_id) {
            self.list_messages(conversation_id).await;
        }
        self.list_conversations().await;

        self.set_awaiting(false);
    }

    async fn exchange(&mut self, conversation_id: Uuid, text: &str) -> Result<()> {
        self.store
            .insert_message(conversation_id, Role::User, text)
            .await
            .context("Failed to send message")?;

        let history = self
            .store
            .list_messages(conversation_id)
            .await
            .context("Failed to load conversation history")?;
        let turns: Vec<_> = history.iter().map(|m| m.to_turn()).collect();

        let mut stream = self.relay.open_stream(&turns).await?;

        let mut decoder = DeltaDecoder::new();
        let mut assistant_content = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for delta in decoder.feed(&chunk) {
                assistant_content.push_str(&delta);
                if self.state.active_conversation() == Some(conversation_id) {
                    self.state.show_streaming(&assistant_content);
                }
                self.emit(ChatEvent::AssistantDelta {
                    conversation_id,
                    content: assistant_content.clone(),
                });
            }
        }
        decoder.finish();
        log::info!(
            "Stream for conversation {} closed after {} chars",
            conversation_id,
            assistant_content.len()
        );

        if !assistant_content.is_empty() {
            self.store
                .insert_message(conversation_id, Role::Assistant, &assistant_content)
                .await
                .context("Failed to save the assistant reply")?;
        }
        Ok(())
    }

    /// Applies the current auth signal: signing out clears everything,
    /// signing in loads the user's conversations.
    pub async fn sync_session(&mut self) {
        if self.auth.current_user().is_none() {
            log::info!("Signed out, clearing chat state");
            self.state.reset();
            return;
        }
        self.list_conversations().await;
    }

    /// Waits for the next sign-in / sign-out on `changes` and applies it.
    /// Returns `false` once the session signal is gone.
    pub async fn follow_session(
        &mut self,
        changes: &mut watch::Receiver<Option<UserSession>>,
    ) -> bool {
        if changes.changed().await.is_err() {
            log::debug!("Session signal closed");
            return false;
        }
        self.sync_session().await;
        true
    }
}
