use crate::models::{Conversation, Message, ThreadEntry};
use chrono::Utc;
use uuid::Uuid;

/// View state owned by the chat controller. The presentation layer reads it;
/// only the controller mutates it.
#[derive(Debug, Default, Clone)]
pub struct ChatState {
    conversations: Vec<Conversation>,
    active_conversation: Option<Uuid>,
    thread: Vec<ThreadEntry>,
    awaiting_response: bool,
}

impl ChatState {
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_conversation(&self) -> Option<Uuid> {
        self.active_conversation
    }

    pub fn active_title(&self) -> Option<&str> {
        let active = self.active_conversation?;
        self.conversations
            .iter()
            .find(|c| c.id == active)
            .map(|c| c.display_title())
    }

    pub fn thread(&self) -> &[ThreadEntry] {
        &self.thread
    }

    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub(crate) fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    pub(crate) fn set_active(&mut self, conversation_id: Option<Uuid>) {
        self.active_conversation = conversation_id;
    }

    /// Replaces the thread with the authoritative persisted messages, which
    /// also drops any in-flight entry.
    pub(crate) fn set_messages(&mut self, messages: Vec<Message>) {
        self.thread = messages.into_iter().map(ThreadEntry::Persisted).collect();
    }

    pub(crate) fn clear_thread(&mut self) {
        self.thread.clear();
    }

    pub(crate) fn set_awaiting(&mut self, awaiting: bool) {
        self.awaiting_response = awaiting;
    }

    /// Shows the in-flight assistant reply. An existing `Streaming` entry at
    /// the end of the thread is updated in place; otherwise one is appended.
    pub(crate) fn show_streaming(&mut self, content: &str) {
        match self.thread.last_mut() {
            Some(ThreadEntry::Streaming { content: current, .. }) => {
                current.clear();
                current.push_str(content);
            }
            _ => self.thread.push(ThreadEntry::Streaming {
                content: content.to_string(),
                started_at: Utc::now(),
            }),
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn persisted(role: Role, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn streaming_entry_is_replaced_not_duplicated() {
        let mut state = ChatState::default();
        state.set_messages(vec![persisted(Role::User, "Hi")]);

        state.show_streaming("He");
        state.show_streaming("Hello");

        assert_eq!(state.thread().len(), 2);
        assert_eq!(state.thread()[1].content(), "Hello");
        assert!(state.thread()[1].is_streaming());
    }

    #[test]
    fn persisted_assistant_reply_is_not_overwritten() {
        let mut state = ChatState::default();
        state.set_messages(vec![
            persisted(Role::User, "Hi"),
            persisted(Role::Assistant, "Old answer"),
        ]);

        state.show_streaming("New");

        assert_eq!(state.thread().len(), 3);
        assert_eq!(state.thread()[1].content(), "Old answer");
        assert_eq!(state.thread()[2].id(), None);
    }

    #[test]
    fn reload_reconciles_the_streaming_entry() {
        let mut state = ChatState::default();
        state.show_streaming("Hello");
        let reply = persisted(Role::Assistant, "Hello");
        state.set_messages(vec![persisted(Role::User, "Hi"), reply.clone()]);

        assert!(state.thread().iter().all(|entry| !entry.is_streaming()));
        assert_eq!(state.thread()[1].id(), Some(reply.id));
    }
}
