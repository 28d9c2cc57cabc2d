//! Append-only log of user and assistant turns for the active session.

use crate::core::message::{AssistantResponse, Message};

/// One logical entry in the log: the user's prompt, or the (possibly
/// multi-message) response it produced.
#[derive(Debug, Clone)]
pub enum TurnCell {
    User(Message),
    Assistant(AssistantResponse),
}

/// Ordered log owned by one session. A live conversation only ever appends;
/// loading a saved conversation swaps in a read-only snapshot that accepts
/// no further turns.
#[derive(Default)]
pub struct Conversation {
    cells: Vec<TurnCell>,
    viewing: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        debug_assert!(!self.viewing, "viewed conversations are read-only");
        self.cells.push(TurnCell::User(Message::user(text)));
    }

    pub fn push_assistant(&mut self, response: AssistantResponse) {
        debug_assert!(!self.viewing, "viewed conversations are read-only");
        self.cells.push(TurnCell::Assistant(response));
    }

    /// Flattens the log into the wire message list sent with the next query.
    pub fn to_input_messages(&self) -> Vec<Message> {
        self.cells
            .iter()
            .flat_map(|cell| match cell {
                TurnCell::User(message) => std::slice::from_ref(message),
                TurnCell::Assistant(response) => response.messages.as_slice(),
            })
            .cloned()
            .collect()
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.cells.iter().rev().find_map(|cell| match cell {
            TurnCell::User(message) => Some(message.content.as_str()),
            TurnCell::Assistant(_) => None,
        })
    }

    /// Replaces the log wholesale with a saved exchange for read-only viewing.
    pub fn load_saved(
        &mut self,
        user_text: &str,
        assistant_text: &str,
        request_id: Option<String>,
    ) {
        self.cells = vec![
            TurnCell::User(Message::user(user_text)),
            TurnCell::Assistant(AssistantResponse {
                messages: vec![Message::assistant(assistant_text)],
                request_id,
            }),
        ];
        self.viewing = true;
    }

    pub fn is_viewing(&self) -> bool {
        self.viewing
    }

    /// Starts a fresh live conversation.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.viewing = false;
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[TurnCell] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;

    fn response(messages: Vec<Message>) -> AssistantResponse {
        AssistantResponse {
            messages,
            request_id: None,
        }
    }

    #[test]
    fn flattening_preserves_turn_and_message_order() {
        let mut conversation = Conversation::new();
        conversation.push_user("What is 2+2?");
        conversation.push_assistant(response(vec![
            Message::assistant("Let me check."),
            Message::tool("c1", "4"),
            Message::assistant("It is 4."),
        ]));
        conversation.push_user("Thanks");

        let flat = conversation.to_input_messages();
        assert_eq!(flat.len(), 5);
        assert_eq!(flat[0].role, Role::User);
        assert_eq!(flat[2].role, Role::Tool);
        assert_eq!(flat[4].content, "Thanks");
    }

    #[test]
    fn last_user_text_skips_assistant_turns() {
        let mut conversation = Conversation::new();
        conversation.push_user("first");
        conversation.push_assistant(response(vec![Message::assistant("reply")]));
        assert_eq!(conversation.last_user_text(), Some("first"));
    }

    #[test]
    fn loading_a_saved_exchange_replaces_the_log() {
        let mut conversation = Conversation::new();
        conversation.push_user("live prompt");
        conversation.load_saved("old prompt", "old answer", Some("req-1".to_string()));

        assert!(conversation.is_viewing());
        let flat = conversation.to_input_messages();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].content, "old prompt");
        assert_eq!(flat[1].content, "old answer");
    }

    #[test]
    #[should_panic(expected = "read-only")]
    fn viewed_conversations_reject_new_turns() {
        let mut conversation = Conversation::new();
        conversation.load_saved("old prompt", "old answer", None);
        conversation.push_user("not allowed");
    }

    #[test]
    fn reset_returns_to_an_empty_live_log() {
        let mut conversation = Conversation::new();
        conversation.load_saved("old prompt", "old answer", None);
        conversation.reset();
        assert!(!conversation.is_viewing());
        assert!(conversation.is_empty());
        conversation.push_user("fresh start");
        assert_eq!(conversation.cells().len(), 1);
    }
}
