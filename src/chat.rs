use std::collections::BTreeSet;

use crate::client::ApiClient;
use crate::models::{ChatMessage, Sender};

pub const REPLY_FALLBACK: &str = "Lo siento, no pude procesar tu mensaje.";
pub const SEND_FAILURE: &str = "Lo siento, ocurrió un error al procesar tu mensaje. Por favor, inténtalo de nuevo.";

/// Conversation with one agent as the user sees it.
///
/// Mutating operations borrow the view exclusively, so a second send can not
/// start while one is in flight.
#[derive(Debug, Clone)]
pub struct ChatView {
    agent_id: i64,
    messages: Vec<ChatMessage>,
    selected_tools: BTreeSet<i64>,
}

impl ChatView {
    pub fn new(agent_id: i64) -> Self {
        Self { agent_id, messages: Vec::new(), selected_tools: BTreeSet::new() }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn selected_tools(&self) -> &BTreeSet<i64> {
        &self.selected_tools
    }

    /// Replaces the list with stored history; a failed load leaves it empty.
    pub async fn load(&mut self, api: &ApiClient) {
        self.messages = match api.fetch_chats(self.agent_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(agent_id = self.agent_id, error = %e, "loading chat history failed");
                Vec::new()
            }
        };
    }

    /// Returns the reply appended to the conversation, or `None` for blank input.
    pub async fn send(&mut self, api: &ApiClient, input: &str) -> Option<&ChatMessage> {
        let text = input.trim();
        if text.is_empty() {
            return None;
        }
        self.messages.push(ChatMessage::local(Sender::User, text, 0));

        let reply = match api.send_message(self.agent_id, text).await {
            Ok(res) => {
                let body = res.respuesta.or(res.message).unwrap_or_else(|| REPLY_FALLBACK.to_string());
                ChatMessage::local(Sender::Agent, &body, 1)
            }
            Err(e) => {
                tracing::error!(agent_id = self.agent_id, error = %e, "sending message failed");
                ChatMessage { is_error: true, ..ChatMessage::local(Sender::Agent, SEND_FAILURE, 1) }
            }
        };
        self.messages.push(reply);
        self.messages.last()
    }

    /// Deletes the stored history, then empties the view. On failure nothing changes.
    pub async fn clear(&mut self, api: &ApiClient) -> bool {
        match api.delete_chats(self.agent_id).await {
            Ok(_) => {
                self.messages.clear();
                true
            }
            Err(e) => {
                tracing::error!(agent_id = self.agent_id, error = %e, "clearing chat failed");
                false
            }
        }
    }

    pub fn toggle_tool(&mut self, tool_id: i64) {
        if !self.selected_tools.remove(&tool_id) {
            self.selected_tools.insert(tool_id);
        }
    }
}
