use serde_json::json;

use super::{AGENTS, CHAT};
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::{ChatLogEntry, ChatMessage, ChatReply, MutationResponse};

impl ApiClient {
    /// Stored history for an agent, oldest first.
    pub async fn fetch_chats(&self, agent_id: i64) -> Result<Vec<ChatMessage>, ApiError> {
        let entries: Vec<ChatLogEntry> = self.get(&format!("{AGENTS}/{agent_id}/chats")).await?;
        Ok(entries.into_iter().map(ChatMessage::from).collect())
    }

    pub async fn send_message(&self, agent_id: i64, message: &str) -> Result<ChatReply, ApiError> {
        self.post(&format!("{CHAT}/{agent_id}"), &json!({ "message": message })).await
    }

    pub async fn delete_chats(&self, agent_id: i64) -> Result<MutationResponse, ApiError> {
        self.delete(&format!("{AGENTS}/{agent_id}/chats")).await
    }
}
