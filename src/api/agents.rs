use super::AGENTS;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::{Agent, AgentDraft, MutationResponse};

impl ApiClient {
    pub async fn fetch_agents(&self) -> Result<Vec<Agent>, ApiError> {
        self.get(AGENTS).await
    }

    pub async fn fetch_agent(&self, agent_id: i64) -> Result<Agent, ApiError> {
        self.get(&format!("{AGENTS}/{agent_id}")).await
    }

    pub async fn create_agent(&self, agent: &AgentDraft) -> Result<MutationResponse, ApiError> {
        self.post(AGENTS, agent).await
    }

    pub async fn update_agent(&self, agent_id: i64, agent: &AgentDraft) -> Result<MutationResponse, ApiError> {
        self.put(&format!("{AGENTS}/{agent_id}"), agent).await
    }

    pub async fn delete_agent(&self, agent_id: i64) -> Result<MutationResponse, ApiError> {
        self.delete(&format!("{AGENTS}/{agent_id}")).await
    }
}
