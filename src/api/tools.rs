use super::TOOLS;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::{MutationResponse, Tool, ToolDraft};

impl ApiClient {
    pub async fn fetch_tools(&self) -> Result<Vec<Tool>, ApiError> {
        self.get(TOOLS).await
    }

    pub async fn create_tool(&self, tool: &ToolDraft) -> Result<MutationResponse, ApiError> {
        self.post(TOOLS, tool).await
    }

    pub async fn update_tool(&self, tool_id: i64, tool: &ToolDraft) -> Result<MutationResponse, ApiError> {
        self.put(&format!("{TOOLS}/{tool_id}"), tool).await
    }

    pub async fn delete_tool(&self, tool_id: i64) -> Result<MutationResponse, ApiError> {
        self.delete(&format!("{TOOLS}/{tool_id}")).await
    }
}
