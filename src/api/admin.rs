use super::{Listing, ADMIN};
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::{LogEntry, MutationResponse, RoleChange, User};

impl ApiClient {
    pub async fn fetch_users(&self) -> Result<Vec<User>, ApiError> {
        let listing: Listing<User> = self.get(&format!("{ADMIN}/users")).await?;
        Ok(listing.into_vec())
    }

    pub async fn update_user_role(&self, user_id: i64, is_admin: bool) -> Result<MutationResponse, ApiError> {
        self.put(&format!("{ADMIN}/users/{user_id}/role"), &RoleChange { is_admin }).await
    }

    pub async fn fetch_logs(&self) -> Result<Vec<LogEntry>, ApiError> {
        let listing: Listing<LogEntry> = self.get(&format!("{ADMIN}/logs")).await?;
        Ok(listing.into_vec())
    }
}
