use serde::Deserialize;

use super::AUTH;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::{AuthResponse, Credentials, MutationResponse, PasswordChange, ProfileUpdate, Registration, User};

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: User,
}

impl ApiClient {
    /// Authenticates and, when the backend returns a token, stores it before resolving.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let res: AuthResponse = self.post(&format!("{AUTH}/login"), credentials).await?;
        if let Some(token) = res.token.as_deref() {
            self.session().establish(token).await.map_err(ApiError::Session)?;
        }
        Ok(res)
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        self.post(&format!("{AUTH}/register"), registration).await
    }

    /// Raw `/auth/me` payload.
    pub async fn get_profile(&self) -> Result<serde_json::Value, ApiError> {
        self.get(&format!("{AUTH}/me")).await
    }

    pub async fn get_current_user(&self) -> Result<User, ApiError> {
        let envelope: UserEnvelope = self.get(&format!("{AUTH}/me")).await?;
        Ok(envelope.user)
    }

    /// Admin affordance: whether the signed-in user's profile carries `is_admin`.
    pub async fn is_admin(&self) -> Result<bool, ApiError> {
        Ok(self.get_current_user().await?.is_admin)
    }

    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<MutationResponse, ApiError> {
        let body = PasswordChange {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.put(&format!("{AUTH}/change-password"), &body).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<MutationResponse, ApiError> {
        self.put(&format!("{AUTH}/update-profile"), update).await
    }
}
