//! One method per backend operation, all dispatched through [`ApiClient`].
//!
//! Calls resolve with the backend payload (unwrapped where the backend nests
//! it) and propagate failures unchanged. Only `login` has a side effect
//! beyond the request: it hands the returned token to the session store.

use serde::Deserialize;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::BackendStatus;

pub mod admin;
pub mod agents;
pub mod auth;
pub mod chat;
pub mod tools;

const AUTH: &str = "/auth";
const AGENTS: &str = "/agents";
const TOOLS: &str = "/tools";
const CHAT: &str = "/chat";
const ADMIN: &str = "/admin";

/// Some admin endpoints answer `{ "<field>": [...] }`, others a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Users { users: Vec<T> },
    Logs { logs: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Users { users } => users,
            Listing::Logs { logs } => logs,
            Listing::Bare(v) => v,
        }
    }
}

impl ApiClient {
    /// Connectivity check; works with or without a session.
    pub async fn status(&self) -> Result<BackendStatus, ApiError> {
        self.get("/status").await
    }
}
