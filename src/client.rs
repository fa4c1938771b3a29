use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;

use crate::error::ApiError;
use crate::session::SessionState;

/// Emitted by the client when the backend stops accepting the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Invalidated,
}

/// Request dispatch shared by every API call.
///
/// Each request goes through [`ApiClient::decorate`], which attaches the
/// current bearer token if there is one. A 401 from any endpoint clears the
/// session and broadcasts [`SessionEvent::Invalidated`]; every other
/// response is handed back untouched. No retries, caching or coalescing.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<dyn SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    pub fn new(base_url: Url, session: Arc<dyn SessionState>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        let (events, _) = broadcast::channel(16);
        Ok(Self { http, base_url, session, events })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &Arc<dyn SessionState> {
        &self.session
    }

    /// Attaches `Authorization: Bearer <token>` when a token is held.
    pub async fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        match self.session.token().await {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<(), T>(Method::DELETE, path, None).await
    }

    pub async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        match self.dispatch(method, path, body).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            // 204 and other bodyless successes: `()`/`Option`/`Value` take null, structs an empty object
            None => serde_json::from_value(Value::Null)
                .or_else(|_| serde_json::from_value(Value::Object(Default::default())))
                .map_err(ApiError::from),
        }
    }

    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<Value>, ApiError> {
        let url = self.url(path)?;
        tracing::debug!(method = %method, path = %url.path(), "dispatching request");

        let mut rb = self.http.request(method.clone(), url);
        if let Some(b) = body {
            rb = rb.json(b);
        }
        let rb = self.decorate(rb).await;

        let resp = match rb.send().await {
            Ok(r) => r,
            Err(e) => {
                metrics::counter!("api_requests_total", "method" => method.to_string(), "status" => "transport").increment(1);
                tracing::warn!(error = %e, "request failed before a response arrived");
                return Err(ApiError::Transport(e));
            }
        };
        let status = resp.status();
        metrics::counter!("api_requests_total", "method" => method.to_string(), "status" => status_class(status)).increment(1);

        let bytes = resp.bytes().await?;
        let payload = (!bytes.is_empty()).then(|| serde_json::from_slice::<Value>(&bytes));

        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_session().await;
            return Err(ApiError::from_status(status, payload.and_then(Result::ok)));
        }
        if !status.is_success() {
            tracing::debug!(status = %status, "backend rejected request");
            return Err(ApiError::from_status(status, payload.and_then(Result::ok)));
        }
        Ok(payload.transpose()?)
    }

    /// Clears the session and broadcasts `Invalidated`; a slot failure is only logged.
    async fn invalidate_session(&self) {
        tracing::warn!("session expired or unauthorized, redirecting to login");
        metrics::counter!("api_session_invalidations_total").increment(1);
        if let Err(e) = self.session.invalidate().await {
            tracing::error!(error = %e, "could not clear the stored session");
        }
        // Nobody listening is fine, the shell may not exist (one-shot commands).
        let _ = self.events.send(SessionEvent::Invalidated);
    }
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
