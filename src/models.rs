use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const AGENT_PROVIDER: &str = "openai";
pub const AGENT_TEMPERATURE: f32 = 0.7;
pub const AGENT_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
pub enum AgentModel {
    #[default]
    #[serde(rename = "gpt-4-turbo")]
    #[value(name = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "gpt-3.5-turbo")]
    #[value(name = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub provider: String,
    /// Kept as text, the backend may hold models this client does not offer.
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub tools: Vec<AgentToolRef>,
}

/// The agent list returns tool names, the single-agent endpoint returns `{id, name}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AgentToolRef {
    Name(String),
    Entry { id: i64, name: String },
}

impl AgentToolRef {
    pub fn name(&self) -> &str {
        match self {
            AgentToolRef::Name(n) => n,
            AgentToolRef::Entry { name, .. } => name,
        }
    }
}

/// Body for creating or updating an agent. Provider, temperature and token
/// limit are fixed by the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentDraft {
    pub name: String,
    pub prompt: String,
    pub llm_provider: String,
    pub model: AgentModel,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Tool names.
    pub tools: Vec<String>,
}

impl AgentDraft {
    pub fn new(name: &str, prompt: &str, model: AgentModel, tools: Vec<String>) -> Result<Self, ApiError> {
        if name.trim().is_empty() || prompt.trim().is_empty() {
            return Err(ApiError::Invalid("name and prompt are required".into()));
        }
        Ok(Self {
            name: name.to_string(),
            prompt: prompt.to_string(),
            llm_provider: AGENT_PROVIDER.into(),
            model,
            temperature: AGENT_TEMPERATURE,
            max_tokens: AGENT_MAX_TOKENS,
            tools,
        })
    }

    /// Add the tool if absent, remove it otherwise.
    pub fn toggle_tool(&mut self, tool_name: &str) {
        if let Some(pos) = self.tools.iter().position(|t| t == tool_name) {
            self.tools.remove(pos);
        } else {
            self.tools.push(tool_name.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, ParamSpec>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self { kind: "object".into(), properties: BTreeMap::new(), required: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ToolParameters>,
}

/// One parameter row as entered in the tool form.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRow {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

impl ParamRow {
    /// Parses `name[:type[:description]]`; a trailing `?` on the name marks it optional.
    pub fn parse(spec: &str) -> Result<Self, ApiError> {
        let mut parts = spec.splitn(3, ':');
        let raw_name = parts.next().unwrap_or_default().trim();
        let (name, required) = match raw_name.strip_suffix('?') {
            Some(n) => (n.trim(), false),
            None => (raw_name, true),
        };
        let kind = match parts.next().map(str::trim) {
            None | Some("") => ParamType::String,
            Some(t) => ParamType::from_str(t, true)
                .map_err(|_| ApiError::Invalid(format!("unknown parameter type `{t}`")))?,
        };
        let description = parts.next().unwrap_or_default().trim().to_string();
        Ok(Self { name: name.to_string(), kind, description, required })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDraft {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

impl ToolDraft {
    pub fn from_rows(name: &str, description: &str, rows: &[ParamRow]) -> Result<Self, ApiError> {
        let mut parameters = ToolParameters::default();
        for row in rows {
            let param = row.name.trim();
            if param.is_empty() {
                return Err(ApiError::Invalid("every parameter needs a name and a type".into()));
            }
            let description = (!row.description.is_empty()).then(|| row.description.clone());
            let kind = serde_json::to_value(row.kind)?
                .as_str()
                .unwrap_or("string")
                .to_string();
            parameters.properties.insert(param.to_string(), ParamSpec { kind, description });
            if row.required {
                parameters.required.push(param.to_string());
            }
        }
        Ok(Self { name: name.to_string(), description: description.to_string(), parameters })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub message: String,
    pub sender: Sender,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_error: bool,
}

impl ChatMessage {
    /// Message created locally; the id is the creation time in milliseconds.
    pub fn local(sender: Sender, message: &str, offset: i64) -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis() + offset,
            message: message.to_string(),
            sender,
            timestamp: Some(now),
            is_error: false,
        }
    }
}

/// History entry as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatLogEntry {
    pub id: i64,
    pub message: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl From<ChatLogEntry> for ChatMessage {
    fn from(e: ChatLogEntry) -> Self {
        let sender = match e.role.as_deref() {
            Some("user") | None => Sender::User,
            Some(_) => Sender::Agent,
        };
        let timestamp = e.timestamp.as_deref().and_then(parse_timestamp);
        Self { id: e.id, message: e.message, sender, timestamp, is_error: false }
    }
}

/// The backend emits naive ISO timestamps in UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChatReply {
    #[serde(default)]
    pub respuesta: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: i64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, alias = "event")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: &str, password: &str) -> Result<Self, ApiError> {
        if login.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Invalid("Todos los campos son obligatorios".into()));
        }
        Ok(Self { login: login.trim().to_string(), password: password.to_string() })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern compiles")
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    /// Applies the same rules the backend enforces so obvious mistakes never leave the client.
    pub fn new(username: &str, email: &str, password: &str) -> Result<Self, ApiError> {
        let username = username.trim();
        let email = email.trim().to_lowercase();
        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(ApiError::Invalid("Username, email y password son requeridos".into()));
        }
        if username.chars().count() < 3 {
            return Err(ApiError::Invalid("El username debe tener al menos 3 caracteres".into()));
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(ApiError::Invalid("Formato de email inválido".into()));
        }
        if password.chars().count() < 6 {
            return Err(ApiError::Invalid("La contraseña debe tener al menos 6 caracteres".into()));
        }
        if !password.chars().any(|c| c.is_ascii_alphabetic()) {
            return Err(ApiError::Invalid("La contraseña debe contener al menos una letra".into()));
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(ApiError::Invalid("La contraseña debe contener al menos un número".into()));
        }
        Ok(Self { username: username.to_string(), email, password: password.to_string() })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleChange {
    pub is_admin: bool,
}

/// Reply to create/update/delete calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MutationResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default)]
    pub tool_id: Option<i64>,
    #[serde(default)]
    pub agent: Option<Agent>,
    #[serde(default)]
    pub tool: Option<Tool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendStatus {
    pub status: String,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<User>,
}
