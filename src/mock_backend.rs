//! In-process stand-in for the REST backend, used by tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use url::Url;

use crate::client::ApiClient;
use crate::session::{MemoryTokenStorage, SessionStore};

type Rejection = (StatusCode, Json<Value>);
type Reply = Result<(StatusCode, Json<Value>), Rejection>;

fn reject(status: StatusCode, message: &str) -> Rejection {
    (status, Json(json!({ "message": message })))
}

fn ok(body: Value) -> Reply {
    Ok((StatusCode::OK, Json(body)))
}

#[derive(Debug, Clone)]
struct MockUser {
    id: i64,
    username: String,
    email: String,
    password: String,
    is_admin: bool,
}

impl MockUser {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id, "username": self.username, "email": self.email,
            "created_at": "2024-05-01T10:00:00", "is_active": true, "is_admin": self.is_admin
        })
    }
}

#[derive(Default)]
struct Db {
    next_id: i64,
    users: Vec<MockUser>,
    tokens: HashMap<String, i64>,
    /// (owner, agent json)
    agents: Vec<(i64, Value)>,
    tools: Vec<Value>,
    /// (agent id, entry json)
    chats: Vec<(i64, Value)>,
    logs: Vec<String>,
    last_authorization: Option<String>,
}

impl Db {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_user(&mut self, username: &str, email: &str, password: &str, is_admin: bool) -> i64 {
        let id = self.id();
        self.users.push(MockUser {
            id,
            username: username.into(),
            email: email.into(),
            password: password.into(),
            is_admin,
        });
        self.logs.push(format!("Nuevo usuario registrado: {username} ({email})"));
        id
    }

    fn token_for(&mut self, user_id: i64, fixed: Option<&str>) -> String {
        let token = fixed.map(str::to_string).unwrap_or_else(|| format!("tok-{user_id}-{}", self.tokens.len()));
        self.tokens.insert(token.clone(), user_id);
        token
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<MockUser, Rejection> {
        let header = headers.get("authorization").and_then(|v| v.to_str().ok());
        let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
            return Err(reject(StatusCode::UNAUTHORIZED, "Token requerido"));
        };
        self.tokens
            .get(token)
            .and_then(|id| self.users.iter().find(|u| u.id == *id))
            .cloned()
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Token inválido o expirado"))
    }

    fn owned_agent(&mut self, owner: i64, agent_id: i64) -> Result<&mut Value, Rejection> {
        self.agents
            .iter_mut()
            .find(|(o, a)| *o == owner && a["id"] == agent_id)
            .map(|(_, a)| a)
            .ok_or_else(|| reject(StatusCode::NOT_FOUND, "Agente no encontrado"))
    }
}

#[derive(Clone, Default)]
struct MockState {
    db: Arc<RwLock<Db>>,
}

async fn record_authorization(State(state): State<MockState>, req: Request, next: Next) -> Response {
    let auth = req.headers().get("authorization").and_then(|v| v.to_str().ok()).map(str::to_string);
    state.db.write().await.last_authorization = auth;
    next.run(req).await
}

async fn status(State(state): State<MockState>, headers: HeaderMap) -> Reply {
    let db = state.db.read().await;
    let user = db.authenticate(&headers).ok();
    ok(json!({ "status": "ok", "authenticated": user.is_some(), "user": user.map(|u| u.to_json()) }))
}

async fn login(State(state): State<MockState>, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    let login = body["login"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    if login.is_empty() || password.is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "Login y password son requeridos"));
    }
    let Some(user) = db
        .users
        .iter()
        .find(|u| (u.username == login || u.email == login.to_lowercase()) && u.password == password)
        .cloned()
    else {
        db.logs.push(format!("Login fallido para '{login}'"));
        return Err(reject(StatusCode::UNAUTHORIZED, "Credenciales inválidas"));
    };
    let preset = db.tokens.iter().find(|(_, id)| **id == user.id).map(|(t, _)| t.clone());
    let token = match preset {
        Some(t) => t,
        None => db.token_for(user.id, None),
    };
    db.logs.push(format!("Login exitoso: {}", user.username));
    ok(json!({ "message": "Login exitoso", "user": user.to_json(), "token": token }))
}

async fn register(State(state): State<MockState>, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    let username = body["username"].as_str().unwrap_or_default();
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    if db.users.iter().any(|u| u.username == username) {
        return Err(reject(StatusCode::CONFLICT, "El username ya está en uso"));
    }
    if db.users.iter().any(|u| u.email == email) {
        return Err(reject(StatusCode::CONFLICT, "El email ya está registrado"));
    }
    let id = db.add_user(username, email, password, false);
    let token = db.token_for(id, None);
    let user = db.users.iter().find(|u| u.id == id).map(MockUser::to_json);
    Ok((StatusCode::CREATED, Json(json!({ "message": "Usuario registrado exitosamente", "user": user, "token": token }))))
}

async fn me(State(state): State<MockState>, headers: HeaderMap) -> Reply {
    let user = state.db.read().await.authenticate(&headers)?;
    ok(json!({ "user": user.to_json() }))
}

async fn change_password(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    let entry = db.users.iter_mut().find(|u| u.id == user.id).ok_or_else(|| reject(StatusCode::NOT_FOUND, "Usuario no encontrado"))?;
    if body["current_password"].as_str() != Some(entry.password.as_str()) {
        return Err(reject(StatusCode::UNAUTHORIZED, "Contraseña actual incorrecta"));
    }
    entry.password = body["new_password"].as_str().unwrap_or_default().to_string();
    ok(json!({ "message": "Contraseña actualizada" }))
}

async fn update_profile(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    let entry = db.users.iter_mut().find(|u| u.id == user.id).ok_or_else(|| reject(StatusCode::NOT_FOUND, "Usuario no encontrado"))?;
    if let Some(u) = body["username"].as_str() {
        entry.username = u.to_string();
    }
    if let Some(e) = body["email"].as_str() {
        entry.email = e.to_string();
    }
    ok(json!({ "message": "Perfil actualizado", "user": entry.to_json() }))
}

fn agent_json(id: i64, body: &Value) -> Value {
    json!({
        "id": id,
        "name": body["name"],
        "prompt": body["prompt"],
        "provider": body.get("llm_provider").cloned().unwrap_or(json!("openai")),
        "model": body["model"],
        "temperature": body.get("temperature").cloned().unwrap_or(json!(0.1)),
        "max_tokens": body.get("max_tokens").cloned().unwrap_or(json!(50)),
        "tools": body.get("tools").cloned().unwrap_or(json!([])),
    })
}

async fn list_agents(State(state): State<MockState>, headers: HeaderMap) -> Reply {
    let db = state.db.read().await;
    let user = db.authenticate(&headers)?;
    let agents: Vec<Value> = db.agents.iter().filter(|(o, _)| *o == user.id).map(|(_, a)| a.clone()).collect();
    ok(json!(agents))
}

async fn create_agent(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    for field in ["name", "prompt", "llm_provider", "model"] {
        if body[field].as_str().unwrap_or_default().is_empty() {
            return Err(reject(StatusCode::BAD_REQUEST, &format!("El campo {field} es requerido")));
        }
    }
    let id = db.id();
    let agent = agent_json(id, &body);
    db.agents.push((user.id, agent.clone()));
    Ok((StatusCode::CREATED, Json(json!({ "message": "Agente creado exitosamente", "agent_id": id, "agent": agent }))))
}

async fn get_agent(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    let agent = db.owned_agent(user.id, id)?.clone();
    ok(agent)
}

async fn update_agent(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    let agent = db.owned_agent(user.id, id)?;
    *agent = agent_json(id, &body);
    ok(json!({ "message": "Agente actualizado correctamente" }))
}

async fn delete_agent(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    db.owned_agent(user.id, id)?;
    db.agents.retain(|(_, a)| a["id"] != id);
    db.chats.retain(|(agent, _)| *agent != id);
    ok(json!({ "message": "Agente eliminado correctamente" }))
}

async fn list_chats(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    db.owned_agent(user.id, id)?;
    let chats: Vec<Value> = db.chats.iter().filter(|(a, _)| *a == id).map(|(_, c)| c.clone()).collect();
    ok(json!(chats))
}

async fn delete_chats(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    db.owned_agent(user.id, id)?;
    db.chats.retain(|(a, _)| *a != id);
    ok(json!({ "message": "Chats eliminados correctamente" }))
}

async fn chat(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    let user = db.authenticate(&headers)?;
    let Some(message) = body["message"].as_str().filter(|m| !m.is_empty()).map(str::to_string) else {
        return Err(reject(StatusCode::BAD_REQUEST, "Mensaje requerido"));
    };
    db.owned_agent(user.id, id)?;
    let answer = format!("eco: {message}");
    for (role, text) in [("user", message), ("assistant", answer.clone())] {
        let entry_id = db.id();
        db.chats.push((id, json!({ "id": entry_id, "message": text, "role": role, "timestamp": "2024-05-01T10:00:00" })));
    }
    ok(json!({ "respuesta": answer }))
}

async fn list_tools(State(state): State<MockState>, headers: HeaderMap) -> Reply {
    let db = state.db.read().await;
    db.authenticate(&headers)?;
    ok(json!(db.tools))
}

async fn create_tool(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    db.authenticate(&headers)?;
    if body["name"].as_str().unwrap_or_default().is_empty() || body["description"].as_str().unwrap_or_default().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "Nombre y descripción son requeridos"));
    }
    let id = db.id();
    let tool = json!({ "id": id, "name": body["name"], "description": body["description"], "parameters": body["parameters"] });
    db.tools.push(tool.clone());
    Ok((StatusCode::CREATED, Json(json!({ "message": "Tool creada exitosamente", "tool_id": id, "tool": tool }))))
}

async fn update_tool(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    db.authenticate(&headers)?;
    let tool = db.tools.iter_mut().find(|t| t["id"] == id).ok_or_else(|| reject(StatusCode::NOT_FOUND, "Tool no encontrada"))?;
    for field in ["name", "description", "parameters"] {
        if let Some(v) = body.get(field) {
            tool[field] = v.clone();
        }
    }
    ok(json!({ "message": "Tool actualizada correctamente" }))
}

async fn delete_tool(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let mut db = state.db.write().await;
    db.authenticate(&headers)?;
    let before = db.tools.len();
    db.tools.retain(|t| t["id"] != id);
    if db.tools.len() == before {
        return Err(reject(StatusCode::NOT_FOUND, "Tool no encontrada"));
    }
    ok(json!({ "message": "Tool eliminada correctamente" }))
}

fn require_admin(db: &Db, headers: &HeaderMap) -> Result<MockUser, Rejection> {
    let user = db.authenticate(headers)?;
    if !user.is_admin {
        return Err(reject(StatusCode::FORBIDDEN, "Acceso denegado"));
    }
    Ok(user)
}

async fn admin_users(State(state): State<MockState>, headers: HeaderMap) -> Reply {
    let db = state.db.read().await;
    require_admin(&db, &headers)?;
    let users: Vec<Value> = db.users.iter().map(MockUser::to_json).collect();
    ok(json!({ "users": users }))
}

async fn admin_role(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<i64>, Json(body): Json<Value>) -> Reply {
    let mut db = state.db.write().await;
    let admin = require_admin(&db, &headers)?;
    if admin.id == id {
        return Err(reject(StatusCode::BAD_REQUEST, "No puedes modificar tu propio rol"));
    }
    let Some(is_admin) = body["is_admin"].as_bool() else {
        return Err(reject(StatusCode::BAD_REQUEST, "El campo \"is_admin\" es requerido"));
    };
    let user = db.users.iter_mut().find(|u| u.id == id).ok_or_else(|| reject(StatusCode::NOT_FOUND, "Usuario no encontrado"))?;
    user.is_admin = is_admin;
    ok(json!({ "message": format!("Rol de usuario \"{}\" actualizado correctamente", user.username) }))
}

async fn admin_logs(State(state): State<MockState>, headers: HeaderMap) -> Reply {
    let db = state.db.read().await;
    require_admin(&db, &headers)?;
    let logs: Vec<Value> = db
        .logs
        .iter()
        .enumerate()
        .map(|(i, e)| json!({ "id": i + 1, "timestamp": "2024-05-01T10:00:00", "event": e }))
        .collect();
    ok(json!(logs))
}

pub struct MockBackend {
    addr: SocketAddr,
    state: MockState,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = MockState::default();
        let api = Router::new()
            .route("/status", get(status))
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/me", get(me))
            .route("/auth/change-password", put(change_password))
            .route("/auth/update-profile", put(update_profile))
            .route("/agents", get(list_agents).post(create_agent))
            .route("/agents/:id", get(get_agent).put(update_agent).delete(delete_agent))
            .route("/agents/:id/chats", get(list_chats).delete(delete_chats))
            .route("/chat/:id", post(chat))
            .route("/tools", get(list_tools).post(create_tool))
            .route("/tools/:id", put(update_tool).delete(delete_tool))
            .route("/admin/users", get(admin_users))
            .route("/admin/users/:id/role", put(admin_role))
            .route("/admin/logs", get(admin_logs));
        let app = Router::new()
            .nest("/api", api)
            .layer(middleware::from_fn_with_state(state.clone(), record_authorization))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api/", self.addr)).unwrap()
    }

    pub async fn last_authorization(&self) -> Option<String> {
        self.state.db.read().await.last_authorization.clone()
    }

    /// Registers `username` (password `pw`) if needed and hands out a valid token.
    pub async fn issue_token(&self, username: &str) -> String {
        self.issue(username, false).await
    }

    async fn issue(&self, username: &str, is_admin: bool) -> String {
        let mut db = self.state.db.write().await;
        let id = match db.users.iter().find(|u| u.username == username) {
            Some(u) => u.id,
            None => db.add_user(username, &format!("{username}@example.com"), "pw", is_admin),
        };
        db.token_for(id, None)
    }

    pub async fn add_user(&self, username: &str, password: &str, token: Option<&str>) -> i64 {
        let mut db = self.state.db.write().await;
        let id = db.add_user(username, &format!("{username}@example.com"), password, false);
        if token.is_some() {
            db.token_for(id, token);
        }
        id
    }

    pub async fn revoke_all_tokens(&self) {
        self.state.db.write().await.tokens.clear();
    }

    pub async fn seed_tool(&self, name: &str) -> i64 {
        let mut db = self.state.db.write().await;
        let id = db.id();
        db.tools.push(json!({ "id": id, "name": name, "description": format!("{name} tool") }));
        id
    }

    pub async fn seed_agent(&self, owner: &str, name: &str) -> i64 {
        let mut db = self.state.db.write().await;
        let owner_id = db.users.iter().find(|u| u.username == owner).map(|u| u.id).unwrap();
        let id = db.id();
        let agent = agent_json(id, &json!({ "name": name, "prompt": "Repite", "model": "gpt-4-turbo" }));
        db.agents.push((owner_id, agent));
        id
    }

    async fn client_with_token(&self, token: String) -> ApiClient {
        let store = Arc::new(SessionStore::new(Arc::new(MemoryTokenStorage::default())));
        store.set(&token).await.unwrap();
        ApiClient::new(self.base_url(), store).unwrap()
    }

    pub async fn logged_in_client(&self, username: &str) -> ApiClient {
        let token = self.issue(username, false).await;
        self.client_with_token(token).await
    }

    pub async fn logged_in_admin(&self, username: &str) -> ApiClient {
        let token = self.issue(username, true).await;
        self.client_with_token(token).await
    }
}
