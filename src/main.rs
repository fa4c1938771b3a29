use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod chat;
mod client;
mod error;
mod guard;
mod models;
mod session;
mod settings;
mod shell;

#[cfg(test)]
mod mock_backend;

use crate::chat::ChatView;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::guard::Route;
use crate::models::{AgentDraft, AgentModel, Credentials, ParamRow, ProfileUpdate, Registration, Sender, ToolDraft};
use crate::session::{FileTokenStorage, SessionStore};
use crate::settings::{BuildMode, CliOverrides, EnvDefaults};
use crate::shell::Shell;

#[derive(Debug, Parser)]
#[command(name = "crew_client")]
#[command(about = "Command-line client for the agent and tool manager", long_about = None)]
struct Cli {
    /// Backend flavour; defaults to the build profile.
    #[arg(long, value_enum, global = true)]
    mode: Option<BuildMode>,
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Login {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Resolve a path the way the web app would and print where it lands.
    Open { path: String },
    Status,
    Whoami,
    Profile,
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    UpdateProfile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    #[command(subcommand)]
    Agents(AgentCommand),
    #[command(subcommand)]
    Tools(ToolCommand),
    #[command(subcommand)]
    Chat(ChatCommand),
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Debug, Args)]
struct AgentFields {
    #[arg(long)]
    name: String,
    #[arg(long)]
    prompt: String,
    #[arg(long, value_enum, default_value_t = AgentModel::Gpt4Turbo)]
    model: AgentModel,
    /// Tool name; repeat for several.
    #[arg(long = "tool")]
    tools: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum AgentCommand {
    List,
    Show { id: i64 },
    Create(AgentFields),
    Update {
        id: i64,
        #[command(flatten)]
        fields: AgentFields,
    },
    Delete { id: i64 },
}

#[derive(Debug, Args)]
struct ToolFields {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: String,
    /// `name[?][:type[:description]]`, `?` marks the parameter optional.
    #[arg(long = "param")]
    params: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum ToolCommand {
    List,
    Create(ToolFields),
    Update {
        id: i64,
        #[command(flatten)]
        fields: ToolFields,
    },
    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
enum ChatCommand {
    History { agent: i64 },
    Send {
        agent: i64,
        message: String,
        /// Tool id to mark active for this conversation.
        #[arg(long = "tool")]
        tools: Vec<i64>,
    },
    Clear { agent: i64 },
}

#[derive(Debug, Subcommand)]
enum AdminCommand {
    Users,
    SetAdmin {
        user_id: i64,
        #[arg(action = clap::ArgAction::Set)]
        is_admin: bool,
    },
    Logs,
}

struct App {
    client: ApiClient,
    shell: Shell,
}

impl App {
    /// Enters a guarded view, failing when there is no session to enter it with.
    async fn enter(&mut self, route: Route) -> anyhow::Result<()> {
        self.shell.navigate(route.path()).await?;
        if self.shell.location() != route {
            anyhow::bail!("no active session, run `crew_client login` first");
        }
        Ok(())
    }

    /// Turns an API failure into the message shown to the user.
    fn report(&mut self, err: ApiError, fallback: &str) -> anyhow::Error {
        tracing::debug!(status = ?err.status(), error = %err, "api call failed");
        if self.shell.poll_session_events() || err.is_unauthorized() {
            return anyhow::anyhow!("session expired or unauthorized, log in again");
        }
        anyhow::anyhow!(err.user_message(fallback))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_chat(view: &ChatView) {
    for m in view.messages() {
        let who = match m.sender {
            Sender::User => "tú",
            Sender::Agent => "agente",
        };
        let time = m.timestamp.map(|t| t.format("%H:%M").to_string()).unwrap_or_default();
        let marker = if m.is_error { " (!)" } else { "" };
        println!("[{time}] {who}{marker}: {}", m.message);
    }
}

fn param_rows(specs: &[String]) -> Result<Vec<ParamRow>, ApiError> {
    specs.iter().map(|s| ParamRow::parse(s)).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let overrides = CliOverrides { mode: cli.mode, api_url: cli.api_url.clone(), token_file: cli.token_file.clone() };
    let settings = settings::resolve_settings(&overrides, &EnvDefaults::from_env())?;
    tracing::debug!(mode = ?settings.mode, base_url = %settings.base_url, "settings resolved");

    let store = Arc::new(SessionStore::new(Arc::new(FileTokenStorage::new(&settings.token_path))));
    store.load().await?;
    let client = ApiClient::new(settings.base_url.clone(), store.clone())?;
    let shell = Shell::new(&client, store.clone());
    let mut app = App { client, shell };

    run(&mut app, cli.command).await
}

async fn run(app: &mut App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login { login, password } => {
            let credentials = Credentials::new(&login, &password)?;
            let res = match app.client.login(&credentials).await {
                Ok(res) => res,
                Err(_) => anyhow::bail!("Credenciales inválidas o error del servidor"),
            };
            app.shell.navigate(Route::Main.path()).await?;
            let who = res.user.map(|u| u.username).unwrap_or(login);
            println!("{} ({who})", res.message.unwrap_or_else(|| "Login exitoso".into()));
        }
        Commands::Logout => {
            app.shell.navigate(Route::Logout.path()).await?;
            println!("sesión cerrada");
        }
        Commands::Register { username, email, password } => {
            let registration = Registration::new(&username, &email, &password)?;
            let res = app
                .client
                .register(&registration)
                .await
                .map_err(|e| app.report(e, "Error al registrar usuario"))?;
            println!("{}", res.message.unwrap_or_else(|| "Usuario registrado".into()));
            app.shell.navigate(Route::Login.path()).await?;
        }
        Commands::Open { path } => {
            let landed = app.shell.navigate(&path).await?;
            println!("{landed}");
        }
        Commands::Status => {
            let status = app.client.status().await.map_err(|e| app.report(e, "backend unreachable"))?;
            print_json(&status)?;
        }
        Commands::Whoami => {
            app.enter(Route::Main).await?;
            let user = app.client.get_current_user().await.map_err(|e| app.report(e, "Error al obtener usuario"))?;
            let role = if user.is_admin { " [admin]" } else { "" };
            println!("{} <{}>{role}", user.username, user.email);
        }
        Commands::Profile => {
            app.enter(Route::Main).await?;
            let profile = app.client.get_profile().await.map_err(|e| app.report(e, "Error al obtener perfil"))?;
            print_json(&profile)?;
        }
        Commands::ChangePassword { current, new } => {
            app.enter(Route::Main).await?;
            let res = app
                .client
                .change_password(&current, &new)
                .await
                .map_err(|e| app.report(e, "Error al cambiar la contraseña"))?;
            println!("{}", res.message.unwrap_or_default());
        }
        Commands::UpdateProfile { username, email } => {
            app.enter(Route::Main).await?;
            let update = ProfileUpdate { username, email };
            let res = app
                .client
                .update_profile(&update)
                .await
                .map_err(|e| app.report(e, "Error al actualizar el perfil"))?;
            println!("{}", res.message.unwrap_or_default());
        }
        Commands::Agents(cmd) => {
            app.enter(Route::Main).await?;
            run_agents(app, cmd).await?;
        }
        Commands::Tools(cmd) => {
            app.enter(Route::Main).await?;
            run_tools(app, cmd).await?;
        }
        Commands::Chat(cmd) => {
            app.enter(Route::Main).await?;
            run_chat(app, cmd).await?;
        }
        Commands::Admin(cmd) => {
            app.enter(Route::AdminDashboard).await?;
            let is_admin = app.client.is_admin().await.map_err(|e| app.report(e, "Error al obtener usuario"))?;
            if !is_admin {
                anyhow::bail!("Acceso denegado: se requieren permisos de administrador");
            }
            run_admin(app, cmd).await?;
        }
    }
    Ok(())
}

async fn run_agents(app: &mut App, cmd: AgentCommand) -> anyhow::Result<()> {
    match cmd {
        AgentCommand::List => {
            let agents = app.client.fetch_agents().await.map_err(|e| app.report(e, "Error al cargar agentes"))?;
            for a in &agents {
                let tools: Vec<&str> = a.tools.iter().map(|t| t.name()).collect();
                println!("{:>4}  {}  ({})  [{}]", a.id, a.name, a.model, tools.join(", "));
            }
        }
        AgentCommand::Show { id } => {
            let agent = app.client.fetch_agent(id).await.map_err(|e| app.report(e, "Error al cargar el agente"))?;
            print_json(&agent)?;
        }
        AgentCommand::Create(f) => {
            let draft = AgentDraft::new(&f.name, &f.prompt, f.model, f.tools)?;
            let res = app.client.create_agent(&draft).await.map_err(|e| app.report(e, "Error al guardar el agente."))?;
            println!("{} (id {})", res.message.unwrap_or_default(), res.agent_id.unwrap_or_default());
            if let Some(agent) = res.agent {
                print_json(&agent)?;
            }
        }
        AgentCommand::Update { id, fields: f } => {
            let draft = AgentDraft::new(&f.name, &f.prompt, f.model, f.tools)?;
            let res = app.client.update_agent(id, &draft).await.map_err(|e| app.report(e, "Error al guardar el agente."))?;
            println!("{}", res.message.unwrap_or_default());
        }
        AgentCommand::Delete { id } => {
            app.client.delete_agent(id).await.map_err(|e| app.report(e, "Error al eliminar el agente"))?;
            let remaining = app.client.fetch_agents().await.map_err(|e| app.report(e, "Error al cargar agentes"))?;
            println!("agente {id} eliminado, quedan {}", remaining.len());
        }
    }
    Ok(())
}

async fn run_tools(app: &mut App, cmd: ToolCommand) -> anyhow::Result<()> {
    match cmd {
        ToolCommand::List => {
            let tools = app.client.fetch_tools().await.map_err(|e| app.report(e, "Error al cargar herramientas"))?;
            for t in &tools {
                println!("{:>4}  {}  {}", t.id, t.name, t.description);
            }
        }
        ToolCommand::Create(f) => {
            let draft = ToolDraft::from_rows(&f.name, &f.description, &param_rows(&f.params)?)?;
            let res = app.client.create_tool(&draft).await.map_err(|e| app.report(e, "Error al guardar la herramienta."))?;
            println!("{} (id {})", res.message.unwrap_or_default(), res.tool_id.unwrap_or_default());
            if let Some(tool) = res.tool {
                print_json(&tool)?;
            }
        }
        ToolCommand::Update { id, fields: f } => {
            let draft = ToolDraft::from_rows(&f.name, &f.description, &param_rows(&f.params)?)?;
            let res = app.client.update_tool(id, &draft).await.map_err(|e| app.report(e, "Error al guardar la herramienta."))?;
            println!("{}", res.message.unwrap_or_default());
        }
        ToolCommand::Delete { id } => {
            app.client.delete_tool(id).await.map_err(|e| app.report(e, "Error al eliminar la herramienta"))?;
            let remaining = app.client.fetch_tools().await.map_err(|e| app.report(e, "Error al cargar herramientas"))?;
            println!("herramienta {id} eliminada, quedan {}", remaining.len());
        }
    }
    Ok(())
}

async fn run_chat(app: &mut App, cmd: ChatCommand) -> anyhow::Result<()> {
    match cmd {
        ChatCommand::History { agent } => {
            let mut view = ChatView::new(agent);
            view.load(&app.client).await;
            print_chat(&view);
        }
        ChatCommand::Send { agent, message, tools } => {
            let mut view = ChatView::new(agent);
            for id in tools {
                view.toggle_tool(id);
            }
            if !view.selected_tools().is_empty() {
                let available = match app.client.fetch_tools().await {
                    Ok(tools) => tools,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not resolve selected tool names");
                        Vec::new()
                    }
                };
                let active: Vec<&str> = available
                    .iter()
                    .filter(|t| view.selected_tools().contains(&t.id))
                    .map(|t| t.name.as_str())
                    .collect();
                println!("herramientas activas: {}", active.join(", "));
            }
            view.send(&app.client, &message).await;
            print_chat(&view);
        }
        ChatCommand::Clear { agent } => {
            let mut view = ChatView::new(agent);
            if view.clear(&app.client).await {
                println!("conversación eliminada");
            } else {
                anyhow::bail!("no se pudo limpiar la conversación");
            }
        }
    }
    if app.shell.poll_session_events() {
        anyhow::bail!("session expired or unauthorized, log in again");
    }
    Ok(())
}

async fn run_admin(app: &mut App, cmd: AdminCommand) -> anyhow::Result<()> {
    match cmd {
        AdminCommand::Users => {
            let users = app.client.fetch_users().await.map_err(|e| app.report(e, "Error al cargar usuarios"))?;
            for u in &users {
                let role = if u.is_admin { "admin" } else { "user" };
                println!("{:>4}  {:<20} {:<30} {role}", u.id, u.username, u.email);
            }
        }
        AdminCommand::SetAdmin { user_id, is_admin } => {
            let res = app
                .client
                .update_user_role(user_id, is_admin)
                .await
                .map_err(|e| app.report(e, "Error al actualizar el rol"))?;
            println!("{}", res.message.unwrap_or_default());
        }
        AdminCommand::Logs => {
            let logs = app.client.fetch_logs().await.map_err(|e| app.report(e, "Error al cargar logs"))?;
            for l in &logs {
                println!("{:>4}  {}  {}", l.id, l.timestamp.as_deref().unwrap_or("-"), l.message.as_deref().unwrap_or_default());
            }
        }
    }
    Ok(())
}
