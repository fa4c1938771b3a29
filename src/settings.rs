use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use url::Url;

pub const PRODUCTION_API_URL: &str = "https://crewaiapp-production.up.railway.app/api";
pub const LOCAL_API_URL: &str = "http://localhost:5000/api";
pub const TOKEN_SLOT: &str = "jwtToken";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Production,
    Local,
}

impl BuildMode {
    /// Mode baked in by the compiler profile.
    pub fn compiled() -> Self {
        if cfg!(debug_assertions) { BuildMode::Local } else { BuildMode::Production }
    }
}

/// Values taken from command-line flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub mode: Option<BuildMode>,
    pub api_url: Option<String>,
    pub token_file: Option<PathBuf>,
}

/// Values taken from the process environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvDefaults {
    pub api_url: Option<String>,
    pub xdg_data_home: Option<String>,
    pub home: Option<String>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("CREW_API_URL").ok().filter(|s| !s.is_empty()),
            xdg_data_home: std::env::var("XDG_DATA_HOME").ok().filter(|s| !s.is_empty()),
            home: std::env::var("HOME").ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub mode: BuildMode,
    pub base_url: Url,
    pub token_path: PathBuf,
}

pub fn resolve_settings(cli: &CliOverrides, env: &EnvDefaults) -> anyhow::Result<ClientSettings> {
    let mode = cli.mode.unwrap_or_else(BuildMode::compiled);

    // The env override only applies to production builds, local always talks to localhost.
    let raw_url = cli
        .api_url
        .clone()
        .or_else(|| match mode {
            BuildMode::Production => env.api_url.clone(),
            BuildMode::Local => None,
        })
        .unwrap_or_else(|| match mode {
            BuildMode::Production => PRODUCTION_API_URL.to_string(),
            BuildMode::Local => LOCAL_API_URL.to_string(),
        });
    let base_url = parse_base_url(&raw_url)?;

    let token_path = cli
        .token_file
        .clone()
        .unwrap_or_else(|| default_token_path(env));

    Ok(ClientSettings { mode, base_url, token_path })
}

/// Joining relative paths onto a URL drops the last segment unless it ends with a slash.
fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn default_token_path(env: &EnvDefaults) -> PathBuf {
    let base = env.xdg_data_home.clone().map(PathBuf::from).unwrap_or_else(|| {
        let home = env.home.clone().unwrap_or_else(|| ".".into());
        PathBuf::from(home).join(".local").join("share")
    });
    base.join("crew_client").join(TOKEN_SLOT)
}
