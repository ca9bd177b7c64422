#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_CHOCOTUBE_PORT: u16 = 5000;
pub const DEFAULT_CHOCOTUBE_HOST: &str = "127.0.0.1";
pub const DEFAULT_PASSWORD: &str = "choco";

// Only meant for local runs; deployments set SESSION_SECRET.
const DEVELOPMENT_SESSION_SECRET: &str = "choco-tube-secret-key-2025";

/// Everything the server needs to know before it binds a socket.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub session_secret: String,
    pub youtube_api_key: Option<String>,
    pub static_root: Option<PathBuf>,
    pub upstream_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub env_path: Option<PathBuf>,
    pub static_root: Option<PathBuf>,
    pub upstream_config: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    Ok(build_runtime_settings(&file_vars, env_var_string, overrides))
}

fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup_value("CHOCOTUBE_HOST", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_CHOCOTUBE_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("CHOCOTUBE_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_CHOCOTUBE_PORT);
    let password = lookup_value("APP_PASSWORD", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());
    let session_secret = lookup_value("SESSION_SECRET", file_vars, &env_lookup)
        .or_else(|| lookup_value("SECRET_KEY", file_vars, &env_lookup))
        .unwrap_or_else(|| DEVELOPMENT_SESSION_SECRET.to_string());
    let youtube_api_key = lookup_value("YOUTUBE_API_KEY", file_vars, &env_lookup);
    let static_root = overrides.static_root.or_else(|| {
        lookup_value("STATIC_ROOT", file_vars, &env_lookup).map(PathBuf::from)
    });
    let upstream_config = overrides.upstream_config.or_else(|| {
        lookup_value("UPSTREAM_CONFIG", file_vars, &env_lookup).map(PathBuf::from)
    });

    RuntimeSettings {
        host,
        port,
        password,
        session_secret,
        youtube_api_key,
        static_root,
        upstream_config,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_blank(&value))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).and_then(|value| non_blank(value)))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Addresses of every third-party service the aggregation layer talks to.
///
/// Defaults point at the public services; any key can be replaced from a TOML
/// file, the rest keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpstreamEndpoints {
    /// Base URLs of the mirrored metadata API (`/api/v1/...` is appended).
    pub instances: Vec<String>,
    /// Secondary video detail API, video id appended.
    pub edu_video_api: String,
    /// Remote JSON holding the education embed parameters.
    pub edu_config_url: String,
    /// Progressive format resolver, video id appended.
    pub stream_api: String,
    /// HLS format resolver, video id appended.
    pub m3u8_api: String,
    /// Keyed search API endpoint.
    pub search_api: String,
    pub suggest_url: String,
    pub thumbnail_host: String,
    pub embed_host: String,
    pub education_embed_host: String,
}

impl Default for UpstreamEndpoints {
    fn default() -> Self {
        Self {
            instances: [
                "https://inv.nadeko.net/",
                "https://invidious.f5.si/",
                "https://invidious.lunivers.trade/",
                "https://invidious.ducks.party/",
                "https://super8.absturztau.be/",
                "https://invidious.nikkosphere.com/",
                "https://yt.omada.cafe/",
                "https://iv.melmac.space/",
                "https://iv.duti.dev/",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            edu_video_api: "https://siawaseok.duckdns.org/api/video2/".into(),
            edu_config_url:
                "https://raw.githubusercontent.com/siawaseok3/wakame/master/video_config.json"
                    .into(),
            stream_api: "https://ytdl-0et1.onrender.com/stream/".into(),
            m3u8_api: "https://ytdl-0et1.onrender.com/m3u8/".into(),
            search_api: "https://www.googleapis.com/youtube/v3/search".into(),
            suggest_url: "https://suggestqueries.google.com/complete/search".into(),
            thumbnail_host: "https://i.ytimg.com".into(),
            embed_host: "https://www.youtube-nocookie.com".into(),
            education_embed_host: "https://www.youtubeeducation.com".into(),
        }
    }
}

impl UpstreamEndpoints {
    /// Loads overrides from `path`, or the defaults when no file is configured.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw =
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Parsing {}", path.display()))
    }
}
