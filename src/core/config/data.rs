use crate::mcp::transport::LaunchSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How images in a tool result reach the summary model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePolicy {
    /// Leave the bytes out and mention the image in text.
    #[default]
    Describe,
    /// Send images as data-URI image parts to a vision-capable model.
    Attach,
}

impl fmt::Display for ImagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImagePolicy::Describe => f.write_str("describe"),
            ImagePolicy::Attach => f.write_str("attach"),
        }
    }
}

impl FromStr for ImagePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "describe" => Ok(ImagePolicy::Describe),
            "attach" => Ok(ImagePolicy::Attach),
            other => Err(format!(
                "Unknown image policy `{other}` (expected `describe` or `attach`)"
            )),
        }
    }
}

/// A capability server the client knows how to launch.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub enabled: Option<bool>,
    /// Variables added on top of the inherited environment
    pub env: Option<HashMap<String, String>>,
}

impl ServerConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub request_timeout_secs: Option<u64>,
    /// Deadline for each call made on a server session
    pub session_timeout_secs: Option<u64>,
    pub summary_images: Option<ImagePolicy>,
    pub persist_images: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub default_server: Option<String>,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn get_server(&self, id: &str) -> Option<&ServerConfig> {
        self.servers
            .iter()
            .find(|server| server.id.eq_ignore_ascii_case(id))
    }

    pub fn add_server(&mut self, server: ServerConfig) {
        self.remove_server(&server.id);
        self.servers.push(server);
    }

    pub fn remove_server(&mut self, id: &str) {
        self.servers
            .retain(|server| !server.id.eq_ignore_ascii_case(id));
    }

    /// Picks the server to talk to: the requested id, else `default_server`,
    /// else the only enabled server.
    pub fn resolve_server(&self, requested: Option<&str>) -> Result<&ServerConfig, String> {
        if let Some(id) = requested.or(self.default_server.as_deref()) {
            let server = self
                .get_server(id)
                .ok_or_else(|| format!("No server named `{id}` in the configuration"))?;
            if !server.is_enabled() {
                return Err(format!("Server `{}` is disabled", server.id));
            }
            return Ok(server);
        }

        let mut enabled = self.servers.iter().filter(|server| server.is_enabled());
        match (enabled.next(), enabled.next()) {
            (Some(server), None) => Ok(server),
            (None, _) => Err(
                "No servers configured. Add a [[servers]] entry or pass --command.".to_string(),
            ),
            (Some(_), Some(_)) => Err(
                "Several servers are configured; choose one with --server or set default_server."
                    .to_string(),
            ),
        }
    }
}
