use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Where the assistant backend lives and how to talk to it
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AssistantConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommandConfig {
    /// Prefix that marks a message as a command (e.g. "#echo hi")
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HeartbeatConfig {
    /// Six-field cron expression (seconds first)
    #[serde(default = "default_heartbeat_cron")]
    pub cron: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    28003
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_prefix() -> String {
    "#".to_string()
}

fn default_heartbeat_cron() -> String {
    "0 */10 * * * *".to_string()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            cron: default_heartbeat_cron(),
        }
    }
}

impl AssistantConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Basic auth credentials, only when both halves are set.
    pub fn credentials(&self) -> Option<(String, String)> {
        if self.username.is_empty() || self.password.is_empty() {
            return None;
        }
        Some((self.username.clone(), self.password.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Config {
    /// Load the TOML file at `path` (defaults if it does not exist), then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            info!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override file values with `ASSISTANT_*` / `PREFIX_COMMAND` variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ASSISTANT_HOST") {
            self.assistant.host = host;
        }
        if let Some(port) = lookup("ASSISTANT_PORT") {
            self.assistant.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid ASSISTANT_PORT: {}", port))?;
        }
        if let Some(username) = lookup("ASSISTANT_USERNAME") {
            self.assistant.username = username;
        }
        if let Some(password) = lookup("ASSISTANT_PASSWORD") {
            self.assistant.password = password;
        }
        if let Some(prefix) = lookup("PREFIX_COMMAND") {
            self.command.prefix = prefix;
        }
        Ok(())
    }
}
