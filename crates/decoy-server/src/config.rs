//! Server configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    /// Maximum history entries kept per session; 0 keeps everything.
    #[serde(default)]
    pub history_max_retention: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub status_codes: StatusCodes,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub scripting: ScriptingConfig,

    /// Mock definitions registered into the first session at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mocks_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            history_max_retention: 0,
            log_level: default_log_level(),
            status_codes: StatusCodes::default(),
            proxy: ProxyConfig::default(),
            scripting: ScriptingConfig::default(),
            mocks_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Status codes of the non-served outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusCodes {
    #[serde(default = "default_internal_error")]
    pub internal_error: u16,
    #[serde(default = "default_engine_error")]
    pub engine_error: u16,
    #[serde(default = "default_proxy_error")]
    pub proxy_error: u16,
    #[serde(default = "default_not_found")]
    pub not_found: u16,
    #[serde(default = "default_exceeded")]
    pub exceeded: u16,
}

impl StatusCodes {
    fn all(&self) -> [u16; 5] {
        [
            self.internal_error,
            self.engine_error,
            self.proxy_error,
            self.not_found,
            self.exceeded,
        ]
    }

    /// Whether a status is one of the non-served outcomes.
    pub fn is_sentinel(&self, status: u16) -> bool {
        self.all().contains(&status)
    }
}

impl Default for StatusCodes {
    fn default() -> Self {
        Self {
            internal_error: default_internal_error(),
            engine_error: default_engine_error(),
            proxy_error: default_proxy_error(),
            not_found: default_not_found(),
            exceeded: default_exceeded(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Timeout for a whole upstream exchange; unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Redirect hops followed when a mock enables `follow_redirect`.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            max_redirects: default_max_redirects(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScriptingConfig {
    /// Memory cap for one Lua interpreter, in bytes.
    #[serde(default = "default_lua_memory_limit")]
    pub lua_memory_limit: usize,
    /// Instruction budget for one Lua script run.
    #[serde(default = "default_lua_max_instructions")]
    pub lua_max_instructions: u64,
    /// Operation budget for one Rhai evaluation.
    #[serde(default = "default_rhai_max_operations")]
    pub rhai_max_operations: u64,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            lua_memory_limit: default_lua_memory_limit(),
            lua_max_instructions: default_lua_max_instructions(),
            rhai_max_operations: default_rhai_max_operations(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_internal_error() -> u16 {
    600
}

fn default_engine_error() -> u16 {
    601
}

fn default_proxy_error() -> u16 {
    602
}

fn default_not_found() -> u16 {
    666
}

fn default_exceeded() -> u16 {
    667
}

fn default_max_redirects() -> usize {
    10
}

fn default_lua_memory_limit() -> usize {
    64 * 1024 * 1024
}

fn default_lua_max_instructions() -> u64 {
    10_000_000
}

fn default_rhai_max_operations() -> u64 {
    1_000_000
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let codes = self.status_codes.all();
        if let Some(code) = codes.iter().find(|c| !(100..=999).contains(*c)) {
            anyhow::bail!("Status code {code} is outside the valid range 100-999");
        }
        let unique: HashSet<_> = codes.iter().collect();
        if unique.len() != codes.len() {
            anyhow::bail!(
                "status_codes must all be distinct so outcomes can be told apart, got {codes:?}"
            );
        }
        if self.scripting.rhai_max_operations == 0 {
            anyhow::bail!("scripting.rhai_max_operations must be greater than 0");
        }
        if self.scripting.lua_max_instructions == 0 {
            anyhow::bail!("scripting.lua_max_instructions must be greater than 0");
        }
        Ok(())
    }
}
