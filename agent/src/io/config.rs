//! Agent configuration, optionally stored in `.agent/config.toml`.
//!
//! Values are layered: built-in defaults, then the TOML file, then command
//! line flags and environment variables (applied by the binary through
//! [`ConfigOverrides`]). Library code only ever sees the merged [`AgentConfig`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::actions::CommandLimits;
use crate::io::model::{DEFAULT_BASE_URL, DEFAULT_MODEL, ModelConfig};
use crate::io::session_log::DEFAULT_LOG_DIR;

/// Agent configuration (TOML).
///
/// Missing fields default to the values used by the container image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Base address of the chat backend (`/api/chat` is appended).
    pub base_url: String,

    /// Model identifier sent with every chat request.
    pub model: String,

    /// Step budget for one run.
    pub max_steps: u32,

    /// Per-request timeout for the chat backend in seconds.
    pub request_timeout_secs: u64,

    /// Kill a `run` command after this many seconds.
    pub command_timeout_secs: u64,

    /// Keep only the trailing bytes of each output stream of a `run` command, up to this many.
    pub output_limit_bytes: usize,

    /// Directory that holds one session log directory per run.
    pub log_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_steps: 20,
            request_timeout_secs: 300,
            command_timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url must be non-empty"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(anyhow!("log_dir must be non-empty"));
        }
        Ok(())
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn command_limits(&self) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(self.command_timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_steps: Option<u32>,
    pub command_timeout_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

/// Apply overrides on top of a loaded config and re-validate.
pub fn apply_overrides(mut base: AgentConfig, overrides: &ConfigOverrides) -> Result<AgentConfig> {
    if let Some(base_url) = &overrides.base_url {
        base.base_url = base_url.clone();
    }
    if let Some(model) = &overrides.model {
        base.model = model.clone();
    }
    if let Some(max_steps) = overrides.max_steps {
        base.max_steps = max_steps;
    }
    if let Some(command_timeout_secs) = overrides.command_timeout_secs {
        base.command_timeout_secs = command_timeout_secs;
    }
    if let Some(log_dir) = &overrides.log_dir {
        base.log_dir = log_dir.clone();
    }
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    debug!(path = %path.display(), model = %cfg.model, "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
