//! Layered configuration for the taskboard server.
//!
//! Settings are resolved in this order, later layers winning:
//! built-in defaults → `taskboard.toml` → `TASKBOARD_*` environment
//! variables (a `.env` file is loaded first) → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! dev = false
//!
//! [database]
//! path = ".taskboard/board.db"
//!
//! [board]
//! max_tasks_per_column = 500
//! session_ttl_hours = 24
//!
//! [logging]
//! filter = "taskboard=info"
//! format = "pretty"        # or "json"
//! dir = "logs"             # optional; enables daily-rolling files
//! keep_files = 7
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::board::server::ServerConfig;
use crate::board::service::BoardLimits;

pub const CONFIG_FILE_NAME: &str = "taskboard.toml";

/// Longest accepted session lifetime (one year).
pub const MAX_SESSION_TTL_HOURS: u32 = 24 * 365;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a local front-end dev server
    #[serde(default)]
    pub dev: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".taskboard/board.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    /// Cap on tasks in one (project, status) column
    #[serde(default = "default_max_tasks_per_column")]
    pub max_tasks_per_column: usize,
    /// Lifetime of a login session
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u32,
}

fn default_max_tasks_per_column() -> usize {
    500
}

fn default_session_ttl_hours() -> u32 {
    24
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            max_tasks_per_column: default_max_tasks_per_column(),
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directives; `RUST_LOG` still takes precedence
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Write daily-rolling log files here instead of stderr
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Rotated files to keep in `dir`
    #[serde(default = "default_keep_files")]
    pub keep_files: usize,
}

fn default_log_filter() -> String {
    "taskboard=info".to_string()
}

fn default_keep_files() -> usize {
    7
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
            dir: None,
            keep_files: default_keep_files(),
        }
    }
}

/// The complete taskboard.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskboardToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TaskboardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse taskboard.toml")
    }

    /// Load `taskboard.toml` from `dir`, or defaults if there is none.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize taskboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// File layer: the explicit `--config` path (must exist) or
    /// `./taskboard.toml` when present.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Self::load_or_default(Path::new(".")),
        }
    }

    /// Overlay `TASKBOARD_*` variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TASKBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TASKBOARD_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid TASKBOARD_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("TASKBOARD_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(filter) = lookup("TASKBOARD_LOG") {
            self.logging.filter = filter;
        }
        if let Some(format) = lookup("TASKBOARD_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(ttl) = lookup("TASKBOARD_SESSION_TTL_HOURS") {
            self.board.session_ttl_hours = ttl
                .parse()
                .with_context(|| format!("Invalid TASKBOARD_SESSION_TTL_HOURS '{}'", ttl))?;
        }
        if let Some(max) = lookup("TASKBOARD_MAX_TASKS_PER_COLUMN") {
            self.board.max_tasks_per_column = max
                .parse()
                .with_context(|| format!("Invalid TASKBOARD_MAX_TASKS_PER_COLUMN '{}'", max))?;
        }
        Ok(())
    }

    /// Overlay the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub fn limits(&self) -> BoardLimits {
        BoardLimits {
            max_tasks_per_column: self.board.max_tasks_per_column,
            session_ttl: chrono::Duration::hours(i64::from(self.board.session_ttl_hours)),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.database.path.clone(),
            dev_mode: self.server.dev,
            limits: self.limits(),
        }
    }

    /// Validate the configuration and return any problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must be between 1 and 65535".to_string());
        }
        if self.database.path.as_os_str().is_empty() {
            errors.push("database.path must not be empty".to_string());
        }
        if self.board.max_tasks_per_column == 0 {
            errors.push("board.max_tasks_per_column must be at least 1".to_string());
        }
        if self.board.session_ttl_hours == 0 {
            errors.push("board.session_ttl_hours must be at least 1".to_string());
        } else if self.board.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            errors.push(format!(
                "board.session_ttl_hours must be at most {}",
                MAX_SESSION_TTL_HOURS
            ));
        }
        if self.logging.filter.trim().is_empty() {
            errors.push("logging.filter must not be empty".to_string());
        }

        errors
    }
}
