//! Board server command: `taskboard serve`.

use anyhow::Result;
use std::path::PathBuf;

use taskboard::board::server::start_server;
use taskboard::config::TaskboardToml;

/// CLI flags layered over file and environment settings.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
}

pub async fn cmd_serve(mut settings: TaskboardToml, overrides: ServeOverrides) -> Result<()> {
    if let Some(port) = overrides.port {
        settings.server.port = port;
    }
    if let Some(host) = overrides.host {
        settings.server.host = host;
    }
    if let Some(db_path) = overrides.db_path {
        settings.database.path = db_path;
    }
    if overrides.dev {
        settings.server.dev = true;
    }

    let errors = settings.validate();
    if !errors.is_empty() {
        anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "));
    }

    start_server(settings.server_config()).await
}
