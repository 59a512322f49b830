//! Configuration view and validation commands: `taskboard config`.

use anyhow::{Context, Result};
use std::path::Path;

use taskboard::config::{CONFIG_FILE_NAME, TaskboardToml};

use super::super::ConfigCommands;

pub fn cmd_config(
    settings: &TaskboardToml,
    explicit: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let config_path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").join(CONFIG_FILE_NAME));

    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No {} found; showing defaults", CONFIG_FILE_NAME);
            }
            println!("# Effective values (with environment overrides):");
            println!();
            let rendered =
                toml::to_string_pretty(settings).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let errors = settings.validate();
            if errors.is_empty() {
                println!("Configuration is valid.");
            } else {
                for error in &errors {
                    println!("  - {}", error);
                }
                anyhow::bail!("Configuration has {} problem(s)", errors.len());
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                anyhow::bail!("{} already exists", config_path.display());
            }
            TaskboardToml::default().save(&config_path)?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}
