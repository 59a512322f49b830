use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskboard::config::TaskboardToml;
use taskboard::logging::{self, LoggingConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(version, about = "Kanban task-board server")]
pub struct Cli {
    /// Debug-level logging for taskboard and HTTP requests
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to taskboard.toml (defaults to ./taskboard.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP + WebSocket server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a local front-end dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations, then exit
    InitDb {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Report columns whose task positions are not exactly 0..n
    CheckBoard {
        /// Only check this project
        #[arg(long)]
        project: Option<i64>,

        /// Renumber the columns that fail the check
        #[arg(long)]
        repair: bool,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Grant the admin role to a registered user
    Promote {
        /// Email of the user to promote
        email: String,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration (file + environment)
    Show,
    /// Validate configuration and list any problems
    Validate,
    /// Write a default taskboard.toml in the current directory
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = TaskboardToml::resolve(cli.config.as_deref())?;
    settings.apply_process_env()?;

    let _log_guard =
        logging::init_logging(&LoggingConfig::from_section(&settings.logging, cli.verbose))?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
        } => {
            cmd::cmd_serve(settings, cmd::ServeOverrides {
                port,
                host,
                db_path,
                dev,
            })
            .await?;
        }
        Commands::InitDb { db_path } => cmd::cmd_init_db(settings, db_path)?,
        Commands::CheckBoard {
            project,
            repair,
            db_path,
        } => cmd::cmd_check_board(settings, db_path, project, repair)?,
        Commands::Promote { email, db_path } => cmd::cmd_promote(settings, db_path, &email)?,
        Commands::Config { command } => cmd::cmd_config(&settings, cli.config.as_deref(), command)?,
    }

    Ok(())
}
