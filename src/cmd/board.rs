//! Offline database commands: `taskboard init-db`, `check-board`, `promote`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use taskboard::board::auth;
use taskboard::board::db::BoardDb;
use taskboard::board::server::open_database;
use taskboard::config::TaskboardToml;

fn open(mut settings: TaskboardToml, db_path: Option<PathBuf>) -> Result<BoardDb> {
    if let Some(path) = db_path {
        settings.database.path = path;
    }
    open_database(&settings.server_config())
}

pub fn cmd_init_db(settings: TaskboardToml, db_path: Option<PathBuf>) -> Result<()> {
    let path = db_path
        .clone()
        .unwrap_or_else(|| settings.database.path.clone());
    open(settings, db_path)?;
    println!("Board database initialized at {}", path.display());
    Ok(())
}

pub fn cmd_check_board(
    settings: TaskboardToml,
    db_path: Option<PathBuf>,
    project: Option<i64>,
    repair: bool,
) -> Result<()> {
    let db = open(settings, db_path)?;

    if let Some(id) = project
        && db.get_project(id)?.is_none()
    {
        anyhow::bail!("Project {} not found", id);
    }

    let reports = db.partition_reports(project)?;
    let broken: Vec<_> = reports.iter().filter(|r| !r.dense).collect();

    for report in &reports {
        println!(
            "project {:>4}  {:<10}  {:>4} tasks  {}",
            report.project_id,
            report.status.as_str(),
            report.task_count,
            if report.dense { "ok" } else { "NOT DENSE" }
        );
    }
    println!();

    if broken.is_empty() {
        println!("All {} column(s) are dense.", reports.len());
        return Ok(());
    }

    if repair {
        let writes = db
            .repair_partitions(project)
            .context("Failed to repair board positions")?;
        tracing::info!(columns = broken.len(), writes, "repaired task positions");
        println!(
            "Repaired {} column(s), {} task(s) renumbered.",
            broken.len(),
            writes
        );
        Ok(())
    } else {
        anyhow::bail!(
            "{} column(s) have gaps or duplicate positions; rerun with --repair",
            broken.len()
        )
    }
}

pub fn cmd_promote(settings: TaskboardToml, db_path: Option<PathBuf>, email: &str) -> Result<()> {
    let db = open(settings, db_path)?;
    let user = auth::promote_to_admin(&db, email)?;
    tracing::info!(user_id = user.id, "user promoted to admin");
    println!("{} is now an admin", user.email);
    Ok(())
}
