//! Integration tests for the taskboard CLI
//!
//! Each test runs the real binary against a database in a temp directory.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use taskboard::board::auth::{self, Caller};
use taskboard::board::db::BoardDb;
use taskboard::board::models::Role;
use taskboard::board::service::{self, BoardLimits, NewTask};

/// Helper to create a taskboard Command running inside `dir`
fn taskboard(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("taskboard");
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("board.db")
}

/// Seed a project with `n` todo tasks and return its id.
fn seed_board(path: &Path, n: usize) -> i64 {
    let db = BoardDb::new(path).unwrap();
    let user = auth::register(&db, "seed@example.com", "password1").unwrap();
    let caller = Caller {
        user_id: user.id,
        role: Role::User,
    };
    let project = service::create_project(&db, &caller, "Seeded", "").unwrap();
    for i in 0..n {
        service::create_task(
            &db,
            &caller,
            NewTask {
                project_id: Some(project.id),
                title: Some(format!("Task {}", i)),
                ..Default::default()
            },
            &BoardLimits::default(),
        )
        .unwrap();
    }
    project.id
}

/// Spread positions out so the todo column is no longer 0..n.
fn corrupt_positions(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute("UPDATE tasks SET position = position * 2 + 1", [])
        .unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("check-board"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_init_db_creates_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data/nested/board.db");

        taskboard(&dir)
            .args(["init-db", "--db-path"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Board database initialized"));

        assert!(path.exists());

        // Re-running migrations is harmless.
        taskboard(&dir)
            .args(["init-db", "--db-path"])
            .arg(&path)
            .assert()
            .success();
    }

    #[test]
    fn test_init_db_honours_env_path() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .env("TASKBOARD_DB_PATH", "from-env.db")
            .arg("init-db")
            .assert()
            .success();
        assert!(dir.path().join("from-env.db").exists());
    }
}

// =============================================================================
// check-board
// =============================================================================

mod check_board {
    use super::*;

    #[test]
    fn test_empty_database_is_consistent() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["check-board", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("All 0 column(s) are dense."));
    }

    #[test]
    fn test_dense_board_passes() {
        let dir = TempDir::new().unwrap();
        seed_board(&db_path(&dir), 3);

        taskboard(&dir)
            .args(["check-board", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("All 3 column(s) are dense."));
    }

    #[test]
    fn test_gaps_are_reported_then_repaired() {
        let dir = TempDir::new().unwrap();
        let project_id = seed_board(&db_path(&dir), 3);
        corrupt_positions(&db_path(&dir));

        taskboard(&dir)
            .args(["check-board", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .failure()
            .stdout(predicate::str::contains("NOT DENSE"))
            .stderr(predicate::str::contains("--repair"));

        taskboard(&dir)
            .args(["check-board", "--repair", "--project"])
            .arg(project_id.to_string())
            .arg("--db-path")
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("Repaired 1 column(s), 3 task(s) renumbered."));

        let db = BoardDb::new(&db_path(&dir)).unwrap();
        let positions: Vec<i64> = db
            .list_tasks(project_id)
            .unwrap()
            .iter()
            .map(|t| t.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_project_fails() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["check-board", "--project", "99", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Project 99 not found"));
    }
}

// =============================================================================
// promote
// =============================================================================

mod promote {
    use super::*;

    #[test]
    fn test_promote_registered_user() {
        let dir = TempDir::new().unwrap();
        seed_board(&db_path(&dir), 0);

        taskboard(&dir)
            .args(["promote", "Seed@Example.com", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("seed@example.com is now an admin"));

        let db = BoardDb::new(&db_path(&dir)).unwrap();
        let (user, _) = db.find_credentials("seed@example.com").unwrap().unwrap();
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn test_promote_unknown_user_fails() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["promote", "ghost@example.com", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_init_then_show() {
        let dir = TempDir::new().unwrap();

        taskboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));
        assert!(dir.path().join("taskboard.toml").exists());

        taskboard(&dir)
            .args(["config", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        taskboard(&dir)
            .env("TASKBOARD_PORT", "8123")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 8123"));
    }

    #[test]
    fn test_config_validate_rejects_zero_limits() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("taskboard.toml"),
            "[board]\nmax_tasks_per_column = 0\n",
        )
        .unwrap();

        taskboard(&dir)
            .args(["config", "validate"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("max_tasks_per_column"));
    }

    #[test]
    fn test_serve_refuses_session_ttl_beyond_a_year() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .env("TASKBOARD_SESSION_TTL_HOURS", "4000000000")
            .args(["serve", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .failure()
            .stderr(predicate::str::contains("session_ttl_hours must be at most 8760"));
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["--config", "missing.toml", "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read config file"));
    }

    #[test]
    fn test_serve_refuses_invalid_port() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .args(["serve", "--port", "0", "--db-path"])
            .arg(db_path(&dir))
            .assert()
            .failure()
            .stderr(predicate::str::contains("server.port"));
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let dir = TempDir::new().unwrap();
        taskboard(&dir)
            .env("TASKBOARD_MAX_TASKS_PER_COLUMN", "lots")
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("TASKBOARD_MAX_TASKS_PER_COLUMN"));
    }
}
