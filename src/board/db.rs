use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use super::models::*;
use super::position::{self, Placement, RepositionOutcome, TaskStore};
use crate::errors::BoardError;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`. Holding the mutex for the whole
/// closure is what serializes concurrent repositions: a closure that opens a
/// transaction runs its read-renumber-write sequence without interleaving.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&BoardDb) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<anyhow::Error> + Send + 'static,
    {
        let db = self.inner.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let guard = lock_recovering(&db);
            f(&guard)
        })
        .await;
        match joined {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("DB task panicked: {}", e).into()),
        }
    }

    /// Acquire the database mutex synchronously. Used by the CLI commands and
    /// tests; never call this from an async handler.
    pub fn lock_sync(&self) -> std::sync::MutexGuard<'_, BoardDb> {
        lock_recovering(&self.inner)
    }
}

/// A closure that panicked mid-transaction has already rolled back (the
/// transaction is dropped during unwinding), so the connection is still
/// consistent and the poison flag can be cleared.
fn lock_recovering(db: &std::sync::Mutex<BoardDb>) -> std::sync::MutexGuard<'_, BoardDb> {
    db.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("board database lock was poisoned by a panicking task; recovering");
        db.clear_poison();
        poisoned.into_inner()
    })
}

/// Density report for one (project, status) partition.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
    pub project_id: i64,
    pub status: TaskStatus,
    pub task_count: usize,
    pub dense: bool,
}

pub struct BoardDb {
    conn: Connection,
}

const TASK_COLUMNS: &str =
    "id, project_id, title, description, status, position, created_at, updated_at";
const PROJECT_COLUMNS: &str = "id, owner_id, name, description, created_at, updated_at";

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'user',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    expires_at INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'todo',
                    position INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_partition ON tasks(project_id, status, position);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Run `f` inside one transaction; any error rolls back every write `f` made.
    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, BoardError>,
    ) -> Result<T, BoardError> {
        // unchecked_transaction is fine here: DbHandle's Mutex already
        // guarantees single-threaded access to the connection.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let value = f(self)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(value)
    }

    // ── Users & sessions ──────────────────────────────────────────────

    pub fn create_user(&self, email: &str, password_hash: &str, role: Role) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (email, password_hash, role) VALUES (?1, ?2, ?3)",
                params![email, password_hash, role.as_str()],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, email, role, created_at FROM users WHERE id = ?1",
                params![id],
                user_row,
            )
            .optional()
            .context("Failed to query user")?
            .map(UserRow::into_user)
            .transpose()
    }

    /// User plus stored password hash, looked up by normalized email.
    pub fn find_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        let found = self
            .conn
            .query_row(
                "SELECT id, email, role, created_at, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| Ok((user_row(row)?, row.get::<_, String>(4)?)),
            )
            .optional()
            .context("Failed to query user credentials")?;
        match found {
            Some((row, hash)) => Ok(Some((row.into_user()?, hash))),
            None => Ok(None),
        }
    }

    /// Every user, ordered by email.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, email, role, created_at FROM users ORDER BY email")
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], user_row)
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.context("Failed to read user row")?.into_user()?);
        }
        Ok(users)
    }

    pub fn update_user(&self, id: i64, email: Option<&str>, role: Option<Role>) -> Result<User> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(e) = email {
            tx.execute("UPDATE users SET email = ?1 WHERE id = ?2", params![e, id])
                .context("Failed to update user email")?;
        }
        if let Some(r) = role {
            tx.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![r.as_str(), id],
            )
            .context("Failed to update user role")?;
        }
        tx.commit().context("Failed to commit user update")?;
        self.get_user(id)?.context("User not found after update")
    }

    /// Deletes the user and, via `ON DELETE CASCADE`, their sessions,
    /// projects and tasks.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .context("Failed to delete user")?;
        Ok(count > 0)
    }

    pub fn set_user_role(&self, id: i64, role: Role) -> Result<User> {
        self.conn
            .execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role.as_str(), id],
            )
            .context("Failed to update user role")?;
        self.get_user(id)?.context("User not found after role update")
    }

    pub fn create_session(&self, token: &str, user_id: i64, expires_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token, user_id, expires_at],
            )
            .context("Failed to insert session")?;
        Ok(())
    }

    /// Returns `(user_id, expires_at)` for a session token.
    pub fn find_session(&self, token: &str) -> Result<Option<(i64, i64)>> {
        self.conn
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to query session")
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .context("Failed to delete session")?;
        Ok(count > 0)
    }

    pub fn delete_expired_sessions(&self, now: i64) -> Result<usize> {
        self.conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
            .context("Failed to purge expired sessions")
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    pub fn create_project(&self, owner_id: i64, name: &str, description: &str) -> Result<Project> {
        self.conn
            .execute(
                "INSERT INTO projects (owner_id, name, description) VALUES (?1, ?2, ?3)",
                params![owner_id, name, description],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    /// Projects ordered by id; `owner_id = None` lists every project.
    pub fn list_projects(&self, owner_id: Option<i64>) -> Result<Vec<Project>> {
        let sql = format!(
            "SELECT {} FROM projects WHERE ?1 IS NULL OR owner_id = ?1 ORDER BY id",
            PROJECT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map(params![owner_id], project_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS);
        self.conn
            .query_row(&sql, params![id], project_row)
            .optional()
            .context("Failed to query project")
    }

    pub fn update_project(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Project> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(n) = name {
            tx.execute(
                "UPDATE projects SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![n, id],
            )
            .context("Failed to update project name")?;
        }
        if let Some(d) = description {
            tx.execute(
                "UPDATE projects SET description = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![d, id],
            )
            .context("Failed to update project description")?;
        }
        tx.commit().context("Failed to commit project update")?;
        self.get_project(id)?
            .context("Project not found after update")
    }

    /// Deletes the project and, via `ON DELETE CASCADE`, all of its tasks.
    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])
            .context("Failed to delete project")?;
        Ok(count > 0)
    }

    // ── Task CRUD ─────────────────────────────────────────────────────

    /// Append a task to the end of its column.
    pub fn create_task(
        &self,
        project_id: i64,
        title: &str,
        description: &str,
        status: TaskStatus,
        max_per_column: usize,
    ) -> Result<Task, BoardError> {
        self.in_transaction(|db| {
            let position = position::next_position(db, project_id, status, max_per_column)?;
            db.conn
                .execute(
                    "INSERT INTO tasks (project_id, title, description, status, position) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![project_id, title, description, status.as_str(), position],
                )
                .context("Failed to insert task")?;
            let id = db.conn.last_insert_rowid();
            Ok(db.get_task(id)?.context("Task not found after insert")?)
        })
    }

    /// All tasks of a project ascending by position (ties by id), across columns.
    pub fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY position, id",
            TASK_COLUMNS
        );
        self.query_tasks(&sql, params![project_id])
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        self.conn
            .query_row(&sql, params![id], task_row)
            .optional()
            .context("Failed to query task")?
            .map(TaskRow::into_task)
            .transpose()
    }

    /// Update title and/or description. Placement only changes through
    /// [`BoardDb::reposition_task`].
    pub fn update_task(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Task> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(t) = title {
            tx.execute(
                "UPDATE tasks SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![t, id],
            )
            .context("Failed to update task title")?;
        }
        if let Some(d) = description {
            tx.execute(
                "UPDATE tasks SET description = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![d, id],
            )
            .context("Failed to update task description")?;
        }
        tx.commit().context("Failed to commit task update")?;
        self.get_task(id)?.context("Task not found after update")
    }

    /// Delete a task and close the gap it leaves in its column.
    /// Returns the deleted task, or `None` if it did not exist.
    pub fn delete_task(&self, id: i64) -> Result<Option<Task>, BoardError> {
        self.in_transaction(|db| {
            let Some(task) = db.get_task(id)? else {
                return Ok(None);
            };
            db.conn
                .execute("DELETE FROM tasks WHERE id = ?1", params![id])
                .context("Failed to delete task")?;
            position::close_gaps(db, task.project_id, task.status)?;
            Ok(Some(task))
        })
    }

    /// Transactional [`position::reposition`].
    pub fn reposition_task(
        &self,
        mv: &MoveTask,
        max_per_column: usize,
    ) -> Result<RepositionOutcome, BoardError> {
        self.in_transaction(|db| position::reposition(db, mv, max_per_column))
    }

    // ── Board view ────────────────────────────────────────────────────

    pub fn get_board(&self, project_id: i64) -> Result<BoardView> {
        let project = self
            .get_project(project_id)?
            .context("Project not found for board view")?;

        let mut columns = Vec::new();
        for status in TaskStatus::ALL {
            columns.push(ColumnView {
                status,
                tasks: self.tasks_in_column(project_id, status)?,
            });
        }

        Ok(BoardView { project, columns })
    }

    // ── Consistency checks ────────────────────────────────────────────

    /// Density report for every partition of one project (or all projects).
    pub fn partition_reports(&self, project_id: Option<i64>) -> Result<Vec<PartitionReport>> {
        let project_ids: Vec<i64> = match project_id {
            Some(id) => vec![id],
            None => self.list_projects(None)?.into_iter().map(|p| p.id).collect(),
        };
        let mut reports = Vec::new();
        for pid in project_ids {
            for status in TaskStatus::ALL {
                let tasks = self.tasks_in_column(pid, status)?;
                reports.push(PartitionReport {
                    project_id: pid,
                    status,
                    task_count: tasks.len(),
                    dense: position::is_dense(&tasks),
                });
            }
        }
        Ok(reports)
    }

    /// Renumber every non-dense partition. Returns the number of rows written.
    pub fn repair_partitions(&self, project_id: Option<i64>) -> Result<usize, BoardError> {
        let broken: Vec<PartitionReport> = self
            .partition_reports(project_id)?
            .into_iter()
            .filter(|r| !r.dense)
            .collect();
        self.in_transaction(|db| {
            let mut writes = 0;
            for report in &broken {
                writes += position::close_gaps(db, report.project_id, report.status)?;
            }
            Ok(writes)
        })
    }

    fn query_tasks(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare task query")?;
        let rows = stmt
            .query_map(params, task_row)
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            let r = row.context("Failed to read task row")?;
            tasks.push(r.into_task()?);
        }
        Ok(tasks)
    }
}

impl TaskStore for BoardDb {
    fn find_task(&self, id: i64) -> Result<Option<Task>> {
        self.get_task(id)
    }

    fn tasks_in_column(&self, project_id: i64, status: TaskStatus) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE project_id = ?1 AND status = ?2 ORDER BY position, id",
            TASK_COLUMNS
        );
        self.query_tasks(&sql, params![project_id, status.as_str()])
    }

    fn count_tasks(&self, project_id: i64, status: TaskStatus) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND status = ?2",
                params![project_id, status.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count tasks")
    }

    fn save_placement(&self, placement: &Placement) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tasks SET status = ?1, position = ?2, updated_at = datetime('now') WHERE id = ?3",
                params![
                    placement.status.as_str(),
                    placement.position,
                    placement.task_id
                ],
            )
            .with_context(|| format!("Failed to save placement of task {}", placement.task_id))?;
        Ok(())
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Intermediate row struct for reading tasks before parsing `status`.
struct TaskRow {
    id: i64,
    project_id: i64,
    title: String,
    description: String,
    status: String,
    position: i64,
    created_at: String,
    updated_at: String,
}

fn task_row(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        position: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl TaskRow {
    fn into_task(self) -> Result<Task> {
        let status = TaskStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse task status")?;
        Ok(Task {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status,
            position: self.position,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct UserRow {
    id: i64,
    email: String,
    role: String,
    created_at: String,
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        role: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role = Role::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse user role")?;
        Ok(User {
            id: self.id,
            email: self.email,
            role,
            created_at: self.created_at,
        })
    }
}

fn project_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::models::Slot;
    use crate::errors::ErrorKind;

    const LIMIT: usize = 500;

    fn setup() -> Result<(BoardDb, Project)> {
        let db = BoardDb::new_in_memory()?;
        let user = db.create_user("owner@example.com", "salt$hash", Role::User)?;
        let project = db.create_project(user.id, "Roadmap", "")?;
        Ok((db, project))
    }

    fn titles(db: &BoardDb, project_id: i64, status: TaskStatus) -> Vec<(String, i64)> {
        db.tasks_in_column(project_id, status)
            .unwrap()
            .into_iter()
            .map(|t| (t.title, t.position))
            .collect()
    }

    fn slot(column: TaskStatus, index: usize) -> Slot {
        Slot { column, index }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = BoardDb::new_in_memory()?;

        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('users', 'sessions', 'projects', 'tasks')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 4, "Expected 4 tables to exist");

        let index_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name IN ('idx_sessions_user', 'idx_projects_owner', 'idx_tasks_partition')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(index_count, 3, "Expected 3 indexes to exist");

        Ok(())
    }

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("board.db");
        {
            let db = BoardDb::new(&path)?;
            db.create_user("a@example.com", "x", Role::User)?;
        }
        let db = BoardDb::new(&path)?;
        assert!(db.find_credentials("a@example.com")?.is_some());
        Ok(())
    }

    #[test]
    fn test_create_and_list_projects_by_owner() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let alice = db.create_user("alice@example.com", "x", Role::User)?;
        let bob = db.create_user("bob@example.com", "x", Role::User)?;

        db.create_project(alice.id, "alpha", "first")?;
        db.create_project(bob.id, "beta", "")?;
        db.create_project(alice.id, "gamma", "")?;

        let mine = db.list_projects(Some(alice.id))?;
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].name, "alpha");
        assert_eq!(mine[0].description, "first");
        assert_eq!(mine[1].name, "gamma");

        assert_eq!(db.list_projects(None)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_update_project() -> Result<()> {
        let (db, project) = setup()?;
        let updated = db.update_project(project.id, None, Some("Q3 plans"))?;
        assert_eq!(updated.name, "Roadmap");
        assert_eq!(updated.description, "Q3 plans");
        Ok(())
    }

    #[test]
    fn test_create_task_appends_to_column() -> Result<()> {
        let (db, project) = setup()?;

        let a = db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        let b = db.create_task(project.id, "B", "details", TaskStatus::Todo, LIMIT)?;
        let c = db.create_task(project.id, "C", "", TaskStatus::Done, LIMIT)?;

        assert_eq!(a.position, 0);
        assert_eq!(b.position, 1);
        assert_eq!(b.description, "details");
        assert_eq!(c.position, 0);
        assert_eq!(c.status, TaskStatus::Done);
        assert!(!a.created_at.is_empty());
        Ok(())
    }

    #[test]
    fn test_create_task_in_full_column_is_conflict() -> Result<()> {
        let (db, project) = setup()?;
        db.create_task(project.id, "A", "", TaskStatus::Todo, 1)?;
        let err = db
            .create_task(project.id, "B", "", TaskStatus::Todo, 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(db.list_tasks(project.id)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_list_tasks_orders_by_position() -> Result<()> {
        let (db, project) = setup()?;
        db.create_task(project.id, "T0", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "D0", "", TaskStatus::Done, LIMIT)?;
        db.create_task(project.id, "T1", "", TaskStatus::Todo, LIMIT)?;

        let tasks = db.list_tasks(project.id)?;
        let order: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(order, vec!["T0", "D0", "T1"]);
        Ok(())
    }

    #[test]
    fn test_update_task_keeps_placement() -> Result<()> {
        let (db, project) = setup()?;
        db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        let b = db.create_task(project.id, "B", "", TaskStatus::Todo, LIMIT)?;

        let updated = db.update_task(b.id, Some("B2"), None)?;
        assert_eq!(updated.title, "B2");
        assert_eq!(updated.position, 1);
        assert_eq!(updated.status, TaskStatus::Todo);
        Ok(())
    }

    #[test]
    fn test_delete_task_renumbers_column() -> Result<()> {
        let (db, project) = setup()?;
        db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        let b = db.create_task(project.id, "B", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "C", "", TaskStatus::Todo, LIMIT)?;

        let deleted = db.delete_task(b.id)?.expect("task should exist");
        assert_eq!(deleted.title, "B");
        assert_eq!(
            titles(&db, project.id, TaskStatus::Todo),
            vec![("A".to_string(), 0), ("C".to_string(), 1)]
        );
        assert!(db.delete_task(b.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_reposition_same_column() -> Result<()> {
        let (db, project) = setup()?;
        db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        let b = db.create_task(project.id, "B", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "C", "", TaskStatus::Todo, LIMIT)?;

        let outcome = db.reposition_task(
            &MoveTask {
                task_id: b.id,
                source: slot(TaskStatus::Todo, 1),
                destination: slot(TaskStatus::Todo, 0),
            },
            LIMIT,
        )?;
        assert_eq!(outcome.writes, 2);
        assert_eq!(
            titles(&db, project.id, TaskStatus::Todo),
            vec![
                ("B".to_string(), 0),
                ("A".to_string(), 1),
                ("C".to_string(), 2)
            ]
        );
        Ok(())
    }

    #[test]
    fn test_reposition_across_columns() -> Result<()> {
        let (db, project) = setup()?;
        let a = db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "B", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "C", "", TaskStatus::Done, LIMIT)?;

        db.reposition_task(
            &MoveTask {
                task_id: a.id,
                source: slot(TaskStatus::Todo, 0),
                destination: slot(TaskStatus::Done, 1),
            },
            LIMIT,
        )?;
        assert_eq!(
            titles(&db, project.id, TaskStatus::Todo),
            vec![("B".to_string(), 0)]
        );
        assert_eq!(
            titles(&db, project.id, TaskStatus::Done),
            vec![("C".to_string(), 0), ("A".to_string(), 1)]
        );
        let moved = db.get_task(a.id)?.expect("task should exist");
        assert_eq!(moved.status, TaskStatus::Done);
        Ok(())
    }

    #[test]
    fn test_failed_reposition_rolls_back() -> Result<()> {
        let (db, project) = setup()?;
        let a = db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "B", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "C", "", TaskStatus::Done, LIMIT)?;

        let err = db
            .reposition_task(
                &MoveTask {
                    task_id: a.id,
                    source: slot(TaskStatus::Todo, 0),
                    destination: slot(TaskStatus::Done, 0),
                },
                1,
            )
            .unwrap_err();
        assert!(matches!(err, BoardError::ColumnFull { .. }));
        assert_eq!(
            titles(&db, project.id, TaskStatus::Todo),
            vec![("A".to_string(), 0), ("B".to_string(), 1)]
        );
        Ok(())
    }

    #[test]
    fn test_board_has_all_columns() -> Result<()> {
        let (db, project) = setup()?;
        db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "B", "", TaskStatus::Done, LIMIT)?;

        let board = db.get_board(project.id)?;
        assert_eq!(board.project.name, "Roadmap");
        assert_eq!(board.columns.len(), 3);
        assert_eq!(board.columns[0].status, TaskStatus::Todo);
        assert_eq!(board.columns[1].status, TaskStatus::InProgress);
        assert_eq!(board.columns[2].status, TaskStatus::Done);
        assert_eq!(board.columns[0].tasks.len(), 1);
        assert!(board.columns[1].tasks.is_empty());
        assert_eq!(board.columns[2].tasks[0].title, "B");
        Ok(())
    }

    #[test]
    fn test_delete_project_cascades_tasks() -> Result<()> {
        let (db, project) = setup()?;
        let task = db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;

        assert!(db.delete_project(project.id)?);
        assert!(db.get_project(project.id)?.is_none());
        assert!(db.get_task(task.id)?.is_none());
        assert!(!db.delete_project(project.id)?);
        Ok(())
    }

    #[test]
    fn test_partition_reports_and_repair() -> Result<()> {
        let (db, project) = setup()?;
        db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        db.create_task(project.id, "B", "", TaskStatus::Todo, LIMIT)?;
        // Corrupt the column behind the manager's back.
        db.conn.execute(
            "UPDATE tasks SET position = 7 WHERE title = 'B'",
            [],
        )?;

        let reports = db.partition_reports(Some(project.id))?;
        assert_eq!(reports.len(), 3);
        let todo = reports
            .iter()
            .find(|r| r.status == TaskStatus::Todo)
            .expect("todo report");
        assert!(!todo.dense);
        assert_eq!(todo.task_count, 2);

        assert_eq!(db.repair_partitions(None)?, 1);
        assert!(db.partition_reports(None)?.iter().all(|r| r.dense));
        assert_eq!(
            titles(&db, project.id, TaskStatus::Todo),
            vec![("A".to_string(), 0), ("B".to_string(), 1)]
        );
        Ok(())
    }

    #[test]
    fn test_sessions_lifecycle() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let user = db.create_user("s@example.com", "x", Role::User)?;

        db.create_session("tok-live", user.id, 2_000)?;
        db.create_session("tok-old", user.id, 500)?;
        assert_eq!(db.find_session("tok-live")?, Some((user.id, 2_000)));

        assert_eq!(db.delete_expired_sessions(1_000)?, 1);
        assert!(db.find_session("tok-old")?.is_none());

        assert!(db.delete_session("tok-live")?);
        assert!(!db.delete_session("tok-live")?);
        Ok(())
    }

    #[test]
    fn test_find_credentials_returns_hash() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.create_user("c@example.com", "salt$digest", Role::Admin)?;
        let (user, hash) = db
            .find_credentials("c@example.com")?
            .expect("user should exist");
        assert_eq!(user.role, Role::Admin);
        assert_eq!(hash, "salt$digest");
        assert!(db.find_credentials("missing@example.com")?.is_none());
        Ok(())
    }

    #[test]
    fn test_user_listing_update_and_delete() -> Result<()> {
        let (db, project) = setup()?;
        let other = db.create_user("b@example.com", "salt$hash", Role::User)?;

        let emails: Vec<String> = db.list_users()?.into_iter().map(|u| u.email).collect();
        assert_eq!(emails, vec!["b@example.com", "owner@example.com"]);

        let updated = db.update_user(other.id, Some("z@example.com"), Some(Role::Admin))?;
        assert_eq!(updated.email, "z@example.com");
        assert_eq!(updated.role, Role::Admin);
        let unchanged = db.update_user(other.id, None, None)?;
        assert_eq!(unchanged.email, "z@example.com");

        db.create_session("tok", project.owner_id, i64::MAX)?;
        db.create_task(project.id, "A", "", TaskStatus::Todo, LIMIT)?;
        assert!(db.delete_user(project.owner_id)?);
        assert!(!db.delete_user(project.owner_id)?);
        assert!(db.get_project(project.id)?.is_none());
        assert!(db.find_session("tok")?.is_none());
        assert!(db.list_tasks(project.id)?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_recovers_after_a_panicking_closure() -> Result<()> {
        let (db, project) = setup()?;
        let project_id = project.id;
        let handle = DbHandle::new(db);

        let failed: Result<(), BoardError> = handle
            .call(move |db| {
                db.in_transaction(|db| {
                    db.create_task(project_id, "lost", "", TaskStatus::Todo, LIMIT)?;
                    panic!("write interrupted");
                })
            })
            .await;
        assert_eq!(failed.unwrap_err().kind(), ErrorKind::Internal);

        // The lock is usable again and the interrupted insert was rolled back.
        let tasks = handle
            .call(move |db| Ok::<_, BoardError>(db.list_tasks(project_id)?))
            .await?;
        assert!(tasks.is_empty());
        assert!(handle.lock_sync().get_project(project_id)?.is_some());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_repositions_keep_column_dense() -> Result<()> {
        let (db, project) = setup()?;
        let mut ids = Vec::new();
        for i in 0..8 {
            let task = db.create_task(project.id, &format!("T{}", i), "", TaskStatus::Todo, LIMIT)?;
            ids.push(task.id);
        }
        let handle = DbHandle::new(db);

        let mut joins = Vec::new();
        for round in 0..40usize {
            let handle = handle.clone();
            let task_id = ids[round % ids.len()];
            let destination = if round % 3 == 0 {
                slot(TaskStatus::Done, round % 4)
            } else {
                slot(TaskStatus::Todo, (round * 5) % 8)
            };
            joins.push(tokio::spawn(async move {
                handle
                    .call(move |db| {
                        // Read the task's current slot, then move it, as a client would.
                        let Some(task) = db.get_task(task_id)? else {
                            return Ok::<_, BoardError>(());
                        };
                        let mv = MoveTask {
                            task_id,
                            source: slot(task.status, task.position as usize),
                            destination,
                        };
                        db.reposition_task(&mv, LIMIT)?;
                        Ok(())
                    })
                    .await
            }));
        }
        for join in joins {
            join.await??;
        }

        let guard = handle.lock_sync();
        for report in guard.partition_reports(Some(project.id))? {
            assert!(report.dense, "{:?} is not dense", report);
        }
        let total: usize = guard
            .partition_reports(Some(project.id))?
            .iter()
            .map(|r| r.task_count)
            .sum();
        assert_eq!(total, 8);
        Ok(())
    }
}
