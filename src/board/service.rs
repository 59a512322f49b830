//! Board operations on behalf of a [`Caller`].
//!
//! Every function validates its input, checks that the caller may touch the
//! project involved, and then delegates to [`BoardDb`]. Handlers run these
//! inside `DbHandle::call`, so each one executes under the database mutex.

use chrono::Duration;

use super::auth::Caller;
use super::db::BoardDb;
use super::models::*;
use super::position::RepositionOutcome;
use crate::errors::BoardError;

/// Operational bounds applied by the board operations.
#[derive(Debug, Clone, Copy)]
pub struct BoardLimits {
    /// Upper bound on tasks per (project, status) column; bounds renumbering work.
    pub max_tasks_per_column: usize,
    pub session_ttl: Duration,
}

impl Default for BoardLimits {
    fn default() -> Self {
        Self {
            max_tasks_per_column: 500,
            session_ttl: Duration::hours(24),
        }
    }
}

fn authorize_project(db: &BoardDb, caller: &Caller, project_id: i64) -> Result<Project, BoardError> {
    let project = db
        .get_project(project_id)?
        .ok_or(BoardError::ProjectNotFound { id: project_id })?;
    if !caller.can_access(&project) {
        tracing::warn!(
            user_id = caller.user_id,
            project_id,
            "caller denied access to project"
        );
        return Err(BoardError::Forbidden { project_id });
    }
    Ok(project)
}

fn authorize_task(db: &BoardDb, caller: &Caller, task_id: i64) -> Result<Task, BoardError> {
    let task = db
        .get_task(task_id)?
        .ok_or(BoardError::TaskNotFound { id: task_id })?;
    authorize_project(db, caller, task.project_id)?;
    Ok(task)
}

/// Owner of `project_id`; board events are addressed by it.
pub fn project_owner(db: &BoardDb, project_id: i64) -> Result<i64, BoardError> {
    db.get_project(project_id)?
        .map(|p| p.owner_id)
        .ok_or(BoardError::ProjectNotFound { id: project_id })
}

// ── Projects ──────────────────────────────────────────────────────────

pub fn create_project(
    db: &BoardDb,
    caller: &Caller,
    name: &str,
    description: &str,
) -> Result<Project, BoardError> {
    let name = required_text("name", name, MAX_PROJECT_NAME_LEN)?;
    let description = bounded_text("description", description, MAX_PROJECT_DESCRIPTION_LEN)?;
    let project = db.create_project(caller.user_id, &name, &description)?;
    tracing::info!(project_id = project.id, owner_id = caller.user_id, "project created");
    Ok(project)
}

/// The caller's projects; admins see every project.
pub fn list_projects(db: &BoardDb, caller: &Caller) -> Result<Vec<Project>, BoardError> {
    let owner = if caller.is_admin() {
        None
    } else {
        Some(caller.user_id)
    };
    Ok(db.list_projects(owner)?)
}

pub fn get_project(db: &BoardDb, caller: &Caller, id: i64) -> Result<Project, BoardError> {
    authorize_project(db, caller, id)
}

pub fn update_project(
    db: &BoardDb,
    caller: &Caller,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Project, BoardError> {
    authorize_project(db, caller, id)?;
    let name = name
        .map(|n| required_text("name", n, MAX_PROJECT_NAME_LEN))
        .transpose()?;
    let description = description
        .map(|d| bounded_text("description", d, MAX_PROJECT_DESCRIPTION_LEN))
        .transpose()?;
    Ok(db.update_project(id, name.as_deref(), description.as_deref())?)
}

/// Delete a project and all of its tasks. Returns the deleted project.
pub fn delete_project(db: &BoardDb, caller: &Caller, id: i64) -> Result<Project, BoardError> {
    let project = authorize_project(db, caller, id)?;
    db.delete_project(id)?;
    tracing::info!(project_id = id, "project deleted");
    Ok(project)
}

pub fn board(db: &BoardDb, caller: &Caller, project_id: i64) -> Result<BoardView, BoardError> {
    authorize_project(db, caller, project_id)?;
    Ok(db.get_board(project_id)?)
}

// ── Tasks ─────────────────────────────────────────────────────────────

/// Input for [`create_task`]; `project_id` and `title` arrive optional from
/// the wire so that their absence is reported as `invalid_argument`.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub project_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

pub fn create_task(
    db: &BoardDb,
    caller: &Caller,
    input: NewTask,
    limits: &BoardLimits,
) -> Result<Task, BoardError> {
    let project_id = input
        .project_id
        .ok_or_else(|| BoardError::invalid("projectId is required"))?;
    let title = required_text(
        "title",
        input.title.as_deref().unwrap_or_default(),
        MAX_TASK_TITLE_LEN,
    )?;
    let description = bounded_text(
        "description",
        input.description.as_deref().unwrap_or_default(),
        MAX_TASK_DESCRIPTION_LEN,
    )?;
    let status = input.status.unwrap_or(TaskStatus::Todo);

    authorize_project(db, caller, project_id)?;
    let task = db.create_task(
        project_id,
        &title,
        &description,
        status,
        limits.max_tasks_per_column,
    )?;
    tracing::info!(
        task_id = task.id,
        project_id,
        status = %task.status,
        position = task.position,
        "task created"
    );
    Ok(task)
}

pub fn list_tasks(db: &BoardDb, caller: &Caller, project_id: i64) -> Result<Vec<Task>, BoardError> {
    authorize_project(db, caller, project_id)?;
    Ok(db.list_tasks(project_id)?)
}

pub fn get_task(db: &BoardDb, caller: &Caller, id: i64) -> Result<Task, BoardError> {
    authorize_task(db, caller, id)
}

pub fn update_task(
    db: &BoardDb,
    caller: &Caller,
    id: i64,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<Task, BoardError> {
    authorize_task(db, caller, id)?;
    let title = title
        .map(|t| required_text("title", t, MAX_TASK_TITLE_LEN))
        .transpose()?;
    let description = description
        .map(|d| bounded_text("description", d, MAX_TASK_DESCRIPTION_LEN))
        .transpose()?;
    Ok(db.update_task(id, title.as_deref(), description.as_deref())?)
}

/// Delete a task; its former column is renumbered in the same transaction.
pub fn delete_task(db: &BoardDb, caller: &Caller, id: i64) -> Result<Task, BoardError> {
    authorize_task(db, caller, id)?;
    let task = db
        .delete_task(id)?
        .ok_or(BoardError::TaskNotFound { id })?;
    tracing::info!(task_id = id, project_id = task.project_id, "task deleted");
    Ok(task)
}

pub fn reposition(
    db: &BoardDb,
    caller: &Caller,
    mv: &MoveTask,
    limits: &BoardLimits,
) -> Result<RepositionOutcome, BoardError> {
    authorize_task(db, caller, mv.task_id)?;
    db.reposition_task(mv, limits.max_tasks_per_column)
}
