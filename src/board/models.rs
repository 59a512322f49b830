use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BoardError;

pub const MAX_PROJECT_NAME_LEN: usize = 100;
pub const MAX_PROJECT_DESCRIPTION_LEN: usize = 500;
pub const MAX_TASK_TITLE_LEN: usize = 200;
pub const MAX_TASK_DESCRIPTION_LEN: usize = 2000;

/// Board column a task lives in. The wire ids match what drag-and-drop
/// clients use as droppable ids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "todo")]
    Todo,
    #[serde(rename = "inprogress")]
    InProgress,
    #[serde(rename = "done")]
    Done,
}

impl TaskStatus {
    /// Display order of the columns on a board.
    pub const ALL: [TaskStatus; 3] = [Self::Todo, Self::InProgress, Self::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "inprogress",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "inprogress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(format!(
                "Invalid column: '{}' (expected todo, inprogress or done)",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

// ── Board view ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub project: Project,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    pub status: TaskStatus,
    pub tasks: Vec<Task>,
}

// ── Reposition ────────────────────────────────────────────────────────

/// A (column, index) coordinate on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub column: TaskStatus,
    pub index: usize,
}

/// A validated reposition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveTask {
    pub task_id: i64,
    pub source: Slot,
    pub destination: Slot,
}

/// Wire form of a reposition request. Every field is optional so that a
/// missing field is reported as `invalid_argument` instead of a framework
/// deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskRequest {
    pub task_id: Option<i64>,
    pub source: Option<SlotRequest>,
    pub destination: Option<SlotRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotRequest {
    #[serde(alias = "droppableId")]
    pub column: Option<String>,
    pub index: Option<i64>,
}

impl SlotRequest {
    fn into_slot(self, which: &str) -> Result<Slot, BoardError> {
        let column = self
            .column
            .ok_or_else(|| BoardError::invalid(format!("{} column is required", which)))?;
        let column = TaskStatus::from_str(&column).map_err(BoardError::InvalidArgument)?;
        let index = self
            .index
            .ok_or_else(|| BoardError::invalid(format!("{} index is required", which)))?;
        let index = usize::try_from(index).map_err(|_| {
            BoardError::invalid(format!("{} index must be non-negative, got {}", which, index))
        })?;
        Ok(Slot { column, index })
    }
}

impl MoveTaskRequest {
    pub fn validate(self) -> Result<MoveTask, BoardError> {
        let task_id = self
            .task_id
            .ok_or_else(|| BoardError::invalid("taskId is required"))?;
        let source = self
            .source
            .ok_or_else(|| BoardError::invalid("source is required"))?
            .into_slot("source")?;
        let destination = self
            .destination
            .ok_or_else(|| BoardError::invalid("destination is required"))?
            .into_slot("destination")?;
        Ok(MoveTask {
            task_id,
            source,
            destination,
        })
    }
}

// ── Field validation ──────────────────────────────────────────────────

/// Trim `value` and enforce a non-empty, length-bounded string.
pub fn required_text(field: &str, value: &str, max_len: usize) -> Result<String, BoardError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoardError::invalid(format!("{} is required", field)));
    }
    bounded_text(field, trimmed, max_len)
}

/// Trim `value` and enforce a length bound; empty is allowed.
pub fn bounded_text(field: &str, value: &str, max_len: usize) -> Result<String, BoardError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(BoardError::invalid(format!(
            "{} must be at most {} characters (got {})",
            field, max_len, len
        )));
    }
    Ok(trimmed.to_string())
}
