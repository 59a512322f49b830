//! Typed error taxonomy for the task board.
//!
//! Store internals work in `anyhow::Result` and attach `.context()` to every
//! SQLite call; everything that crosses the board boundary (service functions,
//! the position manager, HTTP handlers) returns [`BoardError`]. Each variant
//! maps onto one [`ErrorKind`], which is what callers see on the wire.

use serde::Serialize;
use thiserror::Error;

/// Coarse error classification surfaced to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from board operations (tasks, projects, users, sessions).
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Task {id} not found")]
    TaskNotFound { id: i64 },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Project {project_id} is not owned by the caller")]
    Forbidden { project_id: i64 },

    #[error("Admin role required")]
    AdminRequired,

    #[error("Task {task_id} is in column '{actual}', not '{claimed}'; reload the board")]
    StaleMove {
        task_id: i64,
        claimed: String,
        actual: String,
    },

    #[error("Column '{column}' already holds the maximum of {limit} tasks")]
    ColumnFull { column: String, limit: usize },

    #[error("User {email} already exists")]
    EmailTaken { email: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BoardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ProjectNotFound { .. } | Self::TaskNotFound { .. } | Self::NotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden { .. } | Self::AdminRequired => ErrorKind::Forbidden,
            Self::StaleMove { .. } | Self::ColumnFull { .. } | Self::EmailTaken { .. } => {
                ErrorKind::Conflict
            }
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}
