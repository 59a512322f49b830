//! Task position manager.
//!
//! Keeps every (project, status) partition dense: the positions of the tasks
//! in a column are always exactly `0..n`. All operations here are written
//! against the [`TaskStore`] seam so they can run inside whatever transaction
//! the caller opened; they compute the full new ordering first and only then
//! write the placements that actually changed.
//!
//! Partitions are read in `(position, id)` order. The id tie-break makes the
//! order deterministic even when a column was left with duplicate positions,
//! and any column touched by [`reposition`] or [`close_gaps`] comes out dense.

use anyhow::Result;

use super::models::{MoveTask, Task, TaskStatus};
use crate::errors::BoardError;

/// Storage operations the position manager needs.
pub trait TaskStore {
    fn find_task(&self, id: i64) -> Result<Option<Task>>;

    /// Tasks of one partition, ascending by `(position, id)`.
    fn tasks_in_column(&self, project_id: i64, status: TaskStatus) -> Result<Vec<Task>>;

    fn count_tasks(&self, project_id: i64, status: TaskStatus) -> Result<i64>;

    fn save_placement(&self, placement: &Placement) -> Result<()>;
}

/// New (status, position) for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub task_id: i64,
    pub status: TaskStatus,
    pub position: i64,
}

#[derive(Debug, Clone)]
pub struct RepositionOutcome {
    /// The moved task with its final status and position.
    pub task: Task,
    pub from_column: TaskStatus,
    /// Number of task rows written.
    pub writes: usize,
}

/// Position for a task appended to `(project_id, status)`.
pub fn next_position<S: TaskStore>(
    store: &S,
    project_id: i64,
    status: TaskStatus,
    max_per_column: usize,
) -> Result<i64, BoardError> {
    let count = store.count_tasks(project_id, status)?;
    if count as usize >= max_per_column {
        return Err(BoardError::ColumnFull {
            column: status.to_string(),
            limit: max_per_column,
        });
    }
    Ok(count)
}

/// Move a task to `mv.destination`, renumbering the affected column(s).
///
/// The task is located by id. `mv.source.column` must match the stored
/// status (otherwise the caller's board is stale); `mv.source.index` is only
/// checked and logged. Destination indexes past the end append. A move that
/// leaves a dense column in the same order writes nothing.
pub fn reposition<S: TaskStore>(
    store: &S,
    mv: &MoveTask,
    max_per_column: usize,
) -> Result<RepositionOutcome, BoardError> {
    let task = store
        .find_task(mv.task_id)?
        .ok_or(BoardError::TaskNotFound { id: mv.task_id })?;
    let from_column = task.status;

    if from_column != mv.source.column {
        return Err(BoardError::StaleMove {
            task_id: task.id,
            claimed: mv.source.column.to_string(),
            actual: from_column.to_string(),
        });
    }

    let mut source_tasks = store.tasks_in_column(task.project_id, from_column)?;
    let current = source_tasks
        .iter()
        .position(|t| t.id == task.id)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Task {} missing from its own column '{}'",
                task.id,
                from_column
            )
        })?;
    if current != mv.source.index {
        tracing::warn!(
            task_id = task.id,
            claimed_index = mv.source.index,
            actual_index = current,
            "reposition source index is stale; moving by task id"
        );
    }
    let moving = source_tasks.remove(current);

    let mut changes = Vec::new();
    let final_position;
    if mv.destination.column == from_column {
        let dest = mv.destination.index.min(source_tasks.len());
        source_tasks.insert(dest, moving);
        changes.extend(renumber(&source_tasks, from_column));
        final_position = dest;
    } else {
        let mut dest_tasks = store.tasks_in_column(task.project_id, mv.destination.column)?;
        if dest_tasks.len() >= max_per_column {
            return Err(BoardError::ColumnFull {
                column: mv.destination.column.to_string(),
                limit: max_per_column,
            });
        }
        changes.extend(renumber(&source_tasks, from_column));
        let dest = mv.destination.index.min(dest_tasks.len());
        dest_tasks.insert(dest, moving);
        changes.extend(renumber(&dest_tasks, mv.destination.column));
        final_position = dest;
    }

    apply(store, &changes)?;

    tracing::debug!(
        task_id = task.id,
        from = %from_column,
        to = %mv.destination.column,
        position = final_position,
        writes = changes.len(),
        "task repositioned"
    );

    Ok(RepositionOutcome {
        task: Task {
            status: mv.destination.column,
            position: final_position as i64,
            ..task
        },
        from_column,
        writes: changes.len(),
    })
}

/// Renumber one partition to `0..n` in its current `(position, id)` order.
/// Used after a delete and by the board repair command.
pub fn close_gaps<S: TaskStore>(
    store: &S,
    project_id: i64,
    status: TaskStatus,
) -> Result<usize, BoardError> {
    let tasks = store.tasks_in_column(project_id, status)?;
    let changes = renumber(&tasks, status);
    apply(store, &changes)?;
    Ok(changes.len())
}

/// True when `tasks` (already in `(position, id)` order) are numbered `0..n`.
pub fn is_dense(tasks: &[Task]) -> bool {
    tasks
        .iter()
        .enumerate()
        .all(|(idx, t)| t.position == idx as i64)
}

/// Placements for every task whose status or index differs from its slot in
/// `ordered`.
fn renumber(ordered: &[Task], status: TaskStatus) -> Vec<Placement> {
    ordered
        .iter()
        .enumerate()
        .filter(|(idx, t)| t.status != status || t.position != *idx as i64)
        .map(|(idx, t)| Placement {
            task_id: t.id,
            status,
            position: idx as i64,
        })
        .collect()
}

fn apply<S: TaskStore>(store: &S, changes: &[Placement]) -> Result<()> {
    for placement in changes {
        store.save_placement(placement)?;
    }
    Ok(())
}
