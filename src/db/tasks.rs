//! Task CRUD and filtered listing.

use super::{Database, map_constraint_error, ms_to_datetime, now_ms};
use crate::types::{NewTask, Priority, Task, TaskFilter, TaskPatch, TaskStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

const TASK_COLUMNS: &str =
    "id, employee_id, title, description, due_date, priority, status, created_at, updated_at";

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn due_date_ms(due_date: Option<DateTime<Utc>>) -> Option<i64> {
    due_date.map(|d| d.timestamp_millis())
}

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let due_date: Option<i64> = row.get("due_date")?;

    Ok(Task {
        id: row.get("id")?,
        employee_id: row.get("employee_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        due_date: due_date.map(ms_to_datetime).transpose()?,
        priority: row.get("priority")?,
        status: row.get("status")?,
        created_at: ms_to_datetime(row.get("created_at")?)?,
        updated_at: ms_to_datetime(row.get("updated_at")?)?,
    })
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
fn get_task_internal(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            params![id],
            parse_task_row,
        )
        .optional()?;
    Ok(task)
}

/// All tasks in creation order, using an existing connection.
pub(crate) fn list_all_tasks_internal(conn: &Connection) -> Result<Vec<Task>> {
    list_tasks_internal(conn, &TaskFilter::default())
}

fn list_tasks_internal(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut sql = format!("SELECT {} FROM tasks WHERE 1=1", TASK_COLUMNS);
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(employee_id) = filter.employee_id {
        sql.push_str(" AND employee_id = ?");
        params_vec.push(Box::new(employee_id));
    }

    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        params_vec.push(Box::new(status));
    }

    // Millisecond timestamps collide easily; id keeps insertion order stable.
    sql.push_str(" ORDER BY created_at ASC, id ASC");

    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params_refs.as_slice(), parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tasks)
}

impl Database {
    /// Create a new task.
    ///
    /// Fails with an invalid-reference error if `employee_id` names an
    /// employee that does not exist; no row is written in that case.
    pub fn create_task(&self, data: NewTask) -> Result<Task> {
        let now = now_ms();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (
                    employee_id, title, description, due_date, priority, status,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    data.employee_id,
                    data.title,
                    data.description,
                    due_date_ms(data.due_date),
                    data.priority,
                    data.status,
                    now,
                ],
            )
            .map_err(map_constraint_error)?;

            let id = conn.last_insert_rowid();
            info!(task_id = id, employee_id = ?data.employee_id, "Created task");

            Ok(Task {
                id,
                employee_id: data.employee_id,
                title: data.title,
                description: data.description,
                due_date: data.due_date,
                priority: data.priority,
                status: data.status,
                created_at: ms_to_datetime(now)?,
                updated_at: ms_to_datetime(now)?,
            })
        })
    }

    /// Get a task by ID.
    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, id))
    }

    /// List tasks matching the filter, oldest first.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        debug!(employee_id = ?filter.employee_id, status = ?filter.status, "Listing tasks");
        self.with_conn(|conn| list_tasks_internal(conn, filter))
    }

    /// List every task, oldest first.
    pub fn list_all_tasks(&self) -> Result<Vec<Task>> {
        self.with_conn(list_all_tasks_internal)
    }

    /// Apply a partial update. Returns `None` if the task does not exist.
    ///
    /// `updated_at` is refreshed even when the patch changes nothing.
    pub fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Option<Task>> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(task) = get_task_internal(&tx, id)? else {
                return Ok(None);
            };

            let employee_id = patch.employee_id.unwrap_or(task.employee_id);
            let title = patch.title.unwrap_or_else(|| task.title.clone());
            let description = patch.description.unwrap_or_else(|| task.description.clone());
            let due_date = patch.due_date.unwrap_or(task.due_date);
            let priority = patch.priority.unwrap_or(task.priority);
            let status = patch.status.unwrap_or(task.status);

            tx.execute(
                "UPDATE tasks SET
                    employee_id = ?1, title = ?2, description = ?3, due_date = ?4,
                    priority = ?5, status = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    employee_id,
                    title,
                    description,
                    due_date_ms(due_date),
                    priority,
                    status,
                    now,
                    id,
                ],
            )
            .map_err(map_constraint_error)?;

            tx.commit()?;

            if task.status != status {
                info!(task_id = id, from = %task.status, to = %status, "Task status changed");
            }

            Ok(Some(Task {
                employee_id,
                title,
                description,
                due_date,
                priority,
                status,
                updated_at: ms_to_datetime(now)?,
                ..task
            }))
        })
    }

    /// Set a task's status through the general update path.
    pub fn set_task_status(&self, id: i64, status: TaskStatus) -> Result<Option<Task>> {
        self.update_task(id, TaskPatch::status(status))
    }

    /// Delete a task. Returns `false` when no task with this ID existed.
    pub fn delete_task(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            if removed > 0 {
                info!(task_id = id, "Deleted task");
            }
            Ok(removed > 0)
        })
    }
}
