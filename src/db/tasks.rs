//! Task CRUD, scoped to the owning user.

use super::{Database, now_ms, parse_text_column};
use crate::error::{ApiError, EntityKind};
use crate::types::{NewTask, Task, TaskFilter, TaskStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, error};
use uuid::Uuid;

const TASK_COLUMNS: &str =
    "id, title, description, status, finish_by, recurrence, owner_id, created_at, updated_at";

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let finish_by: Option<i64> = row.get("finish_by")?;

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: parse_text_column(row, "status")?,
        finish_by: finish_by.and_then(DateTime::<Utc>::from_timestamp_millis),
        recurrence: parse_text_column(row, "recurrence")?,
        owner_id: row.get("owner_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_task_internal(conn: &Connection, task_id: &str, owner_id: &str) -> Result<Task> {
    let sql = format!(
        "SELECT {} FROM tasks WHERE id = ?1 AND owner_id = ?2",
        TASK_COLUMNS
    );
    conn.query_row(&sql, params![task_id, owner_id], parse_task_row)
        .optional()?
        .ok_or_else(|| ApiError::not_found(EntityKind::Task, task_id).into())
}

/// Escape LIKE wildcards so the search term matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped.to_lowercase())
}

impl Database {
    /// Create an OPEN task owned by `owner_id`.
    pub fn create_task(&self, owner_id: &str, input: NewTask) -> Result<Task> {
        if input.title.trim().is_empty() {
            return Err(ApiError::missing_field("title").into());
        }
        if input.description.trim().is_empty() {
            return Err(ApiError::missing_field("description").into());
        }

        let id = Uuid::now_v7().to_string();
        let now = now_ms();
        let finish_by_ms = input.finish_by.map(|d| d.timestamp_millis());

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (id, title, description, status, finish_by, recurrence, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    &id,
                    &input.title,
                    &input.description,
                    TaskStatus::Open.as_str(),
                    finish_by_ms,
                    input.recurrence.as_str(),
                    owner_id,
                    now,
                    now
                ],
            )?;
            debug!(task_id = %id, owner_id = %owner_id, "Task created");
            get_task_internal(conn, &id, owner_id)
        })
    }

    /// Get a task owned by `owner_id`.
    pub fn get_task(&self, task_id: &str, owner_id: &str) -> Result<Task> {
        self.with_conn(|conn| get_task_internal(conn, task_id, owner_id))
    }

    /// List tasks owned by `owner_id`, optionally filtered by status and a
    /// case-insensitive search over title and description.
    pub fn list_tasks(&self, owner_id: &str, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {} FROM tasks WHERE owner_id = ?", TASK_COLUMNS);
        let mut values: Vec<Value> = vec![Value::Text(owner_id.to_string())];

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            sql.push_str(
                " AND (LOWER(title) LIKE ? ESCAPE '\\' OR LOWER(description) LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(search);
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }

        sql.push_str(" ORDER BY created_at, id");

        self.with_conn(|conn| {
            let run = || -> rusqlite::Result<Vec<Task>> {
                let mut stmt = conn.prepare(&sql)?;
                let tasks = stmt
                    .query_map(params_from_iter(values.iter()), parse_task_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(tasks)
            };
            run().map_err(|e| {
                error!(owner_id = %owner_id, filter = ?filter, error = %e, "Failed to get tasks");
                e.into()
            })
        })
    }

    /// Delete a task owned by `owner_id`.
    pub fn delete_task(&self, task_id: &str, owner_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM tasks WHERE id = ?1 AND owner_id = ?2",
                params![task_id, owner_id],
            )?;
            if deleted == 0 {
                return Err(ApiError::not_found(EntityKind::Task, task_id).into());
            }
            Ok(())
        })
    }

    /// Set the status of a task owned by `owner_id`.
    pub fn update_task_status(
        &self,
        task_id: &str,
        owner_id: &str,
        status: TaskStatus,
    ) -> Result<Task> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3 AND owner_id = ?4",
                params![status.as_str(), now_ms(), task_id, owner_id],
            )?;
            if updated == 0 {
                return Err(ApiError::not_found(EntityKind::Task, task_id).into());
            }
            get_task_internal(conn, task_id, owner_id)
        })
    }

    /// Replace the description of a task owned by `owner_id`.
    pub fn update_task_description(
        &self,
        task_id: &str,
        owner_id: &str,
        description: &str,
    ) -> Result<Task> {
        if description.trim().is_empty() {
            return Err(ApiError::missing_field("description").into());
        }
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE tasks SET description = ?1, updated_at = ?2 WHERE id = ?3 AND owner_id = ?4",
                params![description, now_ms(), task_id, owner_id],
            )?;
            if updated == 0 {
                return Err(ApiError::not_found(EntityKind::Task, task_id).into());
            }
            get_task_internal(conn, task_id, owner_id)
        })
    }

    /// Tasks whose owner has been deleted.
    pub fn list_ownerless_tasks(&self) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM tasks WHERE owner_id IS NULL ORDER BY created_at, id",
                TASK_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let tasks = stmt
                .query_map([], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Milk"), "%milk%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
