//! Task handlers. Every task operation is scoped to the caller's own tasks.

use super::{AppState, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::types::{NewTask, Task, TaskFilter, TaskStatus};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Query parameters for the task list.
#[derive(Debug, Deserialize)]
pub struct TaskListParams {
    status: Option<String>,
    search: Option<String>,
}

impl TaskListParams {
    fn into_filter(self) -> ApiResult<TaskFilter> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(
                s.parse::<TaskStatus>()
                    .map_err(|e| ApiError::invalid_argument("status", e))?,
            ),
            None => None,
        };
        Ok(TaskFilter {
            status,
            search: self.search,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<Task>,
    pub statuses: Vec<TaskStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct DescriptionUpdate {
    pub description: String,
}

pub async fn get_tasks(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(params): Query<TaskListParams>,
) -> ApiResult<Json<TasksResponse>> {
    let filter = params.into_filter()?;
    debug!(principal = %principal.username, filter = ?filter, "Retrieving tasks");
    let tasks = state.db().list_tasks(&principal.id, &filter)?;
    Ok(Json(TasksResponse {
        tasks,
        statuses: TaskStatus::ALL.to_vec(),
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.db().get_task(&task_id, &principal.id)?))
}

pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(input): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    debug!(principal = %principal.username, title = %input.title, "Creating task");
    let task = state.db().create_task(&principal.id, input)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(task_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db().delete_task(&task_id, &principal.id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_task_status(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(task_id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.db().update_task_status(
        &task_id,
        &principal.id,
        update.status,
    )?))
}

pub async fn update_task_description(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(task_id): Path<String>,
    Json(update): Json<DescriptionUpdate>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.db().update_task_description(
        &task_id,
        &principal.id,
        &update.description,
    )?))
}
