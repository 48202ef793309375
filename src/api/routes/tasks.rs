//! Task management handlers.

use super::{CreateTaskRequest, TaskListQuery};
use crate::api::AppState;
use crate::api::auth::AuthenticatedOwner;
use crate::error::{Error, Result};
use crate::types::{OperationType, TaskId, TaskSummary};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

/// POST /tasks - Start a bulk task for the caller
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task started", body = TaskSummary),
        (status = 400, description = "Unknown operation", body = crate::error::ApiError),
        (status = 401, description = "Missing token or no credentials on file", body = crate::error::ApiError),
        (status = 409, description = "Too many running tasks of this operation", body = crate::error::ApiError),
        (status = 422, description = "Empty item list", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse> {
    let operation: OperationType = request.operation.parse()?;
    let credentials = state
        .credentials
        .credentials(&owner)
        .await
        .ok_or_else(|| Error::Unauthorized(format!("no API credentials on file for {owner}")))?;

    let task = state
        .engine
        .create_task(request.items, &credentials, operation, request.workers)?;

    Ok((StatusCode::CREATED, Json(task.summary())))
}

/// GET /tasks - List the caller's running tasks
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    params(TaskListQuery),
    responses(
        (status = 200, description = "Running tasks of the caller", body = Vec<TaskSummary>),
        (status = 400, description = "Unknown operation filter", body = crate::error::ApiError),
        (status = 401, description = "Missing or invalid token", body = crate::error::ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskSummary>>> {
    let tasks = match query.operation {
        Some(name) => state.engine.tasks_of_type(&owner, name.parse()?),
        None => state.engine.tasks_of(&owner),
    };
    Ok(Json(tasks.iter().map(|task| task.summary()).collect()))
}

/// GET /tasks/:id - Get one of the caller's tasks
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task state", body = TaskSummary),
        (status = 403, description = "Task belongs to another user", body = crate::error::ApiError),
        (status = 404, description = "Task not found or already ended", body = crate::error::ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn get_task(
    State(state): State<AppState>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
    Path(id): Path<u64>,
) -> Result<Json<TaskSummary>> {
    let task = state.engine.get_owned(&owner, TaskId(id))?;
    Ok(Json(task.summary()))
}

/// DELETE /tasks/:id - Cancel one of the caller's tasks
#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Task cancelled"),
        (status = 403, description = "Task belongs to another user", body = crate::error::ApiError),
        (status = 404, description = "Task not found or already ended", body = crate::error::ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn cancel_task(
    State(state): State<AppState>,
    Extension(AuthenticatedOwner(owner)): Extension<AuthenticatedOwner>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    state.engine.cancel_task(&owner, TaskId(id))?;
    tracing::info!(task_id = id, %owner, "Task cancelled via API");
    Ok(StatusCode::NO_CONTENT)
}
