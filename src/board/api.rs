use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use super::auth::{self, Caller};
use super::db::DbHandle;
use super::models::*;
use super::service::{self, BoardLimits, NewTask};
use super::ws::{BoardEvent, WsMessage, broadcast_event};
use crate::errors::{BoardError, ErrorKind};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub events: broadcast::Sender<BoardEvent>,
    pub limits: BoardLimits,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    fn publish(&self, owner_id: i64, msg: WsMessage) {
        broadcast_event(&self.events, owner_id, &msg);
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub project_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListParams {
    pub project_id: Option<i64>,
}

// ── Error handling ────────────────────────────────────────────────────

impl IntoResponse for BoardError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if kind == ErrorKind::Internal {
            tracing::error!(error = ?self, "request failed");
        }
        (
            status,
            Json(serde_json::json!({"error": kind.as_str(), "message": self.to_string()})),
        )
            .into_response()
    }
}

// ── Extractors ────────────────────────────────────────────────────────

/// `Json<T>` whose rejections (bad syntax, wrong shape, missing content
/// type) surface as `invalid_argument`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = BoardError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> BoardError {
    BoardError::invalid(rejection.body_text())
}

/// Numeric `{id}` path segment; a non-numeric id is `invalid_argument`.
pub struct PathId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for PathId {
    type Rejection = BoardError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<i64>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| Self(id))
            .map_err(|rejection| BoardError::invalid(rejection.body_text()))
    }
}

/// Raw `Authorization: Bearer <token>` value.
pub struct BearerToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = BoardError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Self(t.to_string()))
            .ok_or_else(|| BoardError::unauthorized("missing bearer token"))
    }
}

impl FromRequestParts<SharedState> for Caller {
    type Rejection = BoardError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        state
            .db
            .call(move |db| auth::resolve_session(db, &token))
            .await
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/user", get(current_user))
        .route("/api/users", get(list_users))
        .route(
            "/api/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/api/projects/{id}/board", get(get_board))
        .route(
            "/api/projects/{id}/tasks",
            get(list_project_tasks).post(create_project_task),
        )
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/reorder", put(reorder_tasks))
        .route(
            "/api/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn register(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<CredentialsRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    let user = state
        .db
        .call(move |db| auth::register(db, &email, &password))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"message": "User registered successfully", "user": user})),
    ))
}

async fn login(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<CredentialsRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    let ttl = state.limits.session_ttl;
    let session = state
        .db
        .call(move |db| auth::login(db, &email, &password, ttl))
        .await?;
    Ok(Json(session))
}

async fn logout(
    State(state): State<SharedState>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, BoardError> {
    let removed = state.db.call(move |db| auth::logout(db, &token)).await?;
    if !removed {
        return Err(BoardError::unauthorized("invalid or expired session"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn current_user(
    State(state): State<SharedState>,
    caller: Caller,
) -> Result<impl IntoResponse, BoardError> {
    let user = state
        .db
        .call(move |db| auth::current_user(db, &caller))
        .await?;
    Ok(Json(user))
}

async fn list_users(
    State(state): State<SharedState>,
    caller: Caller,
) -> Result<impl IntoResponse, BoardError> {
    let users = state
        .db
        .call(move |db| auth::list_users(db, &caller))
        .await?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
) -> Result<impl IntoResponse, BoardError> {
    let user = state
        .db
        .call(move |db| auth::get_user(db, &caller, id))
        .await?;
    Ok(Json(user))
}

async fn update_user(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
    JsonBody(req): JsonBody<UpdateUserRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let role = req
        .role
        .as_deref()
        .map(Role::from_str)
        .transpose()
        .map_err(BoardError::InvalidArgument)?;
    let user = state
        .db
        .call(move |db| auth::update_user(db, &caller, id, req.email.as_deref(), role))
        .await?;
    Ok(Json(user))
}

/// Removing a user also removes their projects; each one is announced.
async fn delete_user(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
) -> Result<StatusCode, BoardError> {
    let (user, project_ids) = state
        .db
        .call(move |db| auth::delete_user(db, &caller, id))
        .await?;
    for project_id in project_ids {
        state.publish(user.id, WsMessage::ProjectDeleted { project_id });
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_projects(
    State(state): State<SharedState>,
    caller: Caller,
) -> Result<impl IntoResponse, BoardError> {
    let projects = state
        .db
        .call(move |db| service::list_projects(db, &caller))
        .await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    caller: Caller,
    JsonBody(req): JsonBody<CreateProjectRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let name = req.name.unwrap_or_default();
    let description = req.description.unwrap_or_default();
    let project = state
        .db
        .call(move |db| service::create_project(db, &caller, &name, &description))
        .await?;
    state.publish(
        project.owner_id,
        WsMessage::ProjectCreated {
            project: project.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
) -> Result<impl IntoResponse, BoardError> {
    let project = state
        .db
        .call(move |db| service::get_project(db, &caller, id))
        .await?;
    Ok(Json(project))
}

async fn update_project(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
    JsonBody(req): JsonBody<UpdateProjectRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let project = state
        .db
        .call(move |db| {
            service::update_project(
                db,
                &caller,
                id,
                req.name.as_deref(),
                req.description.as_deref(),
            )
        })
        .await?;
    state.publish(
        project.owner_id,
        WsMessage::ProjectUpdated {
            project: project.clone(),
        },
    );
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
) -> Result<StatusCode, BoardError> {
    let project = state
        .db
        .call(move |db| service::delete_project(db, &caller, id))
        .await?;
    state.publish(project.owner_id, WsMessage::ProjectDeleted { project_id: id });
    Ok(StatusCode::NO_CONTENT)
}

async fn get_board(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
) -> Result<impl IntoResponse, BoardError> {
    let board = state
        .db
        .call(move |db| service::board(db, &caller, id))
        .await?;
    Ok(Json(board))
}

async fn list_project_tasks(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(project_id): PathId,
) -> Result<impl IntoResponse, BoardError> {
    let tasks = state
        .db
        .call(move |db| service::list_tasks(db, &caller, project_id))
        .await?;
    Ok(Json(tasks))
}

/// `GET /api/tasks?projectId=N`
async fn list_tasks(
    State(state): State<SharedState>,
    caller: Caller,
    params: Result<Query<TaskListParams>, QueryRejection>,
) -> Result<impl IntoResponse, BoardError> {
    let Query(params) = params.map_err(|e| BoardError::invalid(e.body_text()))?;
    let project_id = params
        .project_id
        .ok_or_else(|| BoardError::invalid("projectId is required"))?;
    let tasks = state
        .db
        .call(move |db| service::list_tasks(db, &caller, project_id))
        .await?;
    Ok(Json(tasks))
}

async fn create_project_task(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(project_id): PathId,
    JsonBody(req): JsonBody<CreateTaskRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let input = task_input(Some(project_id), req)?;
    insert_task(&state, caller, input).await
}

/// `POST /api/tasks` with `projectId` in the body.
async fn create_task(
    State(state): State<SharedState>,
    caller: Caller,
    JsonBody(req): JsonBody<CreateTaskRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let input = task_input(req.project_id, req)?;
    insert_task(&state, caller, input).await
}

fn task_input(project_id: Option<i64>, req: CreateTaskRequest) -> Result<NewTask, BoardError> {
    let status = req
        .status
        .as_deref()
        .map(TaskStatus::from_str)
        .transpose()
        .map_err(BoardError::InvalidArgument)?;
    Ok(NewTask {
        project_id,
        title: req.title,
        description: req.description,
        status,
    })
}

async fn insert_task(
    state: &SharedState,
    caller: Caller,
    input: NewTask,
) -> Result<(StatusCode, Json<Task>), BoardError> {
    let limits = state.limits;
    let (task, owner_id) = state
        .db
        .call(move |db| {
            let task = service::create_task(db, &caller, input, &limits)?;
            let owner_id = service::project_owner(db, task.project_id)?;
            Ok::<_, BoardError>((task, owner_id))
        })
        .await?;
    state.publish(owner_id, WsMessage::TaskCreated { task: task.clone() });
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
) -> Result<impl IntoResponse, BoardError> {
    let task = state
        .db
        .call(move |db| service::get_task(db, &caller, id))
        .await?;
    Ok(Json(task))
}

async fn update_task(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
    JsonBody(req): JsonBody<UpdateTaskRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let (task, owner_id) = state
        .db
        .call(move |db| {
            let task = service::update_task(
                db,
                &caller,
                id,
                req.title.as_deref(),
                req.description.as_deref(),
            )?;
            let owner_id = service::project_owner(db, task.project_id)?;
            Ok::<_, BoardError>((task, owner_id))
        })
        .await?;
    state.publish(owner_id, WsMessage::TaskUpdated { task: task.clone() });
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    caller: Caller,
    PathId(id): PathId,
) -> Result<StatusCode, BoardError> {
    let (task, owner_id) = state
        .db
        .call(move |db| {
            let task = service::delete_task(db, &caller, id)?;
            let owner_id = service::project_owner(db, task.project_id)?;
            Ok::<_, BoardError>((task, owner_id))
        })
        .await?;
    state.publish(
        owner_id,
        WsMessage::TaskDeleted {
            task_id: task.id,
            project_id: task.project_id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn reorder_tasks(
    State(state): State<SharedState>,
    caller: Caller,
    JsonBody(req): JsonBody<MoveTaskRequest>,
) -> Result<impl IntoResponse, BoardError> {
    let mv = req.validate()?;
    let limits = state.limits;
    let (outcome, owner_id) = state
        .db
        .call(move |db| {
            let outcome = service::reposition(db, &caller, &mv, &limits)?;
            let owner_id = service::project_owner(db, outcome.task.project_id)?;
            Ok::<_, BoardError>((outcome, owner_id))
        })
        .await?;
    if outcome.writes > 0 {
        state.publish(
            owner_id,
            WsMessage::TaskMoved {
                task_id: outcome.task.id,
                project_id: outcome.task.project_id,
                from_column: outcome.from_column,
                to_column: outcome.task.status,
                position: outcome.task.position,
            },
        );
    }
    Ok(Json(serde_json::json!({
        "ok": true,
        "writes": outcome.writes,
        "task": outcome.task,
    })))
}

// ── Tests ─────────────────────────────────────────────────────────────
