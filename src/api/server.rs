//! HTTP server implementation for the JSON API.
//!
//! Handlers validate the request, run the store call on the blocking pool and
//! translate the outcome into a status code.

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::Database;
use crate::error::{ApiError, ApiResult, FieldError};
use crate::types::{DashboardStats, Employee, Task, TaskFilter};
use crate::validation::{
    parse_employee_filter, parse_id, parse_status_filter, validate_employee_patch,
    validate_new_employee, validate_new_task, validate_status_change, validate_task_patch,
};

/// API state shared across handlers.
#[derive(Clone)]
pub struct ApiServer {
    db: Database,
}

impl ApiServer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run a store call on the blocking thread pool.
    async fn run<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::from)
    }
}

/// Health check response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Unwrap a JSON body, reporting malformed input as a validation error.
fn json_body(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<Value> {
    payload.map(|Json(v)| v).map_err(|rejection| {
        ApiError::validation(
            "Malformed request body",
            vec![FieldError::new("body", rejection.body_text())],
        )
    })
}

// ==================== EMPLOYEES ====================

async fn list_employees(State(state): State<ApiServer>) -> ApiResult<Json<Vec<Employee>>> {
    state.run(|db| db.list_employees()).await.map(Json)
}

async fn get_employee(
    State(state): State<ApiServer>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Employee>> {
    let id = parse_id(&raw_id, "employee")?;
    state
        .run(move |db| db.get_employee(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::employee_not_found(id))
}

async fn create_employee(
    State(state): State<ApiServer>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Employee>)> {
    let data = validate_new_employee(&json_body(payload)?)?;
    let employee = state.run(move |db| db.create_employee(data)).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn update_employee(
    State(state): State<ApiServer>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Employee>> {
    let id = parse_id(&raw_id, "employee")?;
    let patch = validate_employee_patch(&json_body(payload)?)?;
    state
        .run(move |db| db.update_employee(id, patch))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::employee_not_found(id))
}

async fn delete_employee(
    State(state): State<ApiServer>,
    Path(raw_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&raw_id, "employee")?;
    if state.run(move |db| db.delete_employee(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::employee_not_found(id))
    }
}

// ==================== TASKS ====================

/// Query parameters for task list.
///
/// `employee_id` is accepted as a fallback spelling; `employeeId` wins when
/// both are given.
#[derive(Debug, Default, Deserialize)]
struct TaskListParams {
    #[serde(rename = "employeeId")]
    employee_id: Option<String>,
    #[serde(rename = "employee_id")]
    employee_id_fallback: Option<String>,
    status: Option<String>,
}

impl TaskListParams {
    fn employee_id(&self) -> Option<&str> {
        self.employee_id
            .as_deref()
            .or(self.employee_id_fallback.as_deref())
    }
}

async fn list_tasks(
    State(state): State<ApiServer>,
    query: Result<Query<TaskListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Task>>> {
    let Query(params) = query.map_err(|rejection| {
        ApiError::validation(
            "Invalid task filter",
            vec![FieldError::new("query", rejection.body_text())],
        )
    })?;
    let filter = TaskFilter {
        employee_id: parse_employee_filter(params.employee_id())?,
        status: parse_status_filter(params.status.as_deref())?,
    };
    state.run(move |db| db.list_tasks(&filter)).await.map(Json)
}

async fn get_task(
    State(state): State<ApiServer>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let id = parse_id(&raw_id, "task")?;
    state
        .run(move |db| db.get_task(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::task_not_found(id))
}

async fn create_task(
    State(state): State<ApiServer>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let data = validate_new_task(&json_body(payload)?)?;
    let task = state.run(move |db| db.create_task(data)).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<ApiServer>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let id = parse_id(&raw_id, "task")?;
    let patch = validate_task_patch(&json_body(payload)?)?;
    state
        .run(move |db| db.update_task(id, patch))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::task_not_found(id))
}

async fn update_task_status(
    State(state): State<ApiServer>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let id = parse_id(&raw_id, "task")?;
    let status = validate_status_change(&json_body(payload)?)?;
    state
        .run(move |db| db.set_task_status(id, status))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::task_not_found(id))
}

async fn delete_task(
    State(state): State<ApiServer>,
    Path(raw_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&raw_id, "task")?;
    if state.run(move |db| db.delete_task(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::task_not_found(id))
    }
}

// ==================== DASHBOARD ====================

async fn dashboard(State(state): State<ApiServer>) -> ApiResult<Json<DashboardStats>> {
    state.run(|db| db.dashboard_stats()).await.map(Json)
}

/// Build the router with all routes.
pub fn build_router(db: Database) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/employees", get(list_employees).post(create_employee))
        .route(
            "/api/employees/{id}",
            get(get_employee)
                .put(update_employee)
                .delete(delete_employee),
        )
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/status", patch(update_task_status))
        .route("/api/dashboard", get(dashboard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ApiServer::new(db))
}

/// Handle for a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and wait for in-flight requests to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("API server task failed: {}", e);
        }
    }
}

/// Start the HTTP server on the given address.
///
/// Port 0 binds an ephemeral port; the returned handle reports the real one.
pub async fn start_server(db: Database, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
    let app = build_router(db);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("API server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("API server shutting down");
            })
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr: bound_addr,
        shutdown_tx,
        task,
    })
}
