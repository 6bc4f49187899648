//! Router, shared state, and server lifecycle.

use super::{tasks, users};
use crate::access::RelationPolicy;
use crate::auth::TokenKeys;
use crate::config::Config;
use crate::db::Database;
use crate::error::{ApiError, ErrorCode};
use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    tokens: TokenKeys,
    policy: RelationPolicy,
}

impl AppState {
    pub fn new(db: Arc<Database>, tokens: TokenKeys, policy: RelationPolicy) -> Self {
        Self { db, tokens, policy }
    }

    /// Build state from a validated config.
    pub fn from_config(db: Arc<Database>, config: &Config) -> Self {
        Self::new(
            db,
            TokenKeys::new(&config.auth.jwt_secret, config.auth.token_ttl_seconds),
            config.auth.relation_policy,
        )
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn tokens(&self) -> &TokenKeys {
        &self.tokens
    }

    pub fn policy(&self) -> RelationPolicy {
        self.policy
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.code {
            ErrorCode::MissingRequiredField | ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCode::UserNotFound
            | ErrorCode::ParentNotFound
            | ErrorCode::ChildNotFound
            | ErrorCode::RelationshipNotFound
            | ErrorCode::TaskNotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(code = ?self.code, message = %self.message, "Request failed");
        }

        (status, Json(self)).into_response()
    }
}

/// Health check response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the application router.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Accounts
        .route("/users", get(users::get_users))
        .route("/users/signup", post(users::sign_up))
        .route("/users/signin", post(users::sign_in))
        .route("/users/{user_id}", delete(users::delete_user))
        .route("/users/{user_id}/role", patch(users::update_user_role))
        // Supervision graph
        .route("/users/{user_id}/children", get(users::get_children))
        .route("/users/{user_id}/parents", get(users::get_parents))
        .route(
            "/users/{user_id}/children/{child_id}",
            post(users::add_child_to_parent).delete(users::remove_child_from_parent),
        )
        .route(
            "/users/{user_id}/parents/{parent_id}",
            delete(users::remove_parent_from_child),
        )
        // Tasks
        .route("/tasks", get(tasks::get_tasks).post(tasks::create_task))
        .route("/tasks/{task_id}", get(tasks::get_task).delete(tasks::delete_task))
        .route("/tasks/{task_id}/status", patch(tasks::update_task_status))
        .route(
            "/tasks/{task_id}/description",
            patch(tasks::update_task_description),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// A running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal graceful shutdown and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            error!("Server task failed: {}", e);
        }
    }
}

/// Bind and start serving on `addr`. Port 0 picks a free port.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    cors_origins: &[String],
) -> anyhow::Result<ServerHandle> {
    let app = build_router(state, cors_origins);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Application listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Server shutting down");
            })
            .await
        {
            error!("Server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr: bound_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}
