use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{sse::{Event, KeepAlive, Sse}, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use anyhow::Result;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app::LunchApp;
use crate::error::AppError;
use crate::recommend::RecommendError;
use crate::selection::SelectionError;

pub type AppState = Arc<LunchApp>;

/// JSON error body with a status derived from the domain error
pub struct ApiError(AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::UnknownItem(_) => StatusCode::NOT_FOUND,
            AppError::ConfirmationRequired => StatusCode::PRECONDITION_FAILED,
            AppError::Selection(SelectionError::MissingCredential) => StatusCode::UNAUTHORIZED,
            AppError::Selection(_) => StatusCode::CONFLICT,
            AppError::Recommend(RecommendError::MissingCredential | RecommendError::InvalidCredential) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Recommend(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self { Self(err) }
}

impl From<SelectionError> for ApiError {
    fn from(err: SelectionError) -> Self { Self(err.into()) }
}

#[derive(Deserialize)]
struct ClearParams {
    #[serde(default)]
    confirm: bool,
}

#[derive(Deserialize)]
struct AiRequest {
    #[serde(default)]
    condition: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyRequest {
    api_key: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/menu", get(menu))
        .route("/api/orders", get(orders).delete(clear_orders))
        .route("/api/orders/{id}/increment", post(increment))
        .route("/api/orders/{id}/decrement", post(decrement))
        .route("/api/selection", get(selection))
        .route("/api/selection/random", post(start_random))
        .route("/api/selection/ai", post(start_ai))
        .route("/api/selection/reset", post(reset_selection))
        .route("/api/selection/cancel", post(cancel_selection))
        .route("/api/selection/order", post(order_result))
        .route("/api/events", get(events))
        .route("/api/session/key", post(set_key))
        .route("/api/session/logout", post(logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, bind: &str) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Green FC lunch API listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}

async fn menu(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog().clone())
}

async fn orders(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orders().await)
}

async fn increment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.increment(&id).await?;
    Ok(Json(serde_json::json!({ "id": id, "count": count })))
}

async fn decrement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.decrement(&id).await?;
    Ok(Json(serde_json::json!({ "id": id, "count": count })))
}

async fn clear_orders(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Result<impl IntoResponse, ApiError> {
    state.clear_orders(params.confirm).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn selection(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.selection().snapshot().await)
}

async fn start_random(State(state): State<AppState>) -> impl IntoResponse {
    let invocation = state.selection().start_random_pick().await;
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "invocation": invocation })))
}

async fn start_ai(
    State(state): State<AppState>,
    Json(req): Json<AiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invocation = state.selection().start_ai_recommendation(&req.condition).await?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "invocation": invocation }))))
}

async fn reset_selection(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.selection().reset().await?;
    Ok(Json(state.selection().snapshot().await))
}

async fn cancel_selection(State(state): State<AppState>) -> impl IntoResponse {
    state.selection().cancel().await;
    Json(state.selection().snapshot().await)
}

async fn order_result(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.order_result().await?;
    Ok(Json(state.orders().await))
}

async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let (sse_tx, sse_rx) = tokio::sync::mpsc::unbounded_channel::<Result<Event, Infallible>>();
    let mut rx = state.selection().subscribe();
    let current = state.selection().snapshot().await;

    tokio::spawn(async move {
        let mut next = Some(current);
        loop {
            let snapshot = match next.take() {
                Some(snapshot) => snapshot,
                None => match rx.recv().await {
                    Ok(snapshot) => snapshot,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                },
            };
            let event = match Event::default().event(snapshot.state.mode()).json_data(&snapshot) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Could not encode selection event: {}", e);
                    continue;
                }
            };
            if sse_tx.send(Ok(event)).is_err() {
                break;
            }
        }
    });

    Sse::new(tokio_stream::wrappers::UnboundedReceiverStream::new(sse_rx))
        .keep_alive(KeepAlive::default())
}

async fn set_key(
    State(state): State<AppState>,
    Json(req): Json<KeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.set_api_key(&req.api_key).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.logout().await?;
    Ok(Json(serde_json::json!({ "status": "logged_out" })))
}
