//! Control/read HTTP API for frontends.
//!
//! Read-only views of the fleet plus the only control surface that exists:
//! start/stop per login, start-all/stop-all, and reload of the declarative
//! account list.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::domain::PositionRecord;
use crate::error::{FleetError, Result};
use crate::supervisor::{Fleet, FleetTotals, InstanceView, ReconcileOutcome};

/// One open position tagged with the account that holds it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetPosition {
    pub login: i64,
    #[serde(flatten)]
    pub position: PositionRecord,
}

/// Build the API router
pub fn router(fleet: Arc<Fleet>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/accounts/:login", get(account))
        .route("/accounts/:login/deals", get(deals))
        .route("/positions", get(positions))
        .route("/totals", get(totals))
        .route("/accounts/:login/start", post(start))
        .route("/accounts/:login/stop", post(stop))
        .route("/start-all", post(start_all))
        .route("/stop-all", post(stop_all))
        .route("/reload", post(reload))
        .layer(CorsLayer::permissive())
        .with_state(fleet)
}

/// Serve the API until the task is aborted
pub async fn serve(fleet: Arc<Fleet>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Control API listening on http://{addr}");

    axum::serve(listener, router(fleet)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}

async fn status(State(fleet): State<Arc<Fleet>>) -> Json<Vec<InstanceView>> {
    Json(fleet.views().await)
}

async fn account(
    State(fleet): State<Arc<Fleet>>,
    Path(login): Path<i64>,
) -> ApiResult<Json<InstanceView>> {
    let view = fleet
        .view(login)
        .await
        .ok_or(FleetError::UnknownLogin(login))?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct DealsQuery {
    limit: Option<i64>,
}

async fn deals(
    State(fleet): State<Arc<Fleet>>,
    Path(login): Path<i64>,
    Query(query): Query<DealsQuery>,
) -> ApiResult<Json<Vec<crate::domain::DealRecord>>> {
    let deals = fleet.deals(login, query.limit.unwrap_or(100)).await?;
    Ok(Json(deals))
}

async fn positions(State(fleet): State<Arc<Fleet>>) -> Json<Vec<FleetPosition>> {
    let positions = fleet
        .views()
        .await
        .into_iter()
        .flat_map(|view| {
            let login = view.login;
            view.positions
                .into_iter()
                .map(move |position| FleetPosition { login, position })
        })
        .collect();
    Json(positions)
}

async fn totals(State(fleet): State<Arc<Fleet>>) -> Json<FleetTotals> {
    Json(fleet.totals().await)
}

async fn start(
    State(fleet): State<Arc<Fleet>>,
    Path(login): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    fleet.start(login).await?;
    Ok(Json(serde_json::json!({ "login": login, "started": true })))
}

async fn stop(
    State(fleet): State<Arc<Fleet>>,
    Path(login): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    fleet.stop(login).await?;
    Ok(Json(serde_json::json!({ "login": login, "stopped": true })))
}

async fn start_all(State(fleet): State<Arc<Fleet>>) -> Json<serde_json::Value> {
    let started = fleet.start_all().await;
    Json(serde_json::json!({ "started": started }))
}

async fn stop_all(State(fleet): State<Arc<Fleet>>) -> Json<serde_json::Value> {
    let stopped = fleet.stop_all().await;
    Json(serde_json::json!({ "stopped": stopped }))
}

async fn reload(State(fleet): State<Arc<Fleet>>) -> ApiResult<Json<ReconcileOutcome>> {
    let outcome = fleet.reload().await?;
    Ok(Json(outcome))
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Maps fleet errors onto HTTP status codes
struct ApiError(FleetError);

impl From<FleetError> for ApiError {
    fn from(error: FleetError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FleetError::UnknownLogin(_) => StatusCode::NOT_FOUND,
            FleetError::AlreadyRunning(_) => StatusCode::CONFLICT,
            FleetError::AccountList(_) | FleetError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
