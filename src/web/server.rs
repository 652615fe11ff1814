use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use log::{info, warn};
use serde::Deserialize;

use crate::grid::{
    Direction, GridError, GridExchange, GridManager, GridPlan, GridRequest, GridResult,
    GridStateMap, TrackedGrid,
};

use super::dashboard::render_status_page;

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<GridManager<dyn GridExchange>>,
    /// Leverage applied when a request omits it
    pub default_leverage: u32,
}

/// Grid request as submitted by a client; leverage is optional
#[derive(Debug, Clone, Deserialize)]
pub struct GridRequestBody {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub distance: f64,
    pub steps: u32,
    pub total_quantity: f64,
    pub loss_budget: f64,
    pub tp_count: u32,
    pub tp_distance: f64,
    #[serde(default)]
    pub leverage: Option<u32>,
}

impl GridRequestBody {
    pub fn into_request(self, default_leverage: u32) -> GridRequest {
        GridRequest {
            symbol: self.symbol.trim().to_uppercase(),
            direction: self.direction,
            entry_price: self.entry_price,
            distance: self.distance,
            steps: self.steps,
            total_quantity: self.total_quantity,
            loss_budget: self.loss_budget,
            tp_count: self.tp_count,
            tp_distance: self.tp_distance,
            leverage: self.leverage.unwrap_or(default_leverage),
        }
    }
}

/// Grid error rendered as a JSON response
#[derive(Debug)]
pub struct ApiError(pub GridError);

impl From<GridError> for ApiError {
    fn from(err: GridError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GridError::InvalidRequest(_) | GridError::NoViableOrders => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            GridError::GridAlreadyTracked(_) => StatusCode::CONFLICT,
            GridError::AssetNotFound(_) => StatusCode::NOT_FOUND,
            GridError::InvalidOrder { .. } | GridError::Exchange { .. } | GridError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            GridError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            GridError::Configuration(_)
            | GridError::StatePersistence(_)
            | GridError::JsonParse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_page_handler))
        .route("/api/symbols", get(symbols_handler))
        .route("/api/grids", get(grids_handler).post(create_handler))
        .route("/api/grids/preview", post(preview_handler))
        .route("/api/grids/:symbol", delete(cancel_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> GridResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| GridError::Configuration(format!("invalid server address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GridError::Configuration(format!("cannot bind {}: {}", addr, e)))?;
    info!("Grid server running on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GridError::Http(e.to_string()))?;
    Ok(())
}

async fn status_page_handler(State(state): State<AppState>) -> Html<String> {
    let grids = state.manager.list_tracked_grids().await;
    Html(render_status_page(&grids))
}

pub(crate) async fn symbols_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.manager.list_available_symbols().await?))
}

pub(crate) async fn grids_handler(State(state): State<AppState>) -> Json<GridStateMap> {
    Json(state.manager.list_tracked_grids().await)
}

pub(crate) async fn preview_handler(
    State(state): State<AppState>,
    Json(body): Json<GridRequestBody>,
) -> Result<Json<GridPlan>, ApiError> {
    let request = body.into_request(state.default_leverage);
    let plan = state.manager.plan_grid(&request).await.map_err(|e| {
        warn!("Preview for {} failed: {}", request.symbol, e);
        e
    })?;
    Ok(Json(plan))
}

pub(crate) async fn create_handler(
    State(state): State<AppState>,
    Json(body): Json<GridRequestBody>,
) -> Result<(StatusCode, Json<TrackedGrid>), ApiError> {
    let request = body.into_request(state.default_leverage);
    let tracked = state.manager.create_grid(&request).await?;
    Ok((StatusCode::CREATED, Json(tracked)))
}

pub(crate) async fn cancel_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<serde_json::Value> {
    let symbol = symbol.trim().to_uppercase();
    state.manager.cancel_grid(&symbol).await;
    Json(serde_json::json!({ "cancelled": symbol }))
}
