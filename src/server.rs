use crate::config::AppConfig;
use crate::dashboard::{CallbackOutput, ComponentProperty, Dashboard, Layout};
use crate::error::RenderError;
use crate::figure::Figure;
use crate::types::JoinReport;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const INDEX_HTML: &str = include_str!("index.html");

pub struct AppState {
    pub dashboard: Dashboard,
}

#[derive(Deserialize)]
pub struct FigureParams {
    measure: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackRequest {
    trigger: ComponentProperty,
    value: Value,
}

pub struct ApiError(RenderError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RenderError::UnknownMeasure(_) | RenderError::UnknownTrigger { .. } => {
                StatusCode::NOT_FOUND
            }
            RenderError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError(err)
    }
}

pub fn build_router(state: Arc<AppState>, assets_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/api/layout", get(layout_handler))
        .route("/api/callback", post(callback_handler))
        .route("/api/figure", get(figure_handler))
        .route("/api/report", get(report_handler));

    if let Some(dir) = assets_dir {
        router = router.nest_service("/assets", ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: &AppConfig, dashboard: Dashboard) -> Result<()> {
    info!(
        counties = dashboard.table().len(),
        measures = dashboard.layout().dropdown.options.len(),
        "dashboard ready"
    );
    let state = Arc::new(AppState { dashboard });

    let addr = config.bind_addr()?;
    let app = build_router(state, config.server.assets_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("serving dashboard on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn layout_handler(State(state): State<Arc<AppState>>) -> Json<Layout> {
    Json(state.dashboard.layout().clone())
}

async fn report_handler(State(state): State<Arc<AppState>>) -> Json<JoinReport> {
    Json(state.dashboard.table().report().clone())
}

async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallbackRequest>,
) -> Result<Json<CallbackOutput>, ApiError> {
    debug!(
        component = %request.trigger.component,
        property = %request.trigger.property,
        "dispatching callback"
    );
    let output = state.dashboard.dispatch(&request.trigger, &request.value)?;
    Ok(Json(output))
}

async fn figure_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FigureParams>,
) -> Result<Json<Figure>, ApiError> {
    let measure = params
        .measure
        .as_deref()
        .unwrap_or_else(|| state.dashboard.default_measure());
    Ok(Json(state.dashboard.render(measure)?))
}
