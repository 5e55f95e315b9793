use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{AppState, AuthUser};
use crate::analysis::{validate_campaign_data, AnalysisError};
use crate::backend::{BackendError, DashboardStore, ToolStore};
use crate::models::{
    AnalysisSummary, DailyMetric, Product, SavedAnalysis, ToolRecord, User, UserId,
};

/// Most rows a tool read may ask for.
const MAX_TOOL_ROWS: usize = 100;

/// Error returned by a route, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

fn backend_status(err: &BackendError) -> StatusCode {
    match err {
        BackendError::NotFound(_) => StatusCode::NOT_FOUND,
        BackendError::Conflict(_) => StatusCode::CONFLICT,
        BackendError::NoSession => StatusCode::UNAUTHORIZED,
        BackendError::Status { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Backend(e) => backend_status(e),
            ServerError::Analysis(e) => match e {
                AnalysisError::EmptyInput | AnalysisError::InvalidInput => StatusCode::BAD_REQUEST,
                AnalysisError::NoSession => StatusCode::UNAUTHORIZED,
                AnalysisError::Upstream { status, .. } => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                AnalysisError::Backend(e) => backend_status(e),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("request failed with {}: {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ServerError>;

fn ensure_owner(user: &User, owner: &UserId) -> ApiResult<()> {
    if &user.id == owner {
        Ok(())
    } else {
        Err(ServerError::Forbidden(format!(
            "cannot write rows owned by {}",
            owner
        )))
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::version(),
    }))
}

pub async fn me(Extension(AuthUser(user)): Extension<AuthUser>) -> Json<User> {
    Json(user)
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    limit: Option<usize>,
}

pub async fn get_tool(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(tool): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<ToolRecord>>> {
    let limit = query.limit.unwrap_or(1).min(MAX_TOOL_ROWS);
    let records = state
        .backend
        .select_tool_records(&user.id, &tool, limit)
        .await?;
    Ok(Json(records))
}

pub async fn put_tool(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(tool): Path<String>,
    Json(record): Json<ToolRecord>,
) -> ApiResult<Json<ToolRecord>> {
    ensure_owner(&user, &record.owner_id)?;
    if record.tool_name != tool {
        return Err(ServerError::BadRequest(format!(
            "record for '{}' sent to '{}'",
            record.tool_name, tool
        )));
    }
    let stored = state.backend.upsert_tool_record(&record).await?;
    tracing::debug!("{} saved {}", user.id, tool);
    Ok(Json(stored))
}

pub async fn list_products(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.backend.list_products(&user.id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(product): Json<Product>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    ensure_owner(&user, &product.owner_id)?;
    if product.name.trim().is_empty() {
        return Err(ServerError::BadRequest("product name is required".into()));
    }
    let stored = state.backend.insert_product(&product).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.backend.product_has_metrics(&user.id, id).await? {
        return Err(ServerError::Conflict(
            "product has ledger entries and cannot be deleted".into(),
        ));
    }
    state.backend.delete_product(&user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn product_has_metrics(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let has_metrics = state.backend.product_has_metrics(&user.id, id).await?;
    Ok(Json(json!({ "has_metrics": has_metrics })))
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    product_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
}

pub async fn get_metrics(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<Vec<DailyMetric>>> {
    if query.from > query.to {
        return Err(ServerError::BadRequest("'from' is after 'to'".into()));
    }
    let metrics = state
        .backend
        .select_daily_metrics(&user.id, query.product_id, query.from, query.to)
        .await?;
    Ok(Json(metrics))
}

pub async fn put_metric(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(metric): Json<DailyMetric>,
) -> ApiResult<Json<DailyMetric>> {
    ensure_owner(&user, &metric.owner_id)?;
    Ok(Json(state.backend.upsert_daily_metric(&metric).await?))
}

pub async fn list_analyses(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> ApiResult<Json<Vec<AnalysisSummary>>> {
    Ok(Json(state.backend.list_analyses(&user.id).await?))
}

pub async fn create_analysis(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(analysis): Json<SavedAnalysis>,
) -> ApiResult<(StatusCode, Json<SavedAnalysis>)> {
    ensure_owner(&user, &analysis.owner_id)?;
    let stored = state.backend.insert_analysis(&analysis).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_analysis(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SavedAnalysis>> {
    state
        .backend
        .get_analysis(&user.id, id)
        .await?
        .map(Json)
        .ok_or_else(|| BackendError::NotFound(format!("analysis {}", id)).into())
}

pub async fn delete_analysis(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.backend.delete_analysis(&user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body of the analysis function; `campaignData` is checked by hand so
/// a missing or non-string field gets the same answer as an oversized one.
pub async fn analyze(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let campaign_data = body
        .get("campaignData")
        .and_then(Value::as_str)
        .ok_or(AnalysisError::InvalidInput)?;
    validate_campaign_data(campaign_data)?;

    tracing::info!(
        "Analyzing {} characters of campaign data for {}",
        campaign_data.chars().count(),
        user.id
    );
    let analysis = state.analyzer.analyze(campaign_data).await?;
    Ok(Json(json!({ "analysis": analysis })))
}
