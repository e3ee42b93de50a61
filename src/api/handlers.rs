use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ApiJson, ApiPath, ApiQuery};
use super::AppState;
use crate::db;
use crate::mirror::{self, SyncReport};
use crate::model::{AdsView, Advertiser, LinkRequest, MatchSuggestions, MessageResponse};
use crate::reconcile::{self, Command};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdsViewQuery {
    #[serde(default)]
    pub include_archived: bool,
}

pub async fn ads_view(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AdsViewQuery>,
) -> ApiResult<AdsView> {
    Ok(Json(db::ads_view(&state.pool, query.include_archived).await?))
}

pub async fn match_suggestions(
    State(state): State<AppState>,
    ApiPath(external_id): ApiPath<i64>,
) -> ApiResult<MatchSuggestions> {
    let item = db::fetch_ad_item(&state.pool, external_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("media item {} not found", external_id)))?;
    if item.link.is_archived() {
        return Err(ApiError::Conflict(format!(
            "media item {} is archived; unarchive it before matching",
            external_id
        )));
    }
    let advertisers = db::list_advertisers(&state.pool).await?;
    Ok(Json(state.matcher.suggest(&item.media.name, &advertisers)))
}

pub async fn link(
    State(state): State<AppState>,
    ApiPath(external_id): ApiPath<i64>,
    ApiJson(request): ApiJson<LinkRequest>,
) -> ApiResult<MessageResponse> {
    let link = request.into_link()?;
    command(&state, external_id, Command::Link(link)).await
}

pub async fn unlink(
    State(state): State<AppState>,
    ApiPath(external_id): ApiPath<i64>,
) -> ApiResult<MessageResponse> {
    command(&state, external_id, Command::Unlink).await
}

pub async fn archive(
    State(state): State<AppState>,
    ApiPath(external_id): ApiPath<i64>,
) -> ApiResult<MessageResponse> {
    command(&state, external_id, Command::Archive).await
}

pub async fn unarchive(
    State(state): State<AppState>,
    ApiPath(external_id): ApiPath<i64>,
) -> ApiResult<MessageResponse> {
    command(&state, external_id, Command::Unarchive).await
}

async fn command(
    state: &AppState,
    external_id: i64,
    command: Command,
) -> ApiResult<MessageResponse> {
    let applied = reconcile::execute(&state.pool, external_id, command).await?;
    Ok(Json(MessageResponse::new(applied.message)))
}

pub async fn list_advertisers(State(state): State<AppState>) -> ApiResult<Vec<Advertiser>> {
    Ok(Json(db::list_advertisers(&state.pool).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpsertAdvertiser {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

pub async fn upsert_advertiser(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UpsertAdvertiser>,
) -> ApiResult<Advertiser> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name must be non-empty".into()));
    }
    let id = match body.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };
    let advertiser = db::upsert_advertiser(&state.pool, &id, name).await?;
    info!(id = %advertiser.id, name = %advertiser.name, "advertiser saved");
    Ok(Json(advertiser))
}

pub async fn run_sync(State(state): State<AppState>) -> ApiResult<SyncReport> {
    let source = state
        .source
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("yodeck sync is not configured".into()))?;
    let report =
        mirror::refresh(&state.pool, source.as_ref(), &state.matcher, state.auto_link).await?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
