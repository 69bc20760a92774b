//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path parameters via axum extractors, calls
//! into the triage services held by AppState, and returns JSON responses.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use herald_core::types::{
    normalize_author, validate_author, AuditEntry, AuthorRecord, Category, ItemView, RawItem,
};
use herald_triage::{ActionOutcome, ActionPayload, IngestReport, PublishOutcome, SelectionQuery};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

// =============================================================================
// Request and query types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UnansweredMentionsParams {
    pub count: Option<usize>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CountParams {
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub item_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    /// Internal id of the item to answer.
    pub id: String,
    pub text: String,
    /// Quote the item instead of replying to it.
    #[serde(default)]
    pub quoted: bool,
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RepostRequest {
    /// External id of the post to repost.
    pub external_id: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub total_items: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriageResponse {
    pub items: Vec<ItemView>,
    pub count: usize,
    /// Present when the content source was queried successfully.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest: Option<IngestReport>,
    /// Present when the content source failed; results come from stored items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub success: bool,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    pub outcome: PublishOutcome,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditResponse {
    pub entries: Vec<AuditEntry>,
}

// =============================================================================
// Helpers
// =============================================================================

fn resolve_count(state: &AppState, count: Option<usize>) -> Result<usize, ApiError> {
    let triage = &state.config.triage;
    let count = count.unwrap_or(triage.default_limit);
    if count == 0 || count > triage.max_limit {
        return Err(ApiError::BadRequest(format!(
            "count must be within 1..={}, got {}",
            triage.max_limit, count
        )));
    }
    Ok(count)
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid item id: {}", raw)))
}

fn triage_response(
    items: Vec<herald_core::types::Item>,
    fetched: Result<IngestReport, String>,
) -> TriageResponse {
    let items: Vec<ItemView> = items.iter().map(ItemView::from).collect();
    let (ingest, source_error) = match fetched {
        Ok(report) => (Some(report), None),
        Err(e) => (None, Some(e)),
    };
    TriageResponse {
        count: items.len(),
        items,
        ingest,
        source_error,
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let total_items = state.store.count_items()?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        total_items,
    }))
}

/// GET /api/v1/mentions/unanswered?count&username
///
/// Pulls fresh mentions from the content source, stores them, then triages
/// open mentions. A source failure still returns already-stored items.
pub async fn unanswered_mentions(
    State(state): State<AppState>,
    Query(params): Query<UnansweredMentionsParams>,
) -> Result<Json<TriageResponse>, ApiError> {
    let count = resolve_count(&state, params.count)?;
    let fetch_count = count.saturating_mul(state.config.triage.source_fetch_factor);

    let fetched = match state.source.fetch_mentions(fetch_count).await {
        Ok(raw) => Ok(state.normalizer.ingest(&raw)),
        Err(e) => {
            warn!(error = %e, "Content source failed, triaging stored mentions only");
            Err(e.to_string())
        }
    };

    let mut query = SelectionQuery::new(count).category(Category::Mention);
    if let Some(username) = params.username.as_deref().filter(|u| !u.trim().is_empty()) {
        query = query.author(username);
    }
    let items = state.engine.select(&query)?;

    Ok(Json(triage_response(items, fetched)))
}

/// GET /api/v1/users/{username}/posts/unanswered?count
pub async fn unanswered_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<CountParams>,
) -> Result<Json<TriageResponse>, ApiError> {
    let count = resolve_count(&state, params.count)?;
    let author = validate_author(&username)?;
    let fetch_count = count.saturating_mul(state.config.triage.source_fetch_factor);

    let fetched = match state.source.fetch_authored(&author, fetch_count).await {
        Ok(raw) => Ok(state.normalizer.ingest(&raw)),
        Err(e) => {
            warn!(author = %author, error = %e, "Content source failed, triaging stored posts only");
            Err(e.to_string())
        }
    };

    let query = SelectionQuery::new(count)
        .author(author)
        .category(Category::AuthoredPost);
    let items = state.engine.select(&query)?;

    Ok(Json(triage_response(items, fetched)))
}

/// POST /api/v1/ingest
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ApiError> {
    Ok(Json(state.normalizer.ingest(&request.items)))
}

/// POST /api/v1/reply_by_id
pub async fn reply_by_id(
    State(state): State<AppState>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let id = parse_id(&request.id)?;
    let payload = if request.quoted {
        ActionPayload::quote(request.text)
    } else {
        ActionPayload::reply(request.text)
    };

    let outcome = state.transitions.act_on_item(id, payload).await?;
    info!(internal_id = %outcome.internal_id, result_id = %outcome.result_id, "Reply sent");

    Ok(Json(ReplyResponse {
        success: true,
        outcome,
    }))
}

/// POST /api/v1/post
pub async fn post(
    State(state): State<AppState>,
    Json(request): Json<PostRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let outcome = state.transitions.post(request.text).await?;
    Ok(Json(PublishResponse {
        success: true,
        outcome,
    }))
}

/// POST /api/v1/repost
pub async fn repost(
    State(state): State<AppState>,
    Json(request): Json<RepostRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let outcome = state.transitions.repost(&request.external_id).await?;
    Ok(Json(PublishResponse {
        success: true,
        outcome,
    }))
}

/// GET /api/v1/items/{id}
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemView>, ApiError> {
    let id = parse_id(&id)?;
    let item = state
        .store
        .get_item(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Item not found: {}", id)))?;
    Ok(Json(ItemView::from(&item)))
}

/// GET /api/v1/authors/{author}
pub async fn get_author(
    State(state): State<AppState>,
    Path(author): Path<String>,
) -> Result<Json<AuthorRecord>, ApiError> {
    let author = normalize_author(&author);
    let record = state
        .store
        .get_author(&author)?
        .ok_or_else(|| ApiError::NotFound(format!("No record for author: {}", author)))?;
    Ok(Json(record))
}

/// GET /api/v1/audit?item_id&limit
pub async fn list_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> Result<Json<AuditResponse>, ApiError> {
    let item_id = params.item_id.as_deref().map(parse_id).transpose()?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let entries = state.store.list_audit(item_id, limit)?;
    Ok(Json(AuditResponse { entries }))
}
