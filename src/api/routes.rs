use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::health;
use crate::error::AppError;
use crate::manager::Manager;
use crate::types::{Mode, Token, ViewMode};

pub type ApiState = Arc<Manager>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tokens/top", get(get_top))
        .route("/tokens/holder", get(get_holder_list))
        .route("/tokens/all", get(get_all))
        .route("/tokens/counts", get(get_counts))
        .route("/tokens/mvp", get(get_mvp))
        .route("/tokens/holder-mvp", get(get_holder_mvp))
        .route("/blacklist", get(get_blacklist).post(post_blacklist))
        .route("/blacklist/:addr", axum::routing::delete(delete_blacklist))
        .route("/mode", get(get_mode).post(post_mode))
        .route("/view-mode", get(get_view_mode).post(post_view_mode))
        .route("/purge", post(post_purge))
        .route("/test/mc-check", get(get_mc_check))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query / body structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TopQuery {
    #[serde(rename = "viewMode")]
    pub view_mode: Option<String>,
}

#[derive(Deserialize)]
pub struct McCheckQuery {
    pub address: String,
}

#[derive(Deserialize)]
pub struct BlacklistBody {
    pub address: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct ModeBody {
    pub mode: String,
}

#[derive(Deserialize)]
pub struct ViewModeBody {
    #[serde(rename = "viewMode")]
    pub view_mode: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct CountsResponse {
    pub degen: usize,
    pub holder: usize,
    pub blacklisted: usize,
}

#[derive(Serialize)]
pub struct MvpResponse {
    pub token: Token,
    pub score: f64,
    pub mvp_since: Option<u64>,
}

#[derive(Serialize)]
pub struct HolderMvpResponse {
    pub token: Token,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_top(
    State(manager): State<ApiState>,
    Query(params): Query<TopQuery>,
) -> Json<Vec<Token>> {
    let view_mode = params
        .view_mode
        .map(|s| ViewMode::from_str(&s))
        .unwrap_or_else(|| manager.view_mode());
    Json(manager.top10(view_mode))
}

async fn get_holder_list(State(manager): State<ApiState>) -> Json<Vec<Token>> {
    Json(manager.holder_list())
}

async fn get_all(State(manager): State<ApiState>) -> Json<Vec<Token>> {
    Json(manager.all())
}

async fn get_counts(State(manager): State<ApiState>) -> Json<CountsResponse> {
    let (degen, holder, blacklisted) = manager.counts().await;
    Json(CountsResponse { degen, holder, blacklisted })
}

async fn get_mvp(State(manager): State<ApiState>) -> Result<Json<MvpResponse>, AppError> {
    match manager.mvp().await {
        Some((token, score, mvp_since)) => Ok(Json(MvpResponse { token, score, mvp_since })),
        None => Err(AppError::NotFound("no mvp: top10 is empty".to_string())),
    }
}

async fn get_holder_mvp(State(manager): State<ApiState>) -> Result<Json<HolderMvpResponse>, AppError> {
    match manager.holder_mvp() {
        Some((token, score)) => Ok(Json(HolderMvpResponse { token, score })),
        None => Err(AppError::NotFound("no holder mvp: holder list is empty".to_string())),
    }
}

async fn get_blacklist(
    State(manager): State<ApiState>,
) -> Result<Json<Vec<crate::db::models::BlacklistRow>>, AppError> {
    Ok(Json(manager.blacklist_list().await?))
}

async fn post_blacklist(
    State(manager): State<ApiState>,
    Json(body): Json<BlacklistBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    manager.blacklist_add(&body.address, &body.name).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn delete_blacklist(
    State(manager): State<ApiState>,
    Path(addr): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    manager.blacklist_remove(&addr).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn get_mode(State(manager): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "mode": manager.mode().as_str() }))
}

async fn post_mode(
    State(manager): State<ApiState>,
    Json(body): Json<ModeBody>,
) -> Json<serde_json::Value> {
    manager.set_mode(Mode::from_str(&body.mode));
    Json(serde_json::json!({ "mode": manager.mode().as_str() }))
}

async fn get_view_mode(State(manager): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "viewMode": manager.view_mode().as_str() }))
}

async fn post_view_mode(
    State(manager): State<ApiState>,
    Json(body): Json<ViewModeBody>,
) -> Json<serde_json::Value> {
    manager.set_view_mode(ViewMode::from_str(&body.view_mode));
    Json(serde_json::json!({ "viewMode": manager.view_mode().as_str() }))
}

async fn post_purge(State(manager): State<ApiState>) -> Result<Json<serde_json::Value>, AppError> {
    manager.purge().await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn get_mc_check(
    State(manager): State<ApiState>,
    Query(params): Query<McCheckQuery>,
) -> Json<serde_json::Value> {
    let results = manager.mc_check(&params.address).await;
    match results.into_iter().next().flatten() {
        Some(m) => Json(serde_json::json!({
            "address": params.address,
            "price_usd": m.price_usd,
            "market_cap": m.market_cap,
            "volume_24h": m.volume_24h,
            "liquidity": m.liquidity,
        })),
        None => Json(serde_json::json!({ "address": params.address, "result": null })),
    }
}
