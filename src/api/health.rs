use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::manager::Manager;
use crate::types::now_ms;

/// Process liveness and last-loop-tick timestamps, matching the teacher's
/// health-state pattern: one route, one JSON blob, no auth.
pub async fn health(State(manager): State<Arc<Manager>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "now_ms": now_ms(),
        "last_discovery_tick_ms": manager.health.last_discovery_tick_ms.load(Ordering::Relaxed),
        "last_sse_reconcile_tick_ms": manager.health.last_sse_reconcile_tick_ms.load(Ordering::Relaxed),
        "last_background_tick_ms": manager.health.last_background_tick_ms.load(Ordering::Relaxed),
    }))
}
