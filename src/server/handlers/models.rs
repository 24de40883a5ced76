//! `GET /v1/models` — lists the client-facing model ids from
//! `models.json`, or an empty list when no mapping is configured.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::pipeline::AppState;

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let data: Vec<Value> = state
        .config
        .models
        .keys()
        .map(|id| json!({ "id": id, "object": "model", "owned_by": "jetgate" }))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}
