use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::{ApiJson, ApiQuery};
use crate::error::Result;
use crate::lifecycle::time::{NewTimeEntry, log_time};
use crate::models::TimeFilter;
use crate::state::AppState;
use crate::time_stats;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/stats", get(stats))
}

async fn create(State(state): State<AppState>, ApiJson(new): ApiJson<NewTimeEntry>) -> Result<Json<Value>> {
    let entry = log_time(&state, new).await?;
    Ok(Json(json!({ "ok": true, "entry": entry })))
}

async fn list(State(state): State<AppState>, ApiQuery(filter): ApiQuery<TimeFilter>) -> Result<Json<Value>> {
    let entries = state.store.list_time_entries(&filter).await?;
    Ok(Json(json!({ "ok": true, "entries": entries })))
}

#[derive(Deserialize)]
struct StatsQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

async fn stats(State(state): State<AppState>, ApiQuery(query): ApiQuery<StatsQuery>) -> Result<Json<Value>> {
    let filter = TimeFilter {
        from: query.from,
        to: query.to,
        customer_id: None,
    };
    let entries = state.store.list_time_entries(&filter).await?;
    let stats = time_stats::compute(&entries);
    Ok(Json(json!({ "ok": true, "entryCount": entries.len(), "stats": stats })))
}
