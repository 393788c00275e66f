use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::{ApiJson, ApiQuery};
use crate::bookkeeping::{ExportFormat, export_csv, export_sie};
use crate::error::Result;
use crate::lifecycle::receipts::{self, ManualEntry};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/entries", get(list).post(create))
        .route("/export", get(export))
}

async fn list(State(state): State<AppState>) -> Result<Json<Value>> {
    let entries = state.store.list_entries().await?;
    Ok(Json(json!({ "ok": true, "entries": entries })))
}

async fn create(State(state): State<AppState>, ApiJson(manual): ApiJson<ManualEntry>) -> Result<Json<Value>> {
    let entry = receipts::add_manual_entry(&state, manual).await?;
    Ok(Json(json!({ "ok": true, "entry": entry })))
}

#[derive(Deserialize)]
struct ExportQuery {
    #[serde(default)]
    format: ExportFormat,
}

async fn export(State(state): State<AppState>, ApiQuery(query): ApiQuery<ExportQuery>) -> Result<impl IntoResponse> {
    let entries = state.store.list_entries().await?;
    let today = Utc::now().date_naive();
    let body = match query.format {
        ExportFormat::Sie => export_sie(&entries, &state.config.company_name, today),
        ExportFormat::Csv => export_csv(&entries),
    };
    tracing::info!(entries = entries.len(), format = ?query.format, "bookkeeping exported");

    let disposition = format!("attachment; filename=\"{}\"", query.format.file_name(today));
    Ok((
        [
            (header::CONTENT_TYPE, query.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
