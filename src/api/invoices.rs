use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::extract::{ApiPath, ApiQuery};
use crate::error::Result;
use crate::lifecycle::invoices;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{id}", get(show))
        .route("/{id}/send", post(send))
        .route("/{id}/export-bookkeeping", post(export_bookkeeping))
        .route("/{id}/mark-paid", post(mark_paid))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    customer_id: Option<Uuid>,
}

async fn list(State(state): State<AppState>, ApiQuery(query): ApiQuery<ListQuery>) -> Result<Json<Value>> {
    let invoices = state.store.list_invoices(query.customer_id).await?;
    Ok(Json(json!({ "ok": true, "invoices": invoices })))
}

async fn show(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let invoice = invoices::require_invoice(&state, id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}

async fn send(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let invoice = invoices::send_invoice(&state, id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}

async fn export_bookkeeping(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let (invoice, entry) = invoices::export_to_bookkeeping(&state, id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice, "entry": entry })))
}

async fn mark_paid(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let invoice = invoices::mark_paid(&state, id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}
