use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, UploadForm};
use crate::customer_match::SearchQuery;
use crate::error::{AppError, Result};
use crate::lifecycle::{customers, require_customer};
use crate::models::{CustomerInput, DocumentType};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/search", post(search))
        .route("/import", post(import))
        .route("/{id}", get(show).put(update).delete(remove))
        .route("/{id}/related-docs", get(related_docs))
        .route("/{id}/flow", get(flow))
        .route("/{id}/documents", post(upload_document))
}

async fn list(State(state): State<AppState>) -> Result<Json<Value>> {
    let customers = state.store.list_customers().await?;
    Ok(Json(json!({ "ok": true, "customers": customers })))
}

async fn create(State(state): State<AppState>, ApiJson(input): ApiJson<CustomerInput>) -> Result<Json<Value>> {
    let customer = customers::create_customer(&state, input).await?;
    Ok(Json(json!({ "ok": true, "customer": customer })))
}

async fn show(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let customer = require_customer(&state, id).await?;
    Ok(Json(json!({ "ok": true, "customer": customer })))
}

async fn update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<CustomerInput>,
) -> Result<Json<Value>> {
    let customer = customers::update_customer(&state, id, input).await?;
    Ok(Json(json!({ "ok": true, "customer": customer })))
}

async fn remove(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let files_removed = customers::delete_customer(&state, id).await?;
    Ok(Json(json!({ "ok": true, "filesRemoved": files_removed })))
}

async fn search(State(state): State<AppState>, ApiJson(query): ApiJson<SearchQuery>) -> Result<Json<Value>> {
    let found = customers::search_customers(&state, &query).await?;
    let message = if found.is_empty() {
        "Ingen befintlig kund hittades"
    } else {
        "Befintlig kund hittades"
    };
    Ok(Json(json!({ "ok": true, "customers": found, "message": message })))
}

#[derive(Deserialize)]
struct ImportBody {
    #[serde(default)]
    customers: Vec<CustomerInput>,
}

async fn import(State(state): State<AppState>, ApiJson(body): ApiJson<ImportBody>) -> Result<Json<Value>> {
    let summary = customers::import_customers(&state, body.customers).await?;
    Ok(Json(json!({
        "ok": true,
        "created": summary.created,
        "updated": summary.updated,
        "unchanged": summary.unchanged,
        "skipped": summary.skipped,
        "customers": summary.customers,
    })))
}

async fn related_docs(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let related = customers::related_docs(&state, id).await?;
    let mut body = serde_json::to_value(related).map_err(anyhow::Error::from)?;
    body["ok"] = Value::Bool(true);
    Ok(Json(body))
}

async fn flow(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    require_customer(&state, id).await?;
    let flow = state.store.get_flow(id).await?;
    Ok(Json(json!({ "ok": true, "flow": flow })))
}

async fn upload_document(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file")?;
    let doc_type = match form.field("docType") {
        Some(value) => value
            .parse::<DocumentType>()
            .map_err(|err| AppError::bad_request(err.to_string()))?,
        None => DocumentType::Offer,
    };

    let document = customers::upload_document(&state, id, doc_type, &file.filename, file.bytes).await?;
    Ok(Json(json!({ "ok": true, "document": document })))
}
