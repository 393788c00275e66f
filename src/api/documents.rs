use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::extract::{ApiPath, ApiQuery};
use crate::error::Result;
use crate::lifecycle::customers;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{id}/view", get(view))
        .route("/{id}", delete(remove))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    customer_id: Uuid,
}

async fn list(State(state): State<AppState>, ApiQuery(query): ApiQuery<ListQuery>) -> Result<Json<Value>> {
    let documents = state.store.list_documents(query.customer_id).await?;
    Ok(Json(json!({ "ok": true, "documents": documents })))
}

async fn view(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<impl IntoResponse> {
    let (document, bytes) = customers::open_document(&state, id).await?;
    let disposition = format!("inline; filename=\"{}\"", document.filename.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, document.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

async fn remove(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let document = customers::delete_document(&state, id).await?;
    Ok(Json(json!({ "ok": true, "documentId": document.id })))
}
