use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::Result;
use crate::lifecycle::{invoices, orders};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{id}", get(show))
        .route("/{id}/add-item", post(add_item))
        .route("/{id}/approve-item", post(approve_item))
        .route("/{id}/send", post(send))
        .route("/{id}/to-invoice", post(to_invoice))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    customer_id: Option<Uuid>,
}

async fn list(State(state): State<AppState>, ApiQuery(query): ApiQuery<ListQuery>) -> Result<Json<Value>> {
    let orders = state.store.list_orders(query.customer_id).await?;
    Ok(Json(json!({ "ok": true, "orders": orders })))
}

async fn show(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let order = orders::require_order(&state, id).await?;
    Ok(Json(json!({ "ok": true, "order": order })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItemBody {
    #[serde(default)]
    description: String,
    quantity: f64,
    unit_price: f64,
}

async fn add_item(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<AddItemBody>,
) -> Result<Json<Value>> {
    let (order, item) = orders::add_item(&state, id, &body.description, body.quantity, body.unit_price).await?;
    Ok(Json(json!({ "ok": true, "order": order, "item": item })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveBody {
    item_id: Uuid,
    approved_by: Option<String>,
}

async fn approve_item(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ApproveBody>,
) -> Result<Json<Value>> {
    let order = orders::approve_item(&state, id, body.item_id, body.approved_by).await?;
    Ok(Json(json!({ "ok": true, "order": order })))
}

async fn send(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let order = orders::send_order(&state, id).await?;
    Ok(Json(json!({ "ok": true, "order": order })))
}

async fn to_invoice(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let invoice = invoices::create_from_order(&state, id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}
